use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// A single typed scalar value from a row.
///
/// [`Cell`] is the unit of data exchanged between sources, schemas and
/// entities. Raw sources produce cells ([`Cell::Text`] for CSV fields, typed
/// variants for database columns) and schema conversion normalizes them to
/// the declared column type.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Cell {
    /// Returns whether this cell is [`Cell::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Rank used to order cells of incomparable variants, so that the cell
    /// order is total and deterministic even for mistyped data.
    fn variant_rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Bool(_) => 1,
            Cell::Int(_) => 2,
            Cell::Real(_) => 3,
            Cell::Text(_) => 4,
            Cell::Date(_) => 5,
            Cell::Timestamp(_) => 6,
        }
    }

    /// Total order over cells.
    ///
    /// `Null` sorts before any value. Numbers compare numerically across
    /// `Int` and `Real`; dates and timestamps compare on the timeline, with
    /// a date standing for its midnight. Any remaining cross-variant pair
    /// falls back to a fixed variant rank.
    pub fn total_cmp(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Null, _) => Ordering::Less,
            (_, Cell::Null) => Ordering::Greater,

            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Real(a), Cell::Real(b)) => a.total_cmp(b),
            (Cell::Int(a), Cell::Real(b)) => (*a as f64).total_cmp(b),
            (Cell::Real(a), Cell::Int(b)) => a.total_cmp(&(*b as f64)),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Date(a), Cell::Date(b)) => a.cmp(b),
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a.cmp(b),
            (Cell::Date(a), Cell::Timestamp(b)) => midnight(*a).cmp(b),
            (Cell::Timestamp(a), Cell::Date(b)) => a.cmp(&midnight(*b)),

            (a, b) => a.variant_rank().cmp(&b.variant_rank()),
        }
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::MIN)
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Real(value) => write!(f, "{value}"),
            Cell::Text(value) => f.write_str(value),
            Cell::Date(value) => write!(f, "{value}"),
            Cell::Timestamp(value) => write!(f, "{value}"),
        }
    }
}

/// A raw or decoded row: cell values in declared column order.
pub type Row = Vec<Cell>;

/// An ordered tuple of cell values with lexicographic comparison.
///
/// [`SortKey`] is the single key representation used for identity keys,
/// container keys, sort keys and resilient-cursor watermarks. The first
/// differing coordinate decides; a shorter key that is a prefix of a longer
/// one sorts first.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey(pub Vec<Cell>);

impl SortKey {
    /// Projects the given positions out of a row.
    pub fn project(row: &[Cell], positions: &[usize]) -> SortKey {
        SortKey(positions.iter().map(|&i| row[i].clone()).collect())
    }

    /// Returns the key's coordinates.
    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Eq for SortKey {}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                decided => return decided,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, cell) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{cell}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(Cell::Null.total_cmp(&Cell::Int(i64::MIN)), Ordering::Less);
        assert_eq!(
            Cell::Null.total_cmp(&Cell::Text(String::new())),
            Ordering::Less
        );
        assert_eq!(Cell::Null.total_cmp(&Cell::Null), Ordering::Equal);
    }

    #[test]
    fn test_numeric_comparison_crosses_variants() {
        assert_eq!(Cell::Int(2).total_cmp(&Cell::Real(2.5)), Ordering::Less);
        assert_eq!(Cell::Real(3.0).total_cmp(&Cell::Int(3)), Ordering::Equal);
        assert_eq!(Cell::Real(4.0).total_cmp(&Cell::Int(3)), Ordering::Greater);
    }

    #[test]
    fn test_date_compares_against_timestamp() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let later = date.and_hms_opt(10, 30, 0).unwrap();

        assert_eq!(
            Cell::Date(date).total_cmp(&Cell::Timestamp(later)),
            Ordering::Less
        );
        assert_eq!(
            Cell::Date(date).total_cmp(&Cell::Timestamp(midnight(date))),
            Ordering::Equal
        );
    }

    #[test]
    fn test_sort_key_lexicographic() {
        let a = SortKey(vec![Cell::Int(1), Cell::Int(5)]);
        let b = SortKey(vec![Cell::Int(1), Cell::Int(7)]);
        let c = SortKey(vec![Cell::Int(2), Cell::Int(0)]);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_sort_key_prefix_sorts_first() {
        let short = SortKey(vec![Cell::Int(1)]);
        let long = SortKey(vec![Cell::Int(1), Cell::Int(0)]);

        assert!(short < long);
    }

    #[test]
    fn test_sort_key_null_coordinate_sorts_first() {
        let with_null = SortKey(vec![Cell::Int(1), Cell::Null]);
        let with_value = SortKey(vec![Cell::Int(1), Cell::Int(0)]);

        assert!(with_null < with_value);
    }

    #[test]
    fn test_project() {
        let row = vec![Cell::Int(10), Cell::Text("x".into()), Cell::Int(20)];
        let key = SortKey::project(&row, &[2, 0]);

        assert_eq!(key, SortKey(vec![Cell::Int(20), Cell::Int(10)]));
    }
}
