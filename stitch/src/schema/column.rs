use chrono::{NaiveDate, NaiveDateTime};

use crate::bail;
use crate::error::{ErrorKind, StitchResult};
use crate::types::Cell;

/// Default chrono format for date columns.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Default chrono format for timestamp columns.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The declared type of a column, with its conversion behavior.
///
/// `convert` decodes a raw cell (a string field from CSV, a typed value from
/// a database) into the column's canonical [`Cell`] variant; `unconvert`
/// renders a canonical value back to its text form for flat output. Empty and
/// all-whitespace strings decode to [`Cell::Null`] for every type except
/// [`ColumnType::Text`], which preserves them verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Text { trim: bool },
    Integer,
    Real,
    Boolean,
    Date { format: String },
    Timestamp { format: String },
    /// A column that must never carry data. In strict mode any non-empty
    /// value is a row-translation failure; in loose mode it is discarded.
    Empty { strict: bool },
}

impl ColumnType {
    /// A text column that preserves surrounding whitespace.
    pub fn text() -> Self {
        ColumnType::Text { trim: false }
    }

    /// A text column that trims surrounding whitespace on decode.
    pub fn trimmed_text() -> Self {
        ColumnType::Text { trim: true }
    }

    /// A date column using the default `%Y-%m-%d` format.
    pub fn date() -> Self {
        ColumnType::Date {
            format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    /// A timestamp column using the default `%Y-%m-%d %H:%M:%S` format.
    pub fn timestamp() -> Self {
        ColumnType::Timestamp {
            format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }

    /// Decodes a raw cell into this column's canonical variant.
    pub fn convert(&self, raw: Cell) -> StitchResult<Cell> {
        if raw.is_null() {
            return Ok(Cell::Null);
        }

        match self {
            ColumnType::Text { trim } => Ok(match raw {
                Cell::Text(value) => {
                    if *trim {
                        Cell::Text(value.trim().to_string())
                    } else {
                        Cell::Text(value)
                    }
                }
                other => Cell::Text(other.to_string()),
            }),

            ColumnType::Integer => match raw {
                Cell::Int(value) => Ok(Cell::Int(value)),
                Cell::Real(value) => Ok(Cell::Int(value as i64)),
                Cell::Bool(value) => Ok(Cell::Int(i64::from(value))),
                Cell::Text(value) => match non_empty(&value) {
                    None => Ok(Cell::Null),
                    Some(text) => Ok(Cell::Int(text.parse::<i64>()?)),
                },
                other => unconvertible("integer", &other),
            },

            ColumnType::Real => match raw {
                Cell::Real(value) => Ok(Cell::Real(value)),
                Cell::Int(value) => Ok(Cell::Real(value as f64)),
                Cell::Text(value) => match non_empty(&value) {
                    None => Ok(Cell::Null),
                    Some(text) => Ok(Cell::Real(text.parse::<f64>()?)),
                },
                other => unconvertible("real", &other),
            },

            ColumnType::Boolean => match raw {
                Cell::Bool(value) => Ok(Cell::Bool(value)),
                Cell::Int(0) => Ok(Cell::Bool(false)),
                Cell::Int(1) => Ok(Cell::Bool(true)),
                Cell::Text(value) => match non_empty(&value) {
                    None => Ok(Cell::Null),
                    Some(text) => parse_bool(text),
                },
                other => unconvertible("boolean", &other),
            },

            ColumnType::Date { format } => match raw {
                Cell::Date(value) => Ok(Cell::Date(value)),
                Cell::Timestamp(value) => Ok(Cell::Date(value.date())),
                Cell::Text(value) => match non_empty(&value) {
                    None => Ok(Cell::Null),
                    Some(text) => Ok(Cell::Date(NaiveDate::parse_from_str(text, format)?)),
                },
                other => unconvertible("date", &other),
            },

            ColumnType::Timestamp { format } => match raw {
                Cell::Timestamp(value) => Ok(Cell::Timestamp(value)),
                Cell::Date(value) => Ok(Cell::Timestamp(
                    value.and_hms_opt(0, 0, 0).unwrap_or(NaiveDateTime::MIN),
                )),
                Cell::Text(value) => match non_empty(&value) {
                    None => Ok(Cell::Null),
                    Some(text) => Ok(Cell::Timestamp(NaiveDateTime::parse_from_str(
                        text, format,
                    )?)),
                },
                other => unconvertible("timestamp", &other),
            },

            ColumnType::Empty { strict } => match raw {
                Cell::Text(value) if value.trim().is_empty() => Ok(Cell::Null),
                other if *strict => {
                    bail!(
                        ErrorKind::InvalidData,
                        "empty column contains data",
                        format!("unexpected value `{other}`")
                    )
                }
                _ => Ok(Cell::Null),
            },
        }
    }

    /// Renders a canonical value back to its text form. NULL becomes the
    /// empty field.
    pub fn unconvert(&self, value: &Cell) -> String {
        match (self, value) {
            (_, Cell::Null) | (ColumnType::Empty { .. }, _) => String::new(),
            (ColumnType::Date { format }, Cell::Date(date)) => date.format(format).to_string(),
            (ColumnType::Timestamp { format }, Cell::Timestamp(ts)) => {
                ts.format(format).to_string()
            }
            (_, other) => other.to_string(),
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn parse_bool(text: &str) -> StitchResult<Cell> {
    match text {
        "t" | "T" | "true" | "True" | "TRUE" | "1" => Ok(Cell::Bool(true)),
        "f" | "F" | "false" | "False" | "FALSE" | "0" => Ok(Cell::Bool(false)),
        other => bail!(
            ErrorKind::RowTranslationFailed,
            "invalid boolean value",
            format!("expected t/f/true/false/1/0, received `{other}`")
        ),
    }
}

fn unconvertible(expected: &str, value: &Cell) -> StitchResult<Cell> {
    Err(crate::stitch_error!(
        ErrorKind::RowTranslationFailed,
        "value does not fit the declared column type",
        format!("expected {expected}, received `{value:?}`")
    ))
}

/// The schema of a single column: its name and declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// The name of the column.
    pub name: String,
    /// The declared type of the column.
    pub typ: ColumnType,
}

impl ColumnSchema {
    /// Creates a new [`ColumnSchema`].
    pub fn new(name: impl Into<String>, typ: ColumnType) -> ColumnSchema {
        Self {
            name: name.into(),
            typ,
        }
    }
}
