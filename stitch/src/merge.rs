//! N-way merge over named readers of comparable entities.

use crate::error::StitchResult;
use crate::reader::EntityReader;
use crate::types::{Entity, SortKey};

/// One merge member: a named reader with a single buffered entity.
struct Member {
    name: String,
    /// Type rank for polymorphic merges; 0 otherwise. Breaks sort-key ties
    /// so equal-keyed entities of different subtypes emerge in declared
    /// order.
    rank: u32,
    reader: Box<dyn EntityReader>,
    buffered: Option<Buffered>,
    closed: bool,
}

struct Buffered {
    key: SortKey,
    entity: Entity,
}

/// Merges a fixed set of named, independently-advancing readers into one
/// ascending sequence.
///
/// Holds one buffered entity per still-active member. `peek` returns the
/// globally least-ordered buffered entity by (sort key, rank, member name);
/// `next` returns it and refreshes only the member that produced it, which
/// is what keeps the merge streaming and memory-bounded. A member that
/// reports end of stream is closed and plays no further role.
///
/// Sort keys are compared first: container-key blocks must stay contiguous
/// in the merged output for the absorb loops downstream, whatever mix of
/// member types produced them.
pub struct MergeSet {
    members: Vec<Member>,
}

impl MergeSet {
    /// Creates a merge over `(name, rank, reader)` members, priming one
    /// buffered entity from each.
    pub fn new(members: Vec<(String, u32, Box<dyn EntityReader>)>) -> StitchResult<MergeSet> {
        let mut primed = Vec::with_capacity(members.len());
        for (name, rank, reader) in members {
            let mut member = Member {
                name,
                rank,
                reader,
                buffered: None,
                closed: false,
            };
            Self::refill(&mut member)?;
            primed.push(member);
        }
        Ok(MergeSet { members: primed })
    }

    fn refill(member: &mut Member) -> StitchResult<()> {
        match member.reader.next()? {
            Some(entity) => {
                member.buffered = Some(Buffered {
                    key: entity.sort_key(),
                    entity,
                });
            }
            None => {
                member.buffered = None;
                member.reader.close()?;
                member.closed = true;
            }
        }
        Ok(())
    }

    /// Index of the member holding the least buffered entity, ties broken
    /// by member name for determinism.
    fn least_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (index, member) in self.members.iter().enumerate() {
            let Some(buffered) = &member.buffered else {
                continue;
            };
            match best {
                None => best = Some(index),
                Some(current) => {
                    let leader = &self.members[current];
                    let leader_buffered = leader
                        .buffered
                        .as_ref()
                        .expect("best always points at a buffered member");
                    let candidate = (&buffered.key, member.rank, member.name.as_str());
                    let incumbent = (
                        &leader_buffered.key,
                        leader.rank,
                        leader.name.as_str(),
                    );
                    if candidate < incumbent {
                        best = Some(index);
                    }
                }
            }
        }
        best
    }

    /// Returns the least-ordered buffered entity, or `None` if every member
    /// is exhausted.
    pub fn peek(&self) -> Option<&Entity> {
        self.least_index()
            .and_then(|index| self.members[index].buffered.as_ref())
            .map(|buffered| &buffered.entity)
    }

    /// Returns the least-ordered entity and advances only the member that
    /// produced it.
    pub fn next(&mut self) -> StitchResult<Option<Entity>> {
        let Some(index) = self.least_index() else {
            return Ok(None);
        };

        let member = &mut self.members[index];
        let buffered = member
            .buffered
            .take()
            .expect("least_index only returns buffered members");
        Self::refill(member)?;

        Ok(Some(buffered.entity))
    }

    /// Closes every still-active member.
    pub fn close(&mut self) -> StitchResult<()> {
        for member in &mut self.members {
            if !member.closed {
                member.reader.close()?;
                member.closed = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{VecReader, int_entities};
    use crate::types::Cell;

    fn member(
        name: &str,
        rank: u32,
        values: &[i64],
    ) -> (String, u32, Box<dyn EntityReader>) {
        (
            name.to_string(),
            rank,
            Box::new(VecReader::new(int_entities(name, values))),
        )
    }

    fn drain(merge: &mut MergeSet) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(entity) = merge.next().unwrap() {
            match entity.values()[0] {
                Cell::Int(v) => out.push(v),
                ref other => panic!("unexpected cell {other:?}"),
            }
        }
        out
    }

    #[test]
    fn test_merges_disjoint_sequences_ascending() {
        let mut merge = MergeSet::new(vec![
            member("odd", 0, &[1, 3, 5, 9]),
            member("even", 0, &[2, 4, 6]),
        ])
        .unwrap();

        assert_eq!(drain(&mut merge), vec![1, 2, 3, 4, 5, 6, 9]);
    }

    #[test]
    fn test_count_is_preserved_with_duplicates() {
        let mut merge = MergeSet::new(vec![
            member("a", 0, &[1, 2, 2, 7]),
            member("b", 0, &[2, 7, 7]),
        ])
        .unwrap();

        assert_eq!(drain(&mut merge), vec![1, 2, 2, 2, 7, 7, 7]);
    }

    #[test]
    fn test_ties_break_by_member_name() {
        let mut merge =
            MergeSet::new(vec![member("zeta", 0, &[1]), member("alpha", 0, &[1])]).unwrap();

        let first = merge.next().unwrap().unwrap();
        assert_eq!(first.type_name(), "alpha");
        let second = merge.next().unwrap().unwrap();
        assert_eq!(second.type_name(), "zeta");
    }

    #[test]
    fn test_rank_breaks_sort_key_ties() {
        let mut merge = MergeSet::new(vec![
            member("alpha", 1, &[0, 3]),
            member("zeta", 0, &[3, 5]),
        ])
        .unwrap();

        let mut seen = Vec::new();
        while let Some(entity) = merge.next().unwrap() {
            seen.push((entity.type_name().to_string(), entity.values()[0].clone()));
        }

        // Keys stay globally ascending; at the tie on 3 the lower rank
        // (zeta) wins despite its later name.
        assert_eq!(
            seen,
            vec![
                ("alpha".to_string(), Cell::Int(0)),
                ("zeta".to_string(), Cell::Int(3)),
                ("alpha".to_string(), Cell::Int(3)),
                ("zeta".to_string(), Cell::Int(5)),
            ]
        );
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut merge = MergeSet::new(vec![member("a", 0, &[4])]).unwrap();

        assert!(merge.peek().is_some());
        assert!(merge.peek().is_some());
        assert!(merge.next().unwrap().is_some());
        assert!(merge.peek().is_none());
        assert!(merge.next().unwrap().is_none());
    }

    #[test]
    fn test_empty_member_set() {
        let mut merge = MergeSet::new(Vec::new()).unwrap();
        assert!(merge.peek().is_none());
        assert!(merge.next().unwrap().is_none());
    }
}
