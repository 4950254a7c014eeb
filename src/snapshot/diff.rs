use crate::error::PermviewError;
use crate::record::Record;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Changes between two snapshots of one collection.
///
/// `deletions` index the previous snapshot; `insertions` and
/// `modifications` index the next one. All three are ascending. An item
/// whose position changed relative to the items around it is reported as a
/// deletion plus an insertion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditScript {
    pub deletions: Vec<usize>,
    pub insertions: Vec<usize>,
    pub modifications: Vec<usize>,
}

impl EditScript {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.insertions.is_empty() && self.modifications.is_empty()
    }

    /// Total number of reported changes.
    pub fn len(&self) -> usize {
        self.deletions.len() + self.insertions.len() + self.modifications.len()
    }

    /// Replays the script on a mirror of the previous items.
    ///
    /// Deletions are removed back to front, then insertions are placed front
    /// to back, then modified slots are overwritten. `next` supplies the
    /// inserted and modified values.
    pub fn apply<U: Clone>(&self, mirror: &mut Vec<U>, next: &[U]) -> Result<(), PermviewError> {
        for &index in self.deletions.iter().rev() {
            if index >= mirror.len() {
                return Err(PermviewError::IncompatibleSnapshots {
                    reason: format!("deletion index {index} out of range for {}", mirror.len()),
                });
            }
            mirror.remove(index);
        }
        for &index in &self.insertions {
            let value = next.get(index).ok_or_else(|| PermviewError::IncompatibleSnapshots {
                reason: format!("insertion index {index} out of range for {}", next.len()),
            })?;
            if index > mirror.len() {
                return Err(PermviewError::IncompatibleSnapshots {
                    reason: format!("insertion index {index} beyond mirror length {}", mirror.len()),
                });
            }
            mirror.insert(index, value.clone());
        }
        for &index in &self.modifications {
            match (mirror.get_mut(index), next.get(index)) {
                (Some(slot), Some(value)) => *slot = value.clone(),
                _ => {
                    return Err(PermviewError::IncompatibleSnapshots {
                        reason: format!("modification index {index} out of range"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Computes the edit script taking `previous` to `next`.
///
/// Items are matched by identity key. Among matched items the longest run
/// that kept its relative order stays in place; the rest are moves.
pub fn diff<T: Record>(previous: &Snapshot<T>, next: &Snapshot<T>) -> Result<EditScript, PermviewError> {
    if previous.lineage() != next.lineage() {
        return Err(PermviewError::IncompatibleSnapshots {
            reason: format!(
                "lineage {} does not match lineage {}",
                previous.lineage().id(),
                next.lineage().id()
            ),
        });
    }
    if !previous.same_definition(next) {
        return Err(PermviewError::IncompatibleSnapshots {
            reason: "filter or sort definition differs".into(),
        });
    }
    if next.source_version() < previous.source_version() {
        return Err(PermviewError::IncompatibleSnapshots {
            reason: format!(
                "version {} precedes version {}",
                next.source_version(),
                previous.source_version()
            ),
        });
    }
    Ok(diff_items(previous.items(), next.items()))
}

pub(crate) fn diff_items<T: Record>(previous: &[Arc<T>], next: &[Arc<T>]) -> EditScript {
    let old_positions: BTreeMap<T::Key, usize> = previous
        .iter()
        .enumerate()
        .map(|(index, item)| (item.key(), index))
        .collect();

    let mut script = EditScript::default();
    let mut matched: Vec<(usize, usize)> = Vec::new();
    let mut kept = vec![false; previous.len()];
    for (new_index, item) in next.iter().enumerate() {
        match old_positions.get(&item.key()) {
            Some(&old_index) => {
                kept[old_index] = true;
                matched.push((old_index, new_index));
            }
            None => script.insertions.push(new_index),
        }
    }
    script.deletions.extend(
        kept.iter()
            .enumerate()
            .filter(|(_, kept)| !**kept)
            .map(|(index, _)| index),
    );

    let old_sequence: Vec<usize> = matched.iter().map(|(old, _)| *old).collect();
    let stable = longest_increasing_run(&old_sequence);
    for (position, (old_index, new_index)) in matched.into_iter().enumerate() {
        if stable[position] {
            let (before, after) = (&previous[old_index], &next[new_index]);
            if !Arc::ptr_eq(before, after) && before != after {
                script.modifications.push(new_index);
            }
        } else {
            script.deletions.push(old_index);
            script.insertions.push(new_index);
        }
    }
    script.deletions.sort_unstable();
    script.insertions.sort_unstable();
    script
}

/// Marks the members of one longest strictly increasing subsequence.
fn longest_increasing_run(sequence: &[usize]) -> Vec<bool> {
    // tails[k]: index into `sequence` of the smallest tail of a run of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessor: Vec<Option<usize>> = vec![None; sequence.len()];
    for (i, &value) in sequence.iter().enumerate() {
        let slot = tails.partition_point(|&t| sequence[t] < value);
        if slot > 0 {
            predecessor[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }
    let mut members = vec![false; sequence.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        members[i] = true;
        cursor = predecessor[i];
    }
    members
}
