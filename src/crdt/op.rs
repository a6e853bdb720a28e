use serde::{Deserialize, Serialize};

use super::id::GlobalId;

/// An Insert or Delete carrying a GlobalId.
///
/// Insert places `char` immediately after the entry identified by
/// `after_gid`, or at the very beginning if `after_gid` is absent. Delete
/// tombstones the entry identified by `gid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        gid: GlobalId,
        char: char,
        #[serde(rename = "afterGid", default, skip_serializing_if = "Option::is_none")]
        after_gid: Option<GlobalId>,
    },
    Delete {
        gid: GlobalId,
    },
}

impl Operation {
    pub fn gid(&self) -> GlobalId {
        match self {
            Operation::Insert { gid, .. } => *gid,
            Operation::Delete { gid } => *gid,
        }
    }

    /// The key an applied-operation set dedups on: (kind, siteId, counter).
    pub fn dedup_key(&self) -> (u8, u64, u64) {
        let kind = match self {
            Operation::Insert { .. } => 0,
            Operation::Delete { .. } => 1,
        };
        let gid = self.gid();
        (kind, gid.site_id, gid.counter)
    }
}

/// A positional text change consumed by the editor view: replace the
/// substring [from, to) with `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainUpdate {
    pub from: usize,
    pub to: usize,
    pub value: String,
}

impl PlainUpdate {
    pub fn new(from: usize, to: usize, value: impl Into<String>) -> Self {
        Self {
            from,
            to,
            value: value.into(),
        }
    }

    /// Two updates are textually adjacent when the second starts exactly
    /// where the first's inserted text ends. Counted in chars, not bytes —
    /// positions are code points throughout the core (spec §9).
    fn adjacent_to(&self, next: &PlainUpdate) -> bool {
        self.to == self.from && next.to == next.from && next.from == self.from + self.value.chars().count()
    }

    /// Merge a sequence of emitted plain updates, combining consecutive
    /// insert-only updates that are textually adjacent into one, reducing
    /// downstream editor churn.
    pub fn compact(updates: Vec<PlainUpdate>) -> Vec<PlainUpdate> {
        let mut out: Vec<PlainUpdate> = Vec::with_capacity(updates.len());
        for update in updates {
            if let Some(last) = out.last_mut() {
                if last.adjacent_to(&update) {
                    last.value.push_str(&update.value);
                    continue;
                }
            }
            out.push(update);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compacts_adjacent_single_char_inserts() {
        let updates = vec![
            PlainUpdate::new(0, 0, "a"),
            PlainUpdate::new(1, 1, "b"),
            PlainUpdate::new(2, 2, "c"),
        ];
        let compacted = PlainUpdate::compact(updates);
        assert_eq!(compacted, vec![PlainUpdate::new(0, 0, "abc")]);
    }

    #[test]
    fn does_not_compact_non_adjacent_inserts() {
        let updates = vec![PlainUpdate::new(0, 0, "a"), PlainUpdate::new(5, 5, "b")];
        let compacted = PlainUpdate::compact(updates);
        assert_eq!(compacted.len(), 2);
    }

    #[test]
    fn does_not_compact_deletes() {
        let updates = vec![PlainUpdate::new(0, 1, ""), PlainUpdate::new(0, 1, "")];
        let compacted = PlainUpdate::compact(updates);
        assert_eq!(compacted.len(), 2);
    }
}
