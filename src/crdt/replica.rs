use std::collections::HashSet;

use snafu::OptionExt;

use crate::error::{CrdtError, InvalidRangeSnafu, StateCorruptedSnafu};

use super::entry::CharEntry;
use super::id::GlobalId;
use super::op::{Operation, PlainUpdate};

/// The per-site materialized CRDT state: an ordered sequence of `CharEntry`,
/// an applied-operation set for idempotent deduplication, and the maximum
/// counter observed anywhere.
///
/// Invariant: the sequence order is deterministic given the same multiset
/// of applied operations regardless of arrival order (the RGA tie-break in
/// `integrate_insert` is what makes this true).
#[derive(Debug, Default)]
pub struct Replica {
    entries: Vec<CharEntry>,
    applied: HashSet<(u8, u64, u64)>,
    max_counter: u64,
    /// (entry_index, visible prefix length before entry_index), invalidated
    /// by any edit at or before entry_index.
    prefix_hint: Option<(usize, usize)>,
    /// Accelerates `find_index_by_gid` on the common case of sequential
    /// local edits: try here first, then fall back to a full scan.
    last_edit_index: usize,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenation of the `char` field of every visible entry in order.
    pub fn text(&self) -> String {
        self.entries
            .iter()
            .filter(|e| e.visible)
            .map(|e| e.ch)
            .collect()
    }

    pub fn len_visible(&self) -> usize {
        self.entries.iter().filter(|e| e.visible).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len_visible() == 0
    }

    pub fn max_counter(&self) -> u64 {
        self.max_counter
    }

    /// Builds a fresh Replica by replaying a full operation log in order.
    pub fn from_log(ops: &[Operation]) -> Result<Self, CrdtError> {
        let mut replica = Self::new();
        replica.apply_remote(ops)?;
        Ok(replica)
    }

    /// The minimal operation set that reproduces the current visible text:
    /// for each visible CharEntry in order, a single Insert with afterGid
    /// set to the previous visible entry's id. Tombstones and their
    /// generating Inserts/Deletes are discarded — this is the Hub's
    /// compaction protocol, step 3 (spec §4.3).
    pub fn minimal_ops(&self) -> Vec<Operation> {
        let mut ops = Vec::with_capacity(self.len_visible());
        let mut prev: Option<GlobalId> = None;
        for entry in self.entries.iter().filter(|e| e.visible) {
            ops.push(Operation::Insert {
                gid: entry.gid,
                char: entry.ch,
                after_gid: prev,
            });
            prev = Some(entry.gid);
        }
        ops
    }

    /// Integrate a batch of foreign Operations, in order. Returns the
    /// positional text changes the local view must reflect. Duplicates
    /// (already in the applied set) are ignored.
    pub fn apply_remote(&mut self, events: &[Operation]) -> Result<Vec<PlainUpdate>, CrdtError> {
        let mut updates = Vec::new();
        for op in events {
            let key = op.dedup_key();
            if self.applied.contains(&key) {
                continue;
            }
            match op {
                Operation::Insert {
                    gid,
                    char,
                    after_gid,
                } => {
                    let idx = self.integrate_insert(*gid, *char, *after_gid)?;
                    let prefix = self.visible_prefix_len(idx);
                    updates.push(PlainUpdate::new(prefix, prefix, char.to_string()));
                }
                Operation::Delete { gid } => {
                    if let Some(update) = self.integrate_delete(*gid)? {
                        updates.push(update);
                    }
                }
            }
            self.applied.insert(key);
        }
        Ok(PlainUpdate::compact(updates))
    }

    /// Translate a positional edit (delete [from, to) of the visible text,
    /// insert `value` at `from`) into emittable Operations, applying them
    /// locally as a side effect.
    pub fn apply_local(
        &mut self,
        from: usize,
        to: usize,
        value: &str,
        site_id: u64,
    ) -> Result<Vec<Operation>, CrdtError> {
        if from > to {
            return InvalidRangeSnafu {
                detail: format!("from ({from}) > to ({to})"),
            }
            .fail();
        }
        let visible_len = self.len_visible();
        if to > visible_len {
            return InvalidRangeSnafu {
                detail: format!("to ({to}) exceeds visible length ({visible_len})"),
            }
            .fail();
        }

        let mut ops = Vec::with_capacity((to - from) + value.chars().count());

        for _ in 0..(to - from) {
            let idx = self
                .nth_visible_index(from)
                .expect("visible position validated against len_visible above");
            let gid = self.entries[idx].gid;
            self.entries[idx].visible = false;
            self.invalidate_hint_at_or_after(idx);
            self.last_edit_index = idx;
            let key = (1u8, gid.site_id, gid.counter);
            self.applied.insert(key);
            ops.push(Operation::Delete { gid });
        }

        let mut after = self.anchor_before(from);
        for ch in value.chars() {
            self.max_counter += 1;
            let gid = GlobalId::new(self.max_counter, site_id);
            self.integrate_insert(gid, ch, after)?;
            let op = Operation::Insert {
                gid,
                char: ch,
                after_gid: after,
            };
            self.applied.insert(op.dedup_key());
            ops.push(op);
            after = Some(gid);
        }

        Ok(ops)
    }

    /// Steps 1-4 of the insertion algorithm (dedup is the caller's job):
    /// locate `after_gid`, walk forward past higher GlobalIds (the RGA
    /// tie-break), insert, update bookkeeping. Returns the inserted index.
    fn integrate_insert(
        &mut self,
        gid: GlobalId,
        ch: char,
        after_gid: Option<GlobalId>,
    ) -> Result<usize, CrdtError> {
        let start = match after_gid {
            None => 0,
            Some(anchor) => {
                self.find_index_by_gid(anchor)
                    .context(StateCorruptedSnafu {
                        detail: format!("insert afterGid {anchor:?} not found"),
                    })?
                    + 1
            }
        };

        let mut idx = start;
        while idx < self.entries.len() && self.entries[idx].gid > gid {
            idx += 1;
        }

        self.entries.insert(idx, CharEntry::new(gid, ch));
        self.max_counter = self.max_counter.max(gid.counter);
        self.invalidate_hint_at_or_after(idx);
        self.last_edit_index = idx;
        Ok(idx)
    }

    /// Locate the entry and tombstone it; idempotent if already invisible.
    fn integrate_delete(&mut self, gid: GlobalId) -> Result<Option<PlainUpdate>, CrdtError> {
        let idx = self.find_index_by_gid(gid).context(StateCorruptedSnafu {
            detail: format!("delete of unknown gid {gid:?}"),
        })?;
        if !self.entries[idx].visible {
            return Ok(None);
        }
        let prefix = self.visible_prefix_len(idx);
        self.entries[idx].visible = false;
        self.invalidate_hint_at_or_after(idx);
        self.last_edit_index = idx;
        Ok(Some(PlainUpdate::new(prefix, prefix + 1, "")))
    }

    fn find_index_by_gid(&self, gid: GlobalId) -> Option<usize> {
        if !self.entries.is_empty() {
            let hint = self.last_edit_index.min(self.entries.len() - 1);
            if self.entries[hint].gid == gid {
                return Some(hint);
            }
        }
        self.entries.iter().position(|e| e.gid == gid)
    }

    /// Number of visible entries in `entries[0..upto]`.
    fn visible_prefix_len(&mut self, upto: usize) -> usize {
        let (start_idx, mut count) = match self.prefix_hint {
            Some((hinted, cached)) if hinted <= upto => (hinted, cached),
            _ => (0, 0),
        };
        count += self.entries[start_idx..upto].iter().filter(|e| e.visible).count();
        self.prefix_hint = Some((upto, count));
        count
    }

    fn invalidate_hint_at_or_after(&mut self, idx: usize) {
        if let Some((hinted, _)) = self.prefix_hint {
            if hinted >= idx {
                self.prefix_hint = None;
            }
        }
    }

    /// Index in `entries` of the n-th visible entry (0-based), if any.
    fn nth_visible_index(&self, n: usize) -> Option<usize> {
        let mut count = 0;
        for (i, e) in self.entries.iter().enumerate() {
            if e.visible {
                if count == n {
                    return Some(i);
                }
                count += 1;
            }
        }
        None
    }

    /// GlobalId of the last visible entry strictly before `visible_pos`, or
    /// `None` to insert at the head.
    fn anchor_before(&self, visible_pos: usize) -> Option<GlobalId> {
        if visible_pos == 0 {
            return None;
        }
        self.nth_visible_index(visible_pos - 1).map(|i| self.entries[i].gid)
    }
}
