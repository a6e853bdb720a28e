//! Per-room event log: append-only, offset-indexed (spec §4.2).

use crate::crdt::Operation;

/// An append-only sequence of Operations for one room, addressed by dense
/// 0-based offsets.
#[derive(Debug, Default)]
pub struct RoomLog {
    ops: Vec<Operation>,
    /// Running total of each entry's serialized JSON length, so `bytes()`
    /// is cheap even as the log grows.
    byte_total: usize,
}

impl RoomLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from a previously-persisted or bootstrapped slice.
    pub fn from_ops(ops: Vec<Operation>) -> Self {
        let byte_total = ops.iter().map(estimated_size).sum();
        Self { ops, byte_total }
    }

    /// Appends in arrival order; offsets are dense and monotonic. Returns
    /// the offset the operation was appended at.
    pub fn append(&mut self, op: Operation) -> usize {
        let offset = self.ops.len();
        self.byte_total += estimated_size(&op);
        self.ops.push(op);
        offset
    }

    /// Operations with index >= `offset`.
    pub fn since(&self, offset: usize) -> &[Operation] {
        if offset >= self.ops.len() {
            &[]
        } else {
            &self.ops[offset..]
        }
    }

    pub fn all(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.byte_total
    }

    /// Replace the log's contents wholesale — used by the compaction
    /// protocol (spec §4.3 step 3) to install the minimal operation set.
    pub fn replace(&mut self, ops: Vec<Operation>) {
        self.byte_total = ops.iter().map(estimated_size).sum();
        self.ops = ops;
    }
}

fn estimated_size(op: &Operation) -> usize {
    serde_json::to_vec(op).map(|bytes| bytes.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::GlobalId;

    fn insert(counter: u64, site: u64, ch: char) -> Operation {
        Operation::Insert {
            gid: GlobalId::new(counter, site),
            char: ch,
            after_gid: None,
        }
    }

    #[test]
    fn append_returns_dense_offsets() {
        let mut log = RoomLog::new();
        assert_eq!(log.append(insert(1, 1, 'a')), 0);
        assert_eq!(log.append(insert(2, 1, 'b')), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn since_returns_tail_slice() {
        let mut log = RoomLog::new();
        log.append(insert(1, 1, 'a'));
        log.append(insert(2, 1, 'b'));
        log.append(insert(3, 1, 'c'));
        assert_eq!(log.since(1).len(), 2);
        assert_eq!(log.since(10).len(), 0);
    }

    #[test]
    fn bytes_grows_with_each_append() {
        let mut log = RoomLog::new();
        assert_eq!(log.bytes(), 0);
        log.append(insert(1, 1, 'a'));
        assert!(log.bytes() > 0);
    }
}
