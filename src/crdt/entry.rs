use serde::{Deserialize, Serialize};

use super::id::GlobalId;

/// One element of a replica's backing sequence.
///
/// Tombstones (`visible == false`) are never physically removed during
/// normal operation; they vanish only at compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharEntry {
    pub gid: GlobalId,
    pub ch: char,
    pub visible: bool,
}

impl CharEntry {
    pub fn new(gid: GlobalId, ch: char) -> Self {
        Self {
            gid,
            ch,
            visible: true,
        }
    }
}
