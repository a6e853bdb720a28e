//! Character-level operation-based CRDT: converts local positional edits
//! into globally unique character operations and integrates remote
//! operations into a locally consistent sequence (spec §3, §4.1).

mod entry;
mod id;
mod op;
mod replica;

pub use entry::CharEntry;
pub use id::GlobalId;
pub use op::{Operation, PlainUpdate};
pub use replica::Replica;
