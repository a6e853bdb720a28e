//! Room Hub (spec §4.3): the in-memory, per-room actor that owns session
//! bookkeeping, fan-out, heartbeats, and compaction.

mod room;
mod session;

pub use room::{spawn, JoinInfo, RoomHandle};
pub use session::SessionState;
