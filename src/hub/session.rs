//! Server-side session bookkeeping (spec §3 "Session", §4.3 state machine).

use std::time::Instant;

use crate::wire::ServerMessage;

/// Opened → AwaitingHello → Active → Closed.
///
/// A session is read-only on the server side in `AwaitingHello` until the
/// client's first presence message or first operation batch arrives;
/// terminating timeouts (heartbeat, compaction, room eviction) still apply
/// in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opened,
    AwaitingHello,
    Active,
    Closed,
}

/// A server-side record of one connected participant. Owned by the Room
/// it belongs to; never outlives it.
pub struct Session {
    pub site_id: u64,
    pub state: SessionState,
    /// The offset at which the session joined, so the initial replay is
    /// not redelivered.
    pub join_offset: usize,
    pub last_seen: Instant,
    /// Bounded outbound queue backing this session's connection task. On
    /// overflow the session is closed as slow (spec §5 backpressure).
    pub outbound: flume::Sender<ServerMessage>,
}

impl Session {
    pub fn new(site_id: u64, join_offset: usize, outbound: flume::Sender<ServerMessage>) -> Self {
        Self {
            site_id,
            state: SessionState::Opened,
            join_offset,
            last_seen: Instant::now(),
            outbound,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Best-effort send: a full or disconnected queue is the caller's cue
    /// to close the session as slow, not a reason to panic.
    pub fn send(&self, msg: ServerMessage) -> Result<(), flume::TrySendError<ServerMessage>> {
        self.outbound.try_send(msg)
    }
}
