//! Crate-wide error taxonomy (spec §7).
//!
//! Each kind maps onto a documented disposition: `RoomNotFound` surfaces as
//! an HTTP 404, `StateCorrupted`/`InvalidRange`/`WireError` terminate the
//! offending session only, and `CompactionRequired` is a control message,
//! not an error. `LimitExceeded` (the `documentLimit` guard) and the
//! "unknown message kind" case are both client-side concerns this server
//! crate never raises: malformed JSON and rejected tags alike surface
//! here as one `serde_json::Error`, so there is nothing left for a
//! separate `UnknownKind` variant to carry.

use snafu::Snafu;

/// Faults raised by the CRDT replica.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CrdtError {
    /// A remote Operation referenced an unknown GlobalId.
    #[snafu(display("state corrupted: {detail}"))]
    StateCorrupted { detail: String },

    /// Local-edit bounds were impossible (from > to, or range exceeds the
    /// visible length).
    #[snafu(display("invalid range: {detail}"))]
    InvalidRange { detail: String },
}

/// Faults raised by the Room Registry.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RoomError {
    /// No room exists under the requested name.
    #[snafu(display("room not found: {name}"))]
    RoomNotFound { name: String },
}

/// Faults raised at the wire-codec boundary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WireError {
    #[snafu(display("malformed message: {source}"))]
    Malformed { source: serde_json::Error },
}
