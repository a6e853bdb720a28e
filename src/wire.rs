//! Wire Codec: the JSON envelope shared by client and server on the
//! persistent session, plus the REST bootstrap DTOs (spec §4.6).
//!
//! Every message carries exactly one discriminating `type` key. Unknown
//! kinds are rejected at deserialization by serde's internally-tagged enum
//! machinery itself — the boundary, not a downstream handler, per §9's
//! design note on encoding this as an explicit tagged variant.

use serde::{Deserialize, Serialize};

use crate::crdt::Operation;

/// Messages the server sends to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename = "setSiteId")]
    SetSiteId { site_id: u64 },

    #[serde(rename = "crdtEvents")]
    CrdtEvents { events: Vec<Operation> },

    #[serde(rename = "sitePresence")]
    SitePresence {
        site_id: u64,
        name: String,
        visible: bool,
    },

    #[serde(rename = "siteDisconnected")]
    SiteDisconnected { site_id: u64 },

    #[serde(rename = "heartbit")]
    Heartbit {},

    #[serde(rename = "compactionRequired")]
    CompactionRequired {},
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename = "crdtEvents")]
    CrdtEvents { events: Vec<Operation> },

    #[serde(rename = "sitePresence")]
    SitePresence {
        site_id: u64,
        name: String,
        visible: bool,
    },
}

/// `POST /resource/room` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
}

/// Session parameters handed to a client at bootstrap, echoed in
/// `GET /resource/room/{roomId}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub heartbit_interval: u64,
    pub document_limit: usize,
}

/// `GET /resource/room/{roomId}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResponse {
    pub events: Vec<Operation>,
    pub settings: Settings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::GlobalId;

    #[test]
    fn server_message_round_trips_through_json() {
        let msg = ServerMessage::SetSiteId { site_id: 7 };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"setSiteId\""));
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        matches!(back, ServerMessage::SetSiteId { site_id: 7 });
    }

    #[test]
    fn unknown_kind_is_rejected_at_the_codec_boundary() {
        let json = r#"{"type":"notAThing"}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn crdt_events_carries_operations() {
        let msg = ClientMessage::CrdtEvents {
            events: vec![Operation::Insert {
                gid: GlobalId::new(1, 1),
                char: 'a',
                after_gid: None,
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        match back {
            ClientMessage::CrdtEvents { events } => assert_eq!(events.len(), 1),
            _ => panic!("wrong variant"),
        }
    }
}
