//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization.

use serde::{Deserialize, Serialize};
use ticketline_shared::{TicketNumber, UserId};

use crate::queue::{QueueSnapshot, UserStatus};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Requests sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Register (or re-identify) and ask for the current status
    #[serde(rename_all = "camelCase")]
    Connect { user_id: UserId },

    /// Take a number
    #[serde(rename_all = "camelCase")]
    Reserve { user_id: UserId },

    /// Give the number back once served
    #[serde(rename_all = "camelCase")]
    Complete { user_id: UserId },

    /// Heartbeat ping to keep connection alive
    Ping,
}

impl ClientEvent {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            ClientEvent::Connect { user_id }
            | ClientEvent::Reserve { user_id }
            | ClientEvent::Complete { user_id } => Some(user_id),
            ClientEvent::Ping => None,
        }
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Reply to `connect`
    #[serde(rename_all = "camelCase")]
    Status {
        has_reserved: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        number: Option<TicketNumber>,
        current_numbers: Vec<TicketNumber>,
        waiting: usize,
        message: String,
    },

    /// Reply to a successful `reserve`
    Reserved { number: TicketNumber },

    /// Reply to a successful `complete`
    Completed { number: TicketNumber },

    /// Queue changed; sent to every connection
    #[serde(rename_all = "camelCase")]
    UpdateQueue {
        current_numbers: Vec<TicketNumber>,
        waiting: usize,
    },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}

impl From<QueueSnapshot> for ServerEvent {
    fn from(snapshot: QueueSnapshot) -> Self {
        ServerEvent::UpdateQueue {
            current_numbers: snapshot.current_numbers,
            waiting: snapshot.waiting,
        }
    }
}

impl From<UserStatus> for ServerEvent {
    fn from(status: UserStatus) -> Self {
        ServerEvent::Status {
            has_reserved: status.has_reserved(),
            number: status.number,
            message: status.message(),
            current_numbers: status.current_numbers,
            waiting: status.waiting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn n(value: u32) -> TicketNumber {
        TicketNumber::new(value).unwrap()
    }

    #[test]
    fn test_client_event_deserialization() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"action":"reserve","userId":"u-42"}"#).unwrap();
        match event {
            ClientEvent::Reserve { user_id } => assert_eq!(user_id.as_str(), "u-42"),
            _ => panic!("Expected Reserve event"),
        }

        let event: ClientEvent = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Ping));
    }

    #[test]
    fn test_malformed_client_events_rejected() {
        for raw in [
            r#"{"action":"reserve"}"#,
            r#"{"action":"teleport","userId":"u"}"#,
            r#"{"userId":"u"}"#,
            r#"not json"#,
        ] {
            assert!(serde_json::from_str::<ClientEvent>(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_status_serialization() {
        let event = ServerEvent::from(UserStatus {
            number: Some(n(11)),
            current_numbers: vec![n(1), n(2)],
            waiting: 10,
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "status",
                "hasReserved": true,
                "number": 11,
                "currentNumbers": [1, 2],
                "waiting": 10,
                "message": "Your number is 11. There are 10 people ahead of you.",
            })
        );

        let idle = ServerEvent::from(UserStatus {
            number: None,
            current_numbers: vec![],
            waiting: 0,
        });
        let value = serde_json::to_value(&idle).unwrap();
        assert_eq!(value["hasReserved"], json!(false));
        assert!(value.get("number").is_none());
    }

    #[test]
    fn test_update_queue_serialization() {
        let event = ServerEvent::from(QueueSnapshot {
            current_numbers: vec![n(3)],
            waiting: 4,
        });
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"updateQueue","currentNumbers":[3],"waiting":4}"#
        );
    }

    #[test]
    fn test_server_event_serialization() {
        assert_eq!(
            serde_json::to_string(&ServerEvent::Pong).unwrap(),
            r#"{"type":"pong"}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerEvent::Reserved { number: n(5) }).unwrap(),
            r#"{"type":"reserved","number":5}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerEvent::Completed { number: n(5) }).unwrap(),
            r#"{"type":"completed","number":5}"#
        );
        assert_eq!(
            serde_json::to_string(&ServerEvent::Error {
                message: "Invalid request".to_string()
            })
            .unwrap(),
            r#"{"type":"error","message":"Invalid request"}"#
        );
    }
}
