//! Relay protocol messages.
//!
//! Request/response pairs carry a client-generated `id` for correlation.
//! Unsolicited messages (`Event`) carry no `id`: client-to-relay ops and
//! relay-to-client change notifications both use the event shape.
//!
//! ```json
//! { "id": 3, "type": "fetchDocument", "document": "doc@9f2c" }
//! { "id": 3, "result": { "type": "document", "document": "doc@9f2c", ... } }
//! { "document": "doc@9f2c", "method": "valueChanged", "params": { "key": "dice-value-key" } }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RelayUser;
use crate::types::SessionId;

/// Correlated request sent to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for correlating responses.
    pub id: u32,
    #[serde(flatten)]
    pub op: RelayRequest,
}

/// Operations the relay accepts as correlated requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayRequest {
    /// Create a new, detached document with the given initial objects.
    CreateDocument {
        user: RelayUser,
        initial_objects: Vec<String>,
    },
    /// Fetch an attached document by identity.
    FetchDocument { user: RelayUser, document: SessionId },
    /// Publish a created document; the relay returns its canonical identity.
    AttachDocument { document: SessionId },
}

/// Response correlated to a [`Request`] by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RelayResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Success payloads for relay responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayResult {
    /// A document snapshot: identity, schema objects, and key/value entries.
    Document {
        document: SessionId,
        initial_objects: Vec<String>,
        entries: BTreeMap<String, Value>,
    },
    /// The canonical identity assigned by attach.
    Attached { document: SessionId },
}

/// Relay-side failure details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    /// Error type name (e.g. "DocumentNotFound").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Well-known relay error names.
pub mod error_names {
    pub const DOCUMENT_NOT_FOUND: &str = "DocumentNotFound";
}

/// Uncorrelated message: a client op or a relay change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Document this event belongs to.
    pub document: SessionId,
    /// Event method name (e.g. "set", "valueChanged").
    pub method: String,
    /// Event parameters as JSON object.
    pub params: Value,
}

/// Event method a client sends to mutate a key.
pub const OP_SET: &str = "set";
/// Event method the relay fans out when any key changes.
pub const EVENT_VALUE_CHANGED: &str = "valueChanged";

/// Message from client to relay.
///
/// Uses serde's `untagged` to distinguish based on presence of `id`:
/// requests carry one, ops do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Request(Request),
    Op(Event),
}

/// Message from relay to client, discriminated the same way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Response(Response),
    Event(Event),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_flat() {
        let request = Request {
            id: 7,
            op: RelayRequest::AttachDocument {
                document: SessionId::from("doc@1"),
            },
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["type"], "attachDocument");
        assert_eq!(wire["document"], "doc@1");
    }

    #[test]
    fn server_message_with_id_is_response() {
        let wire = json!({
            "id": 3,
            "result": { "type": "attached", "document": "doc@9" }
        });
        match serde_json::from_value::<ServerMessage>(wire).unwrap() {
            ServerMessage::Response(response) => {
                assert_eq!(response.id, 3);
                assert!(response.error.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn server_message_without_id_is_event() {
        let wire = json!({
            "document": "doc@9",
            "method": "valueChanged",
            "params": { "key": "dice-value-key" }
        });
        match serde_json::from_value::<ServerMessage>(wire).unwrap() {
            ServerMessage::Event(event) => {
                assert_eq!(event.method, EVENT_VALUE_CHANGED);
                assert_eq!(event.params["key"], "dice-value-key");
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn error_response_round_trips() {
        let response = Response {
            id: 1,
            result: None,
            error: Some(ErrorPayload {
                message: "no document with identity `doc@x`".to_string(),
                name: Some(error_names::DOCUMENT_NOT_FOUND.to_string()),
            }),
        };
        let wire = serde_json::to_value(&response).unwrap();
        assert!(wire.get("result").is_none());
        let back: Response = serde_json::from_value(wire).unwrap();
        assert_eq!(back.error.unwrap().name.as_deref(), Some("DocumentNotFound"));
    }
}
