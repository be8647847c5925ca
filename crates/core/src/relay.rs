//! In-process relay service.
//!
//! Implements the store boundary for the local configuration: document
//! creation, fetch by identity, attach (identity publication), and fan-out
//! of `valueChanged` events to every connected member of a document,
//! including the client that originated the write. The relay is the single
//! ordering authority: ops are applied in arrival order and every member
//! observes the same sequence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use serde_json::json;
use tokio::sync::{mpsc, watch};

use crate::transport::{TransportParts, channel_parts};
use dice_protocol::{
    ClientMessage, ErrorPayload, Event, EVENT_VALUE_CHANGED, OP_SET, RelayRequest, RelayResult,
    Request, Response, SessionId, error_names,
};

/// Shared in-memory relay. Cheap to clone; all clones serve the same
/// document set.
#[derive(Clone)]
pub struct InMemoryRelay {
    state: Arc<Mutex<RelayState>>,
    shutdown_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct RelayState {
    documents: HashMap<SessionId, DocumentState>,
    next_document: u64,
    next_client: u64,
}

struct DocumentState {
    initial_objects: Vec<String>,
    entries: BTreeMap<String, JsonValue>,
    attached: bool,
    members: Vec<Member>,
}

struct Member {
    client: u64,
    tx: mpsc::UnboundedSender<JsonValue>,
}

impl Default for InMemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRelay {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(RelayState::default())),
            shutdown_tx,
        }
    }

    /// Connect a new client; returns the transport bundle for its
    /// connection. Must be called within a tokio runtime.
    pub fn connect(&self) -> TransportParts {
        let (to_relay_tx, mut to_relay_rx) = mpsc::unbounded_channel::<JsonValue>();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel::<JsonValue>();

        let client = {
            let mut state = self.state.lock();
            state.next_client += 1;
            state.next_client
        };

        let state = Arc::clone(&self.state);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    message = to_relay_rx.recv() => {
                        let Some(message) = message else { break };
                        handle_message(&state, client, &to_client_tx, message);
                    }
                }
            }
            drop_membership(&state, client);
            tracing::debug!(target = "dice.relay", client, "client disconnected");
        });

        channel_parts(to_relay_tx, to_client_rx)
    }

    /// Tear the service down: every client connection closes and further
    /// writes surface as disconnection on the client side.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Number of live documents, attached or not.
    pub fn document_count(&self) -> usize {
        self.state.lock().documents.len()
    }
}

fn handle_message(
    state: &Arc<Mutex<RelayState>>,
    client: u64,
    reply_tx: &mpsc::UnboundedSender<JsonValue>,
    message: JsonValue,
) {
    let parsed = match serde_json::from_value::<ClientMessage>(message.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(target = "dice.relay", error = %e, message = %message, "unparseable client message");
            return;
        }
    };

    match parsed {
        ClientMessage::Request(request) => {
            let response = handle_request(state, client, reply_tx, request);
            if let Ok(response) = serde_json::to_value(&response) {
                let _ = reply_tx.send(response);
            }
        }
        ClientMessage::Op(op) => handle_op(state, client, op),
    }
}

fn handle_request(
    state: &Arc<Mutex<RelayState>>,
    client: u64,
    reply_tx: &mpsc::UnboundedSender<JsonValue>,
    request: Request,
) -> Response {
    let result = match request.op {
        RelayRequest::CreateDocument { user, initial_objects } => {
            let mut state = state.lock();
            state.next_document += 1;
            let document = SessionId::new(format!("doc@{:08x}", state.next_document));
            state.documents.insert(
                document.clone(),
                DocumentState {
                    initial_objects: initial_objects.clone(),
                    entries: BTreeMap::new(),
                    attached: false,
                    members: vec![Member {
                        client,
                        tx: reply_tx.clone(),
                    }],
                },
            );
            tracing::info!(
                target = "dice.relay",
                document = %document,
                user = %user.id,
                "document created (detached)"
            );
            Ok(RelayResult::Document {
                document,
                initial_objects,
                entries: BTreeMap::new(),
            })
        }
        RelayRequest::FetchDocument { user, document } => {
            let mut state = state.lock();
            match state.documents.get_mut(&document) {
                Some(doc) if doc.attached => {
                    doc.members.push(Member {
                        client,
                        tx: reply_tx.clone(),
                    });
                    tracing::info!(
                        target = "dice.relay",
                        document = %document,
                        user = %user.id,
                        members = doc.members.len(),
                        "client joined document"
                    );
                    Ok(RelayResult::Document {
                        document,
                        initial_objects: doc.initial_objects.clone(),
                        entries: doc.entries.clone(),
                    })
                }
                // Detached documents are invisible to fetch.
                _ => Err(not_found(&document)),
            }
        }
        RelayRequest::AttachDocument { document } => {
            let mut state = state.lock();
            match state.documents.get_mut(&document) {
                Some(doc) => {
                    if !doc.attached {
                        doc.attached = true;
                        tracing::info!(target = "dice.relay", document = %document, "document attached");
                    }
                    Ok(RelayResult::Attached { document })
                }
                None => Err(not_found(&document)),
            }
        }
    };

    match result {
        Ok(result) => Response {
            id: request.id,
            result: Some(result),
            error: None,
        },
        Err(error) => Response {
            id: request.id,
            result: None,
            error: Some(error),
        },
    }
}

fn handle_op(state: &Arc<Mutex<RelayState>>, client: u64, op: Event) {
    if op.method != OP_SET {
        tracing::warn!(target = "dice.relay", method = %op.method, "unknown op method");
        return;
    }
    let Some(key) = op.params.get("key").and_then(JsonValue::as_str) else {
        tracing::warn!(target = "dice.relay", "set op without key");
        return;
    };
    let value = op.params.get("value").cloned().unwrap_or(JsonValue::Null);

    let mut state = state.lock();
    let Some(doc) = state.documents.get_mut(&op.document) else {
        tracing::warn!(target = "dice.relay", document = %op.document, client, "set op for unknown document");
        return;
    };

    doc.entries.insert(key.to_string(), value.clone());

    // Fan out to every member, the originator included; clients update
    // their mirrors from this echo, not from their local write.
    let notification = Event {
        document: op.document.clone(),
        method: EVENT_VALUE_CHANGED.to_string(),
        params: json!({ "key": key, "value": value }),
    };
    let Ok(wire) = serde_json::to_value(&notification) else {
        return;
    };
    doc.members.retain(|member| member.tx.send(wire.clone()).is_ok());
}

fn drop_membership(state: &Arc<Mutex<RelayState>>, client: u64) {
    let mut state = state.lock();
    for doc in state.documents.values_mut() {
        doc.members.retain(|member| member.client != client);
    }
}

fn not_found(document: &SessionId) -> ErrorPayload {
    ErrorPayload {
        message: format!("no document with identity `{document}`"),
        name: Some(error_names::DOCUMENT_NOT_FOUND.to_string()),
    }
}
