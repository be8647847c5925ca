//! Request/response correlation layer on top of a transport.
//!
//! Responsibilities:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Distinguishing change events from responses
//! - Dispatching change events to the documents that registered for them
//!
//! # Message Flow
//!
//! 1. Client calls `send_request()` with a relay operation
//! 2. Connection generates a unique ID and creates a oneshot channel
//! 3. The request is serialized and queued toward the transport
//! 4. Client awaits on the oneshot receiver
//! 5. The run loop receives the response from the transport
//! 6. The response is correlated by ID and completed via the oneshot
//!
//! Ops (key writes) skip correlation entirely: they are fire-and-forget
//! through the same outbound queue, which is what keeps `set` synchronous.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};

use crate::error::{DiceError, Result};
use crate::store::MapState;
use crate::transport::{Transport, TransportParts, TransportReceiver};
use dice_protocol::{
    ClientMessage, ErrorPayload, Event, EVENT_VALUE_CHANGED, RelayRequest, RelayResult, Request,
    Response, ServerMessage, SessionId, error_names,
};

/// Connection to the relay service.
///
/// Thread-safe; share across tasks with `Arc`. Call [`Connection::run`] in a
/// background task exactly once.
pub struct Connection {
    /// Sequential request ID counter.
    last_id: AtomicU32,
    /// Pending request callbacks keyed by request ID.
    callbacks: Mutex<HashMap<u32, oneshot::Sender<Result<RelayResult>>>>,
    /// Outbound queue shared with document handles for fire-and-forget ops.
    outbound_tx: mpsc::UnboundedSender<JsonValue>,
    /// Transport halves, taken exactly once by `run`.
    io: AsyncMutex<Option<ConnectionIo>>,
    /// Event routing: document identity -> local map state.
    routes: Mutex<HashMap<SessionId, Arc<MapState>>>,
    /// Set when the run loop ends; all later requests and ops fail fast.
    closed: AtomicBool,
}

struct ConnectionIo {
    transport: Box<dyn Transport>,
    outbound_rx: mpsc::UnboundedReceiver<JsonValue>,
    receiver: Box<dyn TransportReceiver>,
    message_rx: mpsc::UnboundedReceiver<JsonValue>,
}

impl Connection {
    pub fn new(parts: TransportParts) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            last_id: AtomicU32::new(0),
            callbacks: Mutex::new(HashMap::new()),
            outbound_tx,
            io: AsyncMutex::new(Some(ConnectionIo {
                transport: parts.sender,
                outbound_rx,
                receiver: parts.receiver,
                message_rx: parts.message_rx,
            })),
            routes: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// True once the relay connection is no longer usable.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Route change events for `document` to the given local map state.
    pub(crate) fn register_document(&self, document: SessionId, state: Arc<MapState>) {
        self.routes.lock().insert(document, state);
    }

    /// Sender used by shared maps for non-suspending op submission.
    pub(crate) fn op_sender(&self) -> mpsc::UnboundedSender<JsonValue> {
        self.outbound_tx.clone()
    }

    /// Send a correlated request and await its result.
    pub async fn send_request(&self, op: RelayRequest) -> Result<RelayResult> {
        if self.is_closed() {
            return Err(DiceError::Disconnected("relay connection closed".to_string()));
        }

        let id = self.last_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.callbacks.lock().insert(id, tx);

        let request = ClientMessage::Request(Request { id, op });
        let message = serde_json::to_value(&request)?;
        if self.outbound_tx.send(message).is_err() {
            self.callbacks.lock().remove(&id);
            return Err(DiceError::ChannelClosed);
        }

        rx.await.map_err(|_| DiceError::ChannelClosed).and_then(|result| result)
    }

    /// Run the outbound writer and inbound dispatch loops.
    ///
    /// Spawn this in a background task. Returns when the transport closes;
    /// at that point every pending request is failed and the connection is
    /// marked closed.
    pub async fn run(&self) {
        let ConnectionIo {
            mut transport,
            mut outbound_rx,
            receiver,
            mut message_rx,
        } = self
            .io
            .lock()
            .await
            .take()
            .expect("run() can only be called once");

        let receiver_handle = tokio::spawn(async move {
            if let Err(e) = receiver.run().await {
                tracing::error!(target = "dice.connection", error = %e, "transport receiver failed");
            }
        });

        let writer_handle = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = transport.send(message).await {
                    tracing::debug!(target = "dice.connection", error = %e, "transport send failed; stopping writer");
                    break;
                }
            }
        });

        while let Some(message_value) = message_rx.recv().await {
            match serde_json::from_value::<ServerMessage>(message_value.clone()) {
                Ok(message) => {
                    if let Err(e) = self.dispatch(message) {
                        tracing::error!(target = "dice.connection", error = %e, "error dispatching message");
                    }
                }
                Err(e) => {
                    tracing::error!(
                        target = "dice.connection",
                        error = %e,
                        message = %message_value,
                        "failed to parse relay message"
                    );
                }
            }
        }

        tracing::debug!(target = "dice.connection", "message loop ended (transport closed)");
        self.closed.store(true, Ordering::SeqCst);

        // Fail every pending request so no caller awaits forever.
        let pending: Vec<_> = self.callbacks.lock().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(DiceError::Disconnected("relay connection closed".to_string())));
        }

        writer_handle.abort();
        let _ = writer_handle.await;
        receiver_handle.abort();
        let _ = receiver_handle.await;
    }

    fn dispatch(&self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::Response(response) => self.dispatch_response(response),
            ServerMessage::Event(event) => {
                self.dispatch_event(event);
                Ok(())
            }
        }
    }

    fn dispatch_response(&self, response: Response) -> Result<()> {
        let callback = self.callbacks.lock().remove(&response.id).ok_or_else(|| {
            DiceError::Relay(format!("cannot find request to respond: id={}", response.id))
        })?;

        let result = match (response.result, response.error) {
            (_, Some(error)) => Err(parse_relay_error(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(DiceError::Relay("response carried neither result nor error".to_string())),
        };

        // Receiver may have been dropped; that's fine.
        let _ = callback.send(result);
        Ok(())
    }

    fn dispatch_event(&self, event: Event) {
        if event.method != EVENT_VALUE_CHANGED {
            tracing::debug!(
                target = "dice.connection",
                method = %event.method,
                document = %event.document,
                "ignoring unknown event"
            );
            return;
        }

        let state = self.routes.lock().get(&event.document).map(Arc::clone);
        let Some(state) = state else {
            tracing::debug!(
                target = "dice.connection",
                document = %event.document,
                "change event for unregistered document"
            );
            return;
        };

        let Some(key) = event.params.get("key").and_then(JsonValue::as_str) else {
            tracing::warn!(target = "dice.connection", "change event without key");
            return;
        };
        let value = event.params.get("value").cloned().unwrap_or(JsonValue::Null);
        state.apply_remote(key, value);
    }
}

fn parse_relay_error(error: ErrorPayload) -> DiceError {
    match error.name.as_deref() {
        Some(error_names::DOCUMENT_NOT_FOUND) => DiceError::DocumentNotFound(error.message),
        _ => DiceError::Relay(error.message),
    }
}
