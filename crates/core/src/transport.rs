//! Transport seam between a client connection and the relay service.
//!
//! A transport moves opaque JSON values in both directions. The connection
//! layer owns correlation and dispatch; transports own delivery. The only
//! transport shipped here is the in-memory channel pair used by the
//! in-process relay; the trait boundary is where a network transport would
//! plug in.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::error::Result;

/// Outbound half of a transport.
pub trait Transport: Send {
    /// Send one message toward the relay.
    fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Inbound half of a transport.
///
/// `run` pumps received messages into the connection's message channel and
/// resolves when the peer goes away.
pub trait TransportReceiver: Send {
    fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Bundle handed to a connection: both transport halves plus the channel
/// the receiver feeds.
pub struct TransportParts {
    pub sender: Box<dyn Transport>,
    pub receiver: Box<dyn TransportReceiver>,
    pub message_rx: mpsc::UnboundedReceiver<JsonValue>,
}

/// In-memory transport endpoint built from unbounded channels.
///
/// `outbound` carries client messages to whoever holds the paired receiver;
/// `inbound` is fed by the peer and pumped into the connection.
pub fn channel_parts(
    outbound: mpsc::UnboundedSender<JsonValue>,
    inbound: mpsc::UnboundedReceiver<JsonValue>,
) -> TransportParts {
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    TransportParts {
        sender: Box::new(ChannelSender { outbound }),
        receiver: Box::new(ChannelReceiver { inbound, message_tx }),
        message_rx,
    }
}

struct ChannelSender {
    outbound: mpsc::UnboundedSender<JsonValue>,
}

impl Transport for ChannelSender {
    fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let result = self
            .outbound
            .send(message)
            .map_err(|_| crate::error::DiceError::ChannelClosed);
        Box::pin(async move { result })
    }
}

struct ChannelReceiver {
    inbound: mpsc::UnboundedReceiver<JsonValue>,
    message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for ChannelReceiver {
    fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            while let Some(message) = self.inbound.recv().await {
                if self.message_tx.send(message).is_err() {
                    break;
                }
            }
            Ok(())
        })
    }
}
