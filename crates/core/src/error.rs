//! Error taxonomy for session acquisition and synchronization.
//!
//! The session resolver validates eagerly: `SchemaViolation` and
//! `MissingInvariantState` are terminal for session start and never reach
//! the synchronizer. `Disconnected` is the only failure surfaced after a
//! session was successfully established.

use dice_protocol::FaceOutOfRange;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiceError>;

#[derive(Debug, Error)]
pub enum DiceError {
    /// Resolved document does not expose the shared map capability.
    ///
    /// Indicates a store/schema mismatch; fatal to session start, not retried.
    #[error("document schema mismatch: {0}")]
    SchemaViolation(String),

    /// Joined document lacks the reserved dice key.
    ///
    /// The referenced document is not a valid session of this kind.
    #[error("joined document is missing reserved key `{key}`")]
    MissingInvariantState { key: &'static str },

    /// Store handle became unusable after the session was established.
    ///
    /// Surfaced to the caller; no automatic reconnection or write retry.
    #[error("session disconnected: {0}")]
    Disconnected(String),

    /// No attached document exists under the given identity.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// Relay rejected an operation.
    #[error("relay error: {0}")]
    Relay(String),

    /// Connection was closed before a response arrived.
    #[error("connection channel closed")]
    ChannelClosed,

    /// A stored value did not parse as a die face.
    #[error(transparent)]
    Face(#[from] FaceOutOfRange),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl DiceError {
    /// True for failures that are fatal to the session-start sequence.
    pub fn is_fatal_for_session_start(&self) -> bool {
        matches!(
            self,
            Self::SchemaViolation(_) | Self::MissingInvariantState { .. } | Self::DocumentNotFound(_)
        )
    }
}
