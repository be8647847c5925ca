//! Identity publication and the locator handoff channel.
//!
//! The locator is the out-of-band carrier a session identity travels
//! through between participants (the original used a URL fragment). It is
//! modeled as an explicit capability: read the optional incoming identity
//! at start, publish the canonical identity after attach.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::store::DocumentHandle;
use dice_protocol::SessionId;

/// One-shot, out-of-band channel for the session identity.
pub trait Locator {
    /// Identity supplied by the environment, if any. Empty means "create a
    /// new session".
    fn incoming(&self) -> Option<SessionId>;

    /// Expose an identity so other participants can join.
    fn publish(&self, identity: &SessionId);
}

/// Attach a freshly created document and publish its canonical identity.
///
/// Runs once per created session. Publishing twice with the same identity
/// is harmless, but nothing here retries a failed attach: the document is
/// abandoned and the error surfaces to the caller.
pub async fn publish_identity<H: DocumentHandle, L: Locator>(
    handle: &H,
    locator: &L,
) -> Result<SessionId> {
    let identity = handle.attach().await?;
    locator.publish(&identity);
    info!(target = "dice.session", identity = %identity, "session identity published");
    Ok(identity)
}

/// In-memory locator, shared between participants in one process.
#[derive(Clone, Default)]
pub struct MemoryLocator {
    slot: Arc<Mutex<Option<SessionId>>>,
}

impl MemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator pre-loaded with an identity, as if parsed from a shared link.
    pub fn with_identity(identity: SessionId) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(identity))),
        }
    }
}

impl Locator for MemoryLocator {
    fn incoming(&self) -> Option<SessionId> {
        self.slot.lock().clone()
    }

    fn publish(&self, identity: &SessionId) {
        *self.slot.lock() = Some(identity.clone());
    }
}
