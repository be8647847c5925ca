//! Session resolution: create-or-join, invariant seeding, validation.
//!
//! The resolver runs once at session start. With no incoming identity it
//! creates a fresh document and seeds the reserved key; with one it fetches
//! the document and verifies the key is present. Both paths verify the
//! document exposes the shared map. Invalid handles never leave this
//! module: the synchronizer trusts the resolver's guarantee as a
//! precondition.

use serde_json::json;
use tracing::{debug, info};

use crate::error::{DiceError, Result};
use crate::publisher::Locator;
use crate::store::{DocumentHandle, DocumentSchema, SharedKeyValue, SharedStore};
use dice_protocol::{DICE_VALUE_KEY, DieFace, SessionId};

/// How the session came to exist on this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// This client created and seeded the document.
    Created,
    /// This client joined an existing document.
    Joined,
}

/// A validated session: its document handle, shared map, and origin.
pub struct ResolvedSession<H: DocumentHandle> {
    handle: H,
    map: H::Map,
    origin: SessionOrigin,
}

impl<H: DocumentHandle> ResolvedSession<H> {
    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn map(&self) -> &H::Map {
        &self.map
    }

    /// Hand the shared map to the synchronizer, dropping the handle.
    pub fn into_map(self) -> H::Map {
        self.map
    }
}

/// Decides create-vs-join and produces a validated store handle.
pub struct SessionResolver<S: SharedStore> {
    store: S,
    schema: DocumentSchema,
}

impl<S: SharedStore> SessionResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            schema: DocumentSchema::dice(),
        }
    }

    /// Resolve a session from an optional externally supplied identity.
    pub async fn resolve(&self, incoming: Option<SessionId>) -> Result<ResolvedSession<S::Handle>> {
        match incoming {
            None => self.create_session().await,
            Some(identity) => self.join_session(identity).await,
        }
    }

    /// Full session-start sequence: read the locator, resolve, and on the
    /// create path attach and publish the identity. Returns the session and
    /// its canonical identity.
    pub async fn establish<L: Locator>(
        &self,
        locator: &L,
    ) -> Result<(ResolvedSession<S::Handle>, SessionId)> {
        let incoming = locator.incoming();
        let session = self.resolve(incoming.clone()).await?;
        let identity = match session.origin {
            SessionOrigin::Created => crate::publisher::publish_identity(&session.handle, locator).await?,
            SessionOrigin::Joined => {
                // resolve() only takes the join path when an identity came in.
                incoming.ok_or_else(|| DiceError::Relay("joined session without incoming identity".to_string()))?
            }
        };
        Ok((session, identity))
    }

    async fn create_session(&self) -> Result<ResolvedSession<S::Handle>> {
        debug!(target = "dice.session", "no incoming identity; creating session");
        let handle = self.store.create(&self.schema).await?;
        let map = shared_map_of(&handle)?;

        // Seed the invariant state before anyone can join.
        map.set(DICE_VALUE_KEY, json!(DieFace::ONE.value()))?;
        info!(target = "dice.session", "session created and seeded");

        Ok(ResolvedSession {
            handle,
            map,
            origin: SessionOrigin::Created,
        })
    }

    async fn join_session(&self, identity: SessionId) -> Result<ResolvedSession<S::Handle>> {
        debug!(target = "dice.session", identity = %identity, "joining existing session");
        let handle = self.store.fetch(&identity, &self.schema).await?;
        let map = shared_map_of(&handle)?;

        // The join path additionally requires the reserved key: a document
        // that never held it is not a session of this kind.
        if !map.has(DICE_VALUE_KEY) {
            return Err(DiceError::MissingInvariantState { key: DICE_VALUE_KEY });
        }
        info!(target = "dice.session", identity = %identity, "session joined");

        Ok(ResolvedSession {
            handle,
            map,
            origin: SessionOrigin::Joined,
        })
    }
}

fn shared_map_of<H: DocumentHandle>(handle: &H) -> Result<H::Map> {
    handle.shared_map().ok_or_else(|| {
        DiceError::SchemaViolation("document does not expose the shared map".to_string())
    })
}
