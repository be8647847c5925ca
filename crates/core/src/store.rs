//! Static capability surface of the shared store.
//!
//! The original runtime shape check ("does this object have get and set")
//! becomes a set of named traits here: a store can create and fetch
//! documents, a document handle can attach and expose its shared map, and a
//! shared map supports get/set/has plus change-notification subscribe and
//! unsubscribe. Concrete adapters implement these against the relay; tests
//! can substitute their own.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::Result;
use dice_protocol::SessionId;

/// Name of the shared map object every dice document must carry.
pub const SHARED_MAP_OBJECT: &str = "sharedMap";

/// Initial-object layout requested at document creation and expected at
/// fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSchema {
    pub initial_objects: Vec<String>,
}

impl DocumentSchema {
    /// The dice session schema: a single shared map.
    pub fn dice() -> Self {
        Self {
            initial_objects: vec![SHARED_MAP_OBJECT.to_string()],
        }
    }

    pub fn has_shared_map(&self) -> bool {
        self.initial_objects.iter().any(|o| o == SHARED_MAP_OBJECT)
    }
}

/// Change notification delivered to shared-map subscribers.
///
/// Carries the changed key, but subscribers are free to ignore it and
/// re-read whatever they track; the synchronizer does exactly that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChanged {
    pub key: String,
}

/// Handle for deterministically removing a registered change handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Change-notification callback.
pub type ChangeHandler = Box<dyn Fn(&ValueChanged) + Send>;

/// Key-value capability of a resolved session document.
pub trait SharedKeyValue {
    /// Read a key from the local replica. Synchronous, never suspends.
    fn get(&self, key: &str) -> Option<JsonValue>;

    /// True when the local replica contains `key`.
    fn has(&self, key: &str) -> bool;

    /// Write a key. Updates the local replica synchronously and enqueues
    /// the op for replication; handlers fire only when the change comes
    /// back through the notification path.
    fn set(&self, key: &str, value: JsonValue) -> Result<()>;

    /// Register a change handler. Returns the id needed to remove it.
    fn on_value_changed(&self, handler: ChangeHandler) -> SubscriptionId;

    /// Remove a previously registered handler. Returns false when the id
    /// was not registered (already removed).
    fn off(&self, subscription: SubscriptionId) -> bool;
}

/// A created or fetched document, not yet known to be a valid session.
pub trait DocumentHandle {
    type Map: SharedKeyValue + Clone + Send + Sync + 'static;

    /// The shared map declared by the document's schema, or `None` when the
    /// document was created with a different layout.
    fn shared_map(&self) -> Option<Self::Map>;

    /// Publish the document and return its canonical identity. Idempotent.
    fn attach(&self) -> impl std::future::Future<Output = Result<SessionId>> + Send;
}

/// Store boundary: create a new document or fetch one by identity.
pub trait SharedStore {
    type Handle: DocumentHandle;

    fn create(
        &self,
        schema: &DocumentSchema,
    ) -> impl std::future::Future<Output = Result<Self::Handle>> + Send;

    fn fetch(
        &self,
        identity: &SessionId,
        schema: &DocumentSchema,
    ) -> impl std::future::Future<Output = Result<Self::Handle>> + Send;
}

/// Local replica of one document's shared map plus its handler registry.
///
/// Handlers fire while the registry lock is held, so a handler must not
/// subscribe or unsubscribe reentrantly.
pub(crate) struct MapState {
    entries: Mutex<HashMap<String, JsonValue>>,
    handlers: Mutex<HashMap<u64, ChangeHandler>>,
    next_subscription: AtomicU64,
}

impl MapState {
    pub(crate) fn from_entries(entries: BTreeMap<String, JsonValue>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
            handlers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<JsonValue> {
        self.entries.lock().get(key).cloned()
    }

    pub(crate) fn has(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Local-only write; no handler fires until the op echoes back.
    pub(crate) fn set_local(&self, key: &str, value: JsonValue) {
        self.entries.lock().insert(key.to_string(), value);
    }

    pub(crate) fn subscribe(&self, handler: ChangeHandler) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().insert(id, handler);
        SubscriptionId(id)
    }

    pub(crate) fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.handlers.lock().remove(&subscription.0).is_some()
    }

    /// Apply a replicated change and notify every registered handler.
    pub(crate) fn apply_remote(&self, key: &str, value: JsonValue) {
        self.entries.lock().insert(key.to_string(), value);
        let change = ValueChanged { key: key.to_string() };
        let handlers = self.handlers.lock();
        for handler in handlers.values() {
            handler(&change);
        }
    }
}
