//! Relay client: concrete store adapter over a [`Connection`].
//!
//! `RelayClient` implements [`SharedStore`], `DocumentClient` implements
//! [`DocumentHandle`], and `SharedMap` implements [`SharedKeyValue`]. The
//! capability checks the original performed at runtime are carried by these
//! types at compile time.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use serde_json::json;
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::error::{DiceError, Result};
use crate::relay::InMemoryRelay;
use crate::store::{
    ChangeHandler, DocumentHandle, DocumentSchema, MapState, SHARED_MAP_OBJECT, SharedKeyValue,
    SharedStore, SubscriptionId,
};
use crate::transport::TransportParts;
use dice_protocol::{Event, OP_SET, ClientMessage, RelayRequest, RelayResult, RelayUser, SessionId};

/// Client handle to a relay service.
pub struct RelayClient {
    connection: Arc<Connection>,
    user: RelayUser,
}

impl RelayClient {
    /// Build a client over an arbitrary transport and spawn its connection
    /// loop. Must be called within a tokio runtime.
    pub fn new(parts: TransportParts, user: RelayUser) -> Self {
        let connection = Arc::new(Connection::new(parts));
        tokio::spawn({
            let connection = Arc::clone(&connection);
            async move { connection.run().await }
        });
        Self { connection, user }
    }

    /// Connect to an in-process relay.
    pub fn in_process(relay: &InMemoryRelay, user: RelayUser) -> Self {
        Self::new(relay.connect(), user)
    }

    /// True once the underlying connection is unusable.
    pub fn is_disconnected(&self) -> bool {
        self.connection.is_closed()
    }

    fn bind_document(
        &self,
        document: SessionId,
        initial_objects: Vec<String>,
        entries: BTreeMap<String, JsonValue>,
    ) -> DocumentClient {
        let state = Arc::new(MapState::from_entries(entries));
        self.connection.register_document(document.clone(), Arc::clone(&state));
        DocumentClient {
            document,
            initial_objects,
            state,
            connection: Arc::clone(&self.connection),
        }
    }
}

impl SharedStore for RelayClient {
    type Handle = DocumentClient;

    async fn create(&self, schema: &DocumentSchema) -> Result<Self::Handle> {
        let result = self
            .connection
            .send_request(RelayRequest::CreateDocument {
                user: self.user.clone(),
                initial_objects: schema.initial_objects.clone(),
            })
            .await?;
        match result {
            RelayResult::Document {
                document,
                initial_objects,
                entries,
            } => Ok(self.bind_document(document, initial_objects, entries)),
            other => Err(DiceError::Relay(format!("unexpected result for create: {other:?}"))),
        }
    }

    async fn fetch(&self, identity: &SessionId, schema: &DocumentSchema) -> Result<Self::Handle> {
        // The schema names what we expect; the relay returns what the
        // document actually declares. Mismatches surface later as a
        // missing shared map.
        let _ = schema;
        let result = self
            .connection
            .send_request(RelayRequest::FetchDocument {
                user: self.user.clone(),
                document: identity.clone(),
            })
            .await?;
        match result {
            RelayResult::Document {
                document,
                initial_objects,
                entries,
            } => Ok(self.bind_document(document, initial_objects, entries)),
            other => Err(DiceError::Relay(format!("unexpected result for fetch: {other:?}"))),
        }
    }
}

/// A created or fetched document bound to its local replica.
pub struct DocumentClient {
    document: SessionId,
    initial_objects: Vec<String>,
    state: Arc<MapState>,
    connection: Arc<Connection>,
}

impl DocumentClient {
    pub fn identity(&self) -> &SessionId {
        &self.document
    }
}

impl DocumentHandle for DocumentClient {
    type Map = SharedMap;

    fn shared_map(&self) -> Option<SharedMap> {
        self.initial_objects
            .iter()
            .any(|object| object == SHARED_MAP_OBJECT)
            .then(|| SharedMap {
                document: self.document.clone(),
                state: Arc::clone(&self.state),
                ops: self.connection.op_sender(),
                connection: Arc::clone(&self.connection),
            })
    }

    async fn attach(&self) -> Result<SessionId> {
        match self
            .connection
            .send_request(RelayRequest::AttachDocument {
                document: self.document.clone(),
            })
            .await?
        {
            RelayResult::Attached { document } => Ok(document),
            other => Err(DiceError::Relay(format!("unexpected result for attach: {other:?}"))),
        }
    }
}

/// Replicated key-value map of one document.
#[derive(Clone)]
pub struct SharedMap {
    document: SessionId,
    state: Arc<MapState>,
    ops: mpsc::UnboundedSender<JsonValue>,
    connection: Arc<Connection>,
}

impl SharedKeyValue for SharedMap {
    fn get(&self, key: &str) -> Option<JsonValue> {
        self.state.get(key)
    }

    fn has(&self, key: &str) -> bool {
        self.state.has(key)
    }

    fn set(&self, key: &str, value: JsonValue) -> Result<()> {
        if self.connection.is_closed() {
            return Err(DiceError::Disconnected("relay connection closed".to_string()));
        }

        self.state.set_local(key, value.clone());

        let op = ClientMessage::Op(Event {
            document: self.document.clone(),
            method: OP_SET.to_string(),
            params: json!({ "key": key, "value": value }),
        });
        let message = serde_json::to_value(&op)?;
        self.ops
            .send(message)
            .map_err(|_| DiceError::Disconnected("relay connection closed".to_string()))
    }

    fn on_value_changed(&self, handler: ChangeHandler) -> SubscriptionId {
        self.state.subscribe(handler)
    }

    fn off(&self, subscription: SubscriptionId) -> bool {
        self.state.unsubscribe(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dice_protocol::DICE_VALUE_KEY;

    #[tokio::test]
    async fn create_attach_fetch_round_trip() {
        let relay = InMemoryRelay::new();
        let creator = RelayClient::in_process(&relay, RelayUser::local_dummy());
        let joiner = RelayClient::in_process(&relay, RelayUser::local_dummy());

        let created = creator.create(&DocumentSchema::dice()).await.unwrap();
        let map = created.shared_map().unwrap();
        map.set(DICE_VALUE_KEY, json!(1)).unwrap();
        assert_eq!(map.get(DICE_VALUE_KEY), Some(json!(1)));

        let identity = created.attach().await.unwrap();
        assert_eq!(created.identity(), &identity);

        let fetched = joiner.fetch(&identity, &DocumentSchema::dice()).await.unwrap();
        let joined_map = fetched.shared_map().unwrap();
        assert!(joined_map.has(DICE_VALUE_KEY));
        assert_eq!(joined_map.get(DICE_VALUE_KEY), Some(json!(1)));
    }

    #[tokio::test]
    async fn fetch_of_unknown_identity_fails() {
        let relay = InMemoryRelay::new();
        let client = RelayClient::in_process(&relay, RelayUser::local_dummy());

        let result = client
            .fetch(&SessionId::from("doc@nonexistent"), &DocumentSchema::dice())
            .await;
        assert!(matches!(result, Err(DiceError::DocumentNotFound(_))));
    }

    #[tokio::test]
    async fn document_without_shared_map_exposes_none() {
        let relay = InMemoryRelay::new();
        let client = RelayClient::in_process(&relay, RelayUser::local_dummy());

        let schema = DocumentSchema {
            initial_objects: vec!["counter".to_string()],
        };
        let handle = client.create(&schema).await.unwrap();
        assert!(handle.shared_map().is_none());
    }

    #[tokio::test]
    async fn writes_after_relay_shutdown_surface_disconnection() {
        let relay = InMemoryRelay::new();
        let client = RelayClient::in_process(&relay, RelayUser::local_dummy());
        let handle = client.create(&DocumentSchema::dice()).await.unwrap();
        let map = handle.shared_map().unwrap();

        relay.shutdown();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(client.is_disconnected());
        assert!(matches!(
            map.set(DICE_VALUE_KEY, json!(2)),
            Err(DiceError::Disconnected(_))
        ));
    }
}
