// dice-core: client library for the shared dice session.
//
// Session lifecycle (create-or-join, invariant seeding, identity
// publication) and value synchronization over a relay connection. The
// presentation layer lives in `dice-cli`.

pub mod client;
pub mod connection;
pub mod error;
pub mod publisher;
pub mod relay;
pub mod resolver;
pub mod store;
pub mod synchronizer;
pub mod transport;

pub use client::{DocumentClient, RelayClient, SharedMap};
pub use connection::Connection;
pub use error::{DiceError, Result};
pub use publisher::{Locator, MemoryLocator, publish_identity};
pub use relay::InMemoryRelay;
pub use resolver::{ResolvedSession, SessionOrigin, SessionResolver};
pub use store::{
    DocumentHandle, DocumentSchema, SHARED_MAP_OBJECT, SharedKeyValue, SharedStore,
    SubscriptionId, ValueChanged,
};
pub use synchronizer::ValueSynchronizer;

pub use dice_protocol::{DICE_VALUE_KEY, DieFace, RelayUser, ServiceConfig, SessionId};
