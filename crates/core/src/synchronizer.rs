//! Value synchronization between the shared map and local observers.
//!
//! The synchronizer owns the LocalMirror: a `watch` pair seeded from the
//! store before the change subscription is installed, then overwritten on
//! every change notification. The resync is deliberately conservative:
//! whatever key the notification names, the synchronizer re-reads the
//! reserved key and mirrors it. Proposals go through `set` and come back
//! through the same notification path as everyone else's writes.
//!
//! The subscription is a scoped resource: it is released on drop, on every
//! exit path, after which no store event can touch the mirror.

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{DiceError, Result};
use crate::store::{SharedKeyValue, SubscriptionId};
use dice_protocol::{DICE_VALUE_KEY, DieFace};

/// Live local view of the shared die face, plus the propose operation.
pub struct ValueSynchronizer<M: SharedKeyValue> {
    map: M,
    mirror_tx: watch::Sender<DieFace>,
    subscription: Option<SubscriptionId>,
}

impl<M: SharedKeyValue + Clone + Send + Sync + 'static> ValueSynchronizer<M> {
    /// Bind to a resolved session's map.
    ///
    /// Seed-reads the reserved key first, installs the change subscription
    /// second, then eagerly resyncs once so nothing that landed in between
    /// is missed. The resolver guarantees the key exists; if it does not,
    /// the precondition was violated and attach fails.
    pub fn attach(map: M) -> Result<Self> {
        let seed = read_face(&map)?;
        let (mirror_tx, _) = watch::channel(seed);

        let subscription = {
            let resync_map = map.clone();
            let mirror_tx = mirror_tx.clone();
            map.on_value_changed(Box::new(move |change| {
                // Conservative full resync: ignore which key changed.
                debug!(target = "dice.sync", key = %change.key, "change notification; resyncing");
                match read_face(&resync_map) {
                    Ok(face) => {
                        mirror_tx.send_replace(face);
                    }
                    Err(e) => {
                        warn!(target = "dice.sync", error = %e, "resync read failed; keeping last mirror");
                    }
                }
            }))
        };

        // Catch anything delivered between the seed read and the subscribe.
        let synchronizer = Self {
            map,
            mirror_tx,
            subscription: Some(subscription),
        };
        synchronizer.mirror_tx.send_replace(read_face(&synchronizer.map)?);
        Ok(synchronizer)
    }

    /// Current mirrored face.
    pub fn current(&self) -> DieFace {
        *self.mirror_tx.borrow()
    }

    /// Observer handle on the mirror; `changed().await` to follow updates.
    pub fn mirror(&self) -> watch::Receiver<DieFace> {
        self.mirror_tx.subscribe()
    }

    /// Propose a new face. The mirror is not touched here: the proposal
    /// propagates back through the store's notification path, to this
    /// client like any other.
    pub fn propose(&self, face: DieFace) -> Result<()> {
        self.map.set(DICE_VALUE_KEY, serde_json::json!(face.value()))
    }

    /// Explicit teardown; equivalent to dropping the synchronizer.
    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if !self.map.off(subscription) {
                warn!(target = "dice.sync", "change subscription was already gone at teardown");
            }
        }
    }
}

impl<M: SharedKeyValue> Drop for ValueSynchronizer<M> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.map.off(subscription);
        }
    }
}

fn read_face<M: SharedKeyValue>(map: &M) -> Result<DieFace> {
    let value = map
        .get(DICE_VALUE_KEY)
        .ok_or(DiceError::MissingInvariantState { key: DICE_VALUE_KEY })?;
    let raw = value
        .as_i64()
        .ok_or_else(|| DiceError::Relay(format!("stored face is not an integer: {value}")))?;
    Ok(DieFace::try_from(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeHandler, MapState, ValueChanged};
    use serde_json::Value as JsonValue;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Map double that applies writes locally and echoes them back through
    /// the notification path synchronously.
    #[derive(Clone)]
    struct EchoMap {
        state: Arc<MapState>,
    }

    impl EchoMap {
        fn seeded(face: i64) -> Self {
            let mut entries = BTreeMap::new();
            entries.insert(DICE_VALUE_KEY.to_string(), json!(face));
            Self {
                state: Arc::new(MapState::from_entries(entries)),
            }
        }

        fn remote_set(&self, key: &str, value: JsonValue) {
            self.state.apply_remote(key, value);
        }
    }

    impl SharedKeyValue for EchoMap {
        fn get(&self, key: &str) -> Option<JsonValue> {
            self.state.get(key)
        }

        fn has(&self, key: &str) -> bool {
            self.state.has(key)
        }

        fn set(&self, key: &str, value: JsonValue) -> Result<()> {
            self.state.apply_remote(key, value);
            Ok(())
        }

        fn on_value_changed(&self, handler: ChangeHandler) -> SubscriptionId {
            self.state.subscribe(handler)
        }

        fn off(&self, subscription: SubscriptionId) -> bool {
            self.state.unsubscribe(subscription)
        }
    }

    /// Map double whose writes always fail, for disconnection surfacing.
    #[derive(Clone)]
    struct DeadMap {
        state: Arc<MapState>,
    }

    impl SharedKeyValue for DeadMap {
        fn get(&self, key: &str) -> Option<JsonValue> {
            self.state.get(key)
        }

        fn has(&self, key: &str) -> bool {
            self.state.has(key)
        }

        fn set(&self, _key: &str, _value: JsonValue) -> Result<()> {
            Err(DiceError::Disconnected("relay connection closed".to_string()))
        }

        fn on_value_changed(&self, handler: ChangeHandler) -> SubscriptionId {
            self.state.subscribe(handler)
        }

        fn off(&self, subscription: SubscriptionId) -> bool {
            self.state.unsubscribe(subscription)
        }
    }

    #[test]
    fn attach_seeds_mirror_from_store() {
        let map = EchoMap::seeded(3);
        let synchronizer = ValueSynchronizer::attach(map).unwrap();
        assert_eq!(synchronizer.current().value(), 3);
    }

    #[test]
    fn attach_fails_without_reserved_key() {
        let map = EchoMap {
            state: Arc::new(MapState::from_entries(BTreeMap::new())),
        };
        assert!(matches!(
            ValueSynchronizer::attach(map),
            Err(DiceError::MissingInvariantState { .. })
        ));
    }

    #[test]
    fn any_notification_triggers_full_resync() {
        let map = EchoMap::seeded(1);
        let synchronizer = ValueSynchronizer::attach(map.clone()).unwrap();

        // The face changes, then an unrelated key changes; both
        // notifications resync the reserved key.
        map.remote_set(DICE_VALUE_KEY, json!(6));
        assert_eq!(synchronizer.current().value(), 6);

        map.remote_set("unrelated", json!("x"));
        assert_eq!(synchronizer.current().value(), 6);
    }

    #[test]
    fn proposal_round_trips_through_notification() {
        let map = EchoMap::seeded(1);
        let synchronizer = ValueSynchronizer::attach(map).unwrap();

        synchronizer.propose(DieFace::new(5).unwrap()).unwrap();
        assert_eq!(synchronizer.current().value(), 5);
    }

    #[test]
    fn mirror_survives_garbage_store_value() {
        let map = EchoMap::seeded(4);
        let synchronizer = ValueSynchronizer::attach(map.clone()).unwrap();

        map.remote_set(DICE_VALUE_KEY, json!("not a face"));
        assert_eq!(synchronizer.current().value(), 4);

        map.remote_set(DICE_VALUE_KEY, json!(2));
        assert_eq!(synchronizer.current().value(), 2);
    }

    #[test]
    fn teardown_unsubscribes_on_every_path() {
        let map = EchoMap::seeded(1);

        let dropped = ValueSynchronizer::attach(map.clone()).unwrap();
        let mirror = dropped.mirror();
        drop(dropped);
        map.remote_set(DICE_VALUE_KEY, json!(6));
        assert_eq!(mirror.borrow().value(), 1);

        let detached = ValueSynchronizer::attach(map.clone()).unwrap();
        let mirror = detached.mirror();
        detached.detach();
        map.remote_set(DICE_VALUE_KEY, json!(2));
        assert_eq!(mirror.borrow().value(), 6);
    }

    #[test]
    fn dead_handle_surfaces_disconnection_on_propose() {
        let mut entries = BTreeMap::new();
        entries.insert(DICE_VALUE_KEY.to_string(), json!(1));
        let map = DeadMap {
            state: Arc::new(MapState::from_entries(entries)),
        };

        let synchronizer = ValueSynchronizer::attach(map).unwrap();
        assert!(matches!(
            synchronizer.propose(DieFace::new(2).unwrap()),
            Err(DiceError::Disconnected(_))
        ));
    }
}
