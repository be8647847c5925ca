//! Synchronization contract under multi-client traffic: convergence,
//! proposer echo, and subscription hygiene.

use std::time::Duration;

use dice::{
    DieFace, InMemoryRelay, MemoryLocator, RelayClient, RelayUser, SessionResolver,
    ValueSynchronizer,
};
use tokio::sync::watch;
use tokio::time::timeout;

fn resolver(relay: &InMemoryRelay) -> SessionResolver<RelayClient> {
    SessionResolver::new(RelayClient::in_process(relay, RelayUser::local_dummy()))
}

async fn wait_for_face(mirror: &mut watch::Receiver<DieFace>, expected: u8) {
    timeout(Duration::from_secs(2), async {
        while mirror.borrow().value() != expected {
            mirror.changed().await.expect("mirror sender dropped");
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "mirror never reached {expected}, stuck at {}",
            mirror.borrow().value()
        )
    });
}

#[tokio::test]
async fn proposer_observes_its_own_write() {
    let relay = InMemoryRelay::new();
    let locator = MemoryLocator::new();

    let (session, _) = resolver(&relay).establish(&locator).await.unwrap();
    let synchronizer = ValueSynchronizer::attach(session.into_map()).unwrap();
    let mut mirror = synchronizer.mirror();

    for face in [3u8, 6, 2] {
        synchronizer.propose(DieFace::new(face).unwrap()).unwrap();
        wait_for_face(&mut mirror, face).await;
    }
}

#[tokio::test]
async fn sequence_of_proposals_converges_to_the_last() {
    let relay = InMemoryRelay::new();
    let locator = MemoryLocator::new();

    let (created, _) = resolver(&relay).establish(&locator).await.unwrap();
    let creator = ValueSynchronizer::attach(created.into_map()).unwrap();

    let (joined, _) = resolver(&relay).establish(&locator).await.unwrap();
    let joiner = ValueSynchronizer::attach(joined.into_map()).unwrap();

    // Burst of proposals, no waiting in between: every client must end on
    // the last one, in the relay's arrival order.
    for face in [2u8, 3, 4, 5, 6, 1, 4] {
        creator.propose(DieFace::new(face).unwrap()).unwrap();
    }

    let mut creator_mirror = creator.mirror();
    let mut joiner_mirror = joiner.mirror();
    wait_for_face(&mut creator_mirror, 4).await;
    wait_for_face(&mut joiner_mirror, 4).await;
}

#[tokio::test]
async fn interleaved_proposals_from_both_clients_converge() {
    let relay = InMemoryRelay::new();
    let locator = MemoryLocator::new();

    let (created, _) = resolver(&relay).establish(&locator).await.unwrap();
    let creator = ValueSynchronizer::attach(created.into_map()).unwrap();

    let (joined, _) = resolver(&relay).establish(&locator).await.unwrap();
    let joiner = ValueSynchronizer::attach(joined.into_map()).unwrap();

    creator.propose(DieFace::new(2).unwrap()).unwrap();
    joiner.propose(DieFace::new(3).unwrap()).unwrap();
    creator.propose(DieFace::new(6).unwrap()).unwrap();

    // Arrival order at the relay decides the winner across clients.
    // Settle, then require both mirrors equal.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let creator_face = creator.current();
    let joiner_face = joiner.current();
    assert_eq!(creator_face, joiner_face, "clients diverged");
}

#[tokio::test]
async fn torn_down_synchronizer_receives_nothing() {
    let relay = InMemoryRelay::new();
    let locator = MemoryLocator::new();

    let (created, _) = resolver(&relay).establish(&locator).await.unwrap();
    let creator = ValueSynchronizer::attach(created.into_map()).unwrap();

    let (joined, _) = resolver(&relay).establish(&locator).await.unwrap();
    let joiner = ValueSynchronizer::attach(joined.into_map()).unwrap();
    let joiner_mirror = joiner.mirror();
    joiner.detach();

    let mut creator_mirror = creator.mirror();
    creator.propose(DieFace::new(6).unwrap()).unwrap();
    wait_for_face(&mut creator_mirror, 6).await;

    // The proposal has fully propagated; the detached mirror stayed put.
    assert_eq!(joiner_mirror.borrow().value(), 1);
}

#[tokio::test]
async fn late_joiner_catches_up_with_current_value() {
    let relay = InMemoryRelay::new();
    let locator = MemoryLocator::new();

    let (created, _) = resolver(&relay).establish(&locator).await.unwrap();
    let creator = ValueSynchronizer::attach(created.into_map()).unwrap();
    let mut creator_mirror = creator.mirror();

    creator.propose(DieFace::new(4).unwrap()).unwrap();
    wait_for_face(&mut creator_mirror, 4).await;

    // A client joining after the proposal sees the new face, not the seed.
    let (joined, _) = resolver(&relay).establish(&locator).await.unwrap();
    let joiner = ValueSynchronizer::attach(joined.into_map()).unwrap();
    assert_eq!(joiner.current().value(), 4);
}

#[tokio::test]
async fn three_clients_converge() {
    let relay = InMemoryRelay::new();
    let locator = MemoryLocator::new();

    let (created, _) = resolver(&relay).establish(&locator).await.unwrap();
    let first = ValueSynchronizer::attach(created.into_map()).unwrap();

    let mut others = Vec::new();
    for _ in 0..2 {
        let (joined, _) = resolver(&relay).establish(&locator).await.unwrap();
        others.push(ValueSynchronizer::attach(joined.into_map()).unwrap());
    }

    first.propose(DieFace::new(5).unwrap()).unwrap();

    let mut first_mirror = first.mirror();
    wait_for_face(&mut first_mirror, 5).await;
    for other in &others {
        let mut mirror = other.mirror();
        wait_for_face(&mut mirror, 5).await;
    }
}
