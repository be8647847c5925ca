//! Multi-participant session demo against the in-process relay.
//!
//! One participant creates and publishes the session; the rest join it
//! through the shared locator. Rolls rotate across participants and every
//! mirror is checked for convergence after each one.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use rand::Rng;
use tokio::time::timeout;
use tracing::info;

use crate::render::face_glyph;
use dice::{
    DieFace, InMemoryRelay, MemoryLocator, RelayClient, ServiceConfig, SessionResolver,
    ValueSynchronizer,
};

pub async fn run(participants: u8, rolls: u32) -> Result<()> {
    if participants == 0 {
        bail!("at least one participant is required");
    }
    let config = ServiceConfig::from_env();
    if !config.is_local() {
        bail!("remote relay transport is not wired; unset DICE_TENANT_* to run the local demo");
    }

    let relay = InMemoryRelay::new();
    let locator = MemoryLocator::new();
    let user = config.user().clone();

    // First participant creates and publishes the session.
    let resolver = SessionResolver::new(RelayClient::in_process(&relay, user.clone()));
    let (session, identity) = resolver
        .establish(&locator)
        .await
        .context("failed to establish session")?;
    let mut synchronizers =
        vec![ValueSynchronizer::attach(session.into_map()).context("failed to attach synchronizer")?];
    println!("session {identity}");

    // The rest join through the locator.
    for _ in 1..participants {
        let resolver = SessionResolver::new(RelayClient::in_process(&relay, user.clone()));
        let (session, _) = resolver
            .establish(&locator)
            .await
            .context("failed to join session")?;
        synchronizers
            .push(ValueSynchronizer::attach(session.into_map()).context("failed to attach synchronizer")?);
    }

    println!(
        "{} participant(s) ready, face {}",
        synchronizers.len(),
        face_glyph(synchronizers[0].current())
    );

    let mut rng = rand::rng();
    for roll in 1..=rolls {
        let roller = (roll as usize - 1) % synchronizers.len();
        let face = DieFace::new(rng.random_range(1..=6u8))?;

        info!(target = "dice", roll, roller, face = face.value(), "proposing");
        synchronizers[roller].propose(face)?;
        for (index, synchronizer) in synchronizers.iter().enumerate() {
            wait_for_face(synchronizer, face)
                .await
                .with_context(|| format!("participant {index} never converged on roll {roll}"))?;
        }
        println!(
            "roll {roll}: participant {roller} rolled {} ({face})",
            face_glyph(face)
        );
    }

    for synchronizer in synchronizers {
        synchronizer.detach();
    }
    relay.shutdown();
    Ok(())
}

async fn wait_for_face<M>(synchronizer: &ValueSynchronizer<M>, expected: DieFace) -> Result<()>
where
    M: dice::SharedKeyValue + Clone + Send + Sync + 'static,
{
    let mut mirror = synchronizer.mirror();
    timeout(Duration::from_secs(2), async {
        while *mirror.borrow() != expected {
            mirror.changed().await?;
        }
        Ok::<_, tokio::sync::watch::error::RecvError>(())
    })
    .await
    .context("convergence timed out")??;
    Ok(())
}
