//! Lockin engine daemon.
//!
//! Owns the session state. Once per second it advances time-driven
//! transitions, applies queued client commands and writes the snapshot that
//! clients read. Stop it with Ctrl-C.

use chrono::Utc;
use lockin_core::{CommandClient, Database, DesktopNotifier, Engine};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_secs(1);
const BACKOFF: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOCKIN_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db = Database::open()?;
    if CommandClient::new(&db).engine_alive(Utc::now())? {
        tracing::warn!("another engine wrote a heartbeat in the last few seconds; two engines will fight over the session");
    }

    let mut engine = Engine::load(db, DesktopNotifier)?;
    tracing::info!("lockin engine started");

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                if let Err(e) = engine.step(Utc::now()) {
                    tracing::error!(error = %e, backoff_secs = BACKOFF.as_secs(), "engine step failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(BACKOFF) => ticker.reset(),
                    }
                }
            }
        }
    }

    tracing::info!(state = %engine.snapshot().status(), "lockin engine stopped");
    Ok(())
}
