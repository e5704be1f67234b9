//! The single writer of the balance history.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{BalanceError, BalanceHistory, BalanceSample, BalanceSource};

pub async fn poll_once(
    source: &dyn BalanceSource,
    history: &BalanceHistory,
) -> Result<BalanceSample, BalanceError> {
    let balance = source.fetch_balance().await?;
    history.record(balance, Utc::now())
}

/// Polls `source` every `every` on one task, so fetches never overlap.
pub fn spawn_poller(
    source: Arc<dyn BalanceSource>,
    history: Arc<BalanceHistory>,
    every: Duration,
) -> JoinHandle<()> {
    info!(source = source.name(), interval_secs = every.as_secs(), "starting balance poller");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match poll_once(source.as_ref(), &history).await {
                Ok(sample) => debug!(balance = sample.balance, "recorded balance sample"),
                Err(e) => warn!(source = source.name(), error = %e, "balance poll failed"),
            }
        }
    })
}
