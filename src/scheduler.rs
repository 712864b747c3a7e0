use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{db::OrmConn, error::AppResult, services::inventory};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: u64,
    pub sold_out: u64,
}

/// Run both basket sweeps once.
pub async fn sweep_baskets(orm: &OrmConn) -> AppResult<SweepReport> {
    let expired = inventory::expire_baskets(orm).await?;
    let sold_out = inventory::mark_sold_out_baskets(orm).await?;
    Ok(SweepReport { expired, sold_out })
}

/// Periodically expire and sold-out-mark baskets. A failed sweep is logged
/// and the next tick tries again.
pub fn spawn_basket_sweeper(orm: OrmConn, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = every.as_secs(), "basket sweeper started");

        loop {
            ticker.tick().await;
            match sweep_baskets(&orm).await {
                Ok(report) if report != SweepReport::default() => {
                    tracing::info!(
                        expired = report.expired,
                        sold_out = report.sold_out,
                        "basket sweep applied"
                    );
                }
                Ok(_) => tracing::debug!("basket sweep found nothing to do"),
                Err(err) => tracing::error!(error = %err, "basket sweep failed"),
            }
        }
    })
}
