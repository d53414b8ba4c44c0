//! Batch boost refresh.
//!
//! Every known user is refreshed independently: fetch balances, compute, save.
//! A failing user is logged and reported, never fatal for the rest of the run.

use std::sync::Arc;

use portal_core::boost::{calculate_boost, BoostConfig};
use portal_core::Address;
use portal_store::{BoostRecord, Store, StoreError};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::balances::{BalanceError, BalanceSource};

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SweepEntry {
    pub address: Address,
    pub boost_coefficient: f64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct SweepFailure {
    pub address: Address,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct SweepReport {
    pub refreshed: Vec<SweepEntry>,
    pub failed: Vec<SweepFailure>,
    /// Tasks that died without reporting (panics).
    pub aborted: usize,
}

/// Recompute and persist the boost of a single user.
pub async fn refresh_one(
    store: &Store,
    source: &dyn BalanceSource,
    config: &BoostConfig,
    address: &Address,
) -> Result<BoostRecord, RefreshError> {
    let balances = source.balances(address)?;
    let outcome = calculate_boost(config, &balances);
    Ok(store.save_boost(address, &balances, &outcome).await?)
}

/// Refresh every user, at most `concurrency` at a time.
pub async fn run_sweep(
    store: &Store,
    source: Arc<dyn BalanceSource>,
    config: Arc<BoostConfig>,
    concurrency: usize,
) -> Result<SweepReport, StoreError> {
    let addresses = store.addresses().await?;
    log::info!(
        "boost sweep over {} users (concurrency {})",
        addresses.len(),
        concurrency
    );

    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for address in addresses {
        let store = store.clone();
        let source = Arc::clone(&source);
        let config = Arc::clone(&config);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            // the semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            let outcome = refresh_one(&store, source.as_ref(), &config, &address).await;
            (address, outcome)
        });
    }

    let mut report = SweepReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((address, Ok(record))) => report.refreshed.push(SweepEntry {
                address,
                boost_coefficient: record.boost_coefficient,
            }),
            Ok((address, Err(err))) => {
                log::warn!("boost refresh failed for {address}: {err}");
                report.failed.push(SweepFailure {
                    address,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                log::error!("boost refresh task aborted: {err}");
                report.aborted += 1;
            }
        }
    }
    report.refreshed.sort_by(|a, b| a.address.cmp(&b.address));
    report.failed.sort_by(|a, b| a.address.cmp(&b.address));

    log::info!(
        "boost sweep done: {} refreshed, {} failed",
        report.refreshed.len(),
        report.failed.len()
    );
    Ok(report)
}
