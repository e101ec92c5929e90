//! Fixed-cadence background jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::duration::format_duration;
use crate::service::{BalanceService, MarketService, PriceService};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Work the scheduler runs on a fixed interval.
#[async_trait::async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<()>;
}

/// Owns one interval loop per registered job.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `job` every `interval`, and once right away when `run_immediately`.
    ///
    /// A run that outlasts the interval delays the next tick instead of
    /// bursting to catch up.
    pub fn register_periodic(
        &mut self,
        interval: Duration,
        job: Arc<dyn PeriodicJob>,
        run_immediately: bool,
    ) {
        let name = job.name().to_string();
        let interval = interval.max(MIN_INTERVAL);
        info!(job = %name, interval = %format_duration(interval), run_immediately, "registered job");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            if !run_immediately {
                ticker.tick().await;
            }
            loop {
                ticker.tick().await;
                run_job(job.as_ref()).await;
            }
        });
        self.tasks.push((name, handle));
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|(name, _)| name.as_str())
    }

    /// Stops every loop. Runs in flight are cancelled at their next await point.
    pub fn shutdown(&mut self) {
        for (name, handle) in self.tasks.drain(..) {
            handle.abort();
            info!(job = %name, "stopped job");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_job(job: &dyn PeriodicJob) {
    match job.run().await {
        Ok(()) => info!(job = job.name(), "job run complete"),
        Err(err) => warn!(job = job.name(), error = %err, "job run failed"),
    }
}

/// Starts a balance fetch for every active market.
pub struct BalanceFetchJob {
    service: BalanceService,
}

impl BalanceFetchJob {
    pub fn new(service: BalanceService) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl PeriodicJob for BalanceFetchJob {
    fn name(&self) -> &str {
        "balance-fetch"
    }

    async fn run(&self) -> Result<()> {
        self.service.dispatch_balance_fetch().await?;
        Ok(())
    }
}

/// Starts a price fetch for every active market.
pub struct PriceFetchJob {
    service: PriceService,
}

impl PriceFetchJob {
    pub fn new(service: PriceService) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl PeriodicJob for PriceFetchJob {
    fn name(&self) -> &str {
        "price-fetch"
    }

    async fn run(&self) -> Result<()> {
        self.service.dispatch_price_fetch().await?;
        Ok(())
    }
}

/// Reconciles the catalog with the providers' current market listings.
pub struct DiscoveryJob {
    service: MarketService,
}

impl DiscoveryJob {
    pub fn new(service: MarketService) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl PeriodicJob for DiscoveryJob {
    fn name(&self) -> &str {
        "market-discovery"
    }

    async fn run(&self) -> Result<()> {
        self.service.discover_and_reconcile().await?;
        Ok(())
    }
}
