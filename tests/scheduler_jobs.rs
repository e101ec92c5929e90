mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dex_analytics::scheduler::{BalanceFetchJob, DiscoveryJob, Scheduler};
use dex_analytics::service::{BalanceService, MarketService};
use dex_analytics::storage::{MarketCatalog, MemoryMarketCatalog, MemoryTimeSeriesStore};
use rust_decimal_macros::dec;
use support::{discovered, eventually, ScriptedFetcher};

#[tokio::test]
async fn discovery_then_balance_jobs_fill_the_store() -> Result<()> {
    let catalog = Arc::new(MemoryMarketCatalog::new());
    let store = Arc::new(MemoryTimeSeriesStore::new());
    let fetcher = Arc::new(
        ScriptedFetcher::new().with_balance("https://one.example", dec!(1), dec!(2)),
    );
    fetcher.set_discovered(vec![discovered("https://one.example", 'a', 'b')]);

    let markets = MarketService::new(catalog.clone(), fetcher.clone());
    let balances = BalanceService::new(store.clone(), catalog.clone(), fetcher.clone());

    let mut scheduler = Scheduler::new();
    scheduler.register_periodic(
        Duration::from_secs(3600),
        Arc::new(DiscoveryJob::new(markets)),
        true,
    );
    scheduler.register_periodic(
        Duration::from_millis(20),
        Arc::new(BalanceFetchJob::new(balances)),
        false,
    );

    let catalog_ref = &catalog;
    assert!(
        eventually(|| async move {
            catalog_ref
                .markets_by_active(true)
                .await
                .map(|m| m.len() == 1)
                .unwrap_or(false)
        })
        .await
    );

    let store_ref = &store;
    assert!(eventually(|| async move { store_ref.balance_count().await >= 1 }).await);

    scheduler.shutdown();
    assert_eq!(scheduler.job_names().count(), 0);
    Ok(())
}
