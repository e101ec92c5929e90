use std::sync::Arc;

use tracing::info;

use crate::catalog::{self, ReconcileReport};
use crate::error::AnalyticsResult;
use crate::fetcher::MarketDataFetcher;
use crate::models::{DiscoveredMarket, Market, MarketFilter, Page};
use crate::storage::MarketCatalog;

/// Catalog listing and the discovery cycle.
#[derive(Clone)]
pub struct MarketService {
    catalog: Arc<dyn MarketCatalog>,
    fetcher: Arc<dyn MarketDataFetcher>,
}

impl MarketService {
    pub fn new(catalog: Arc<dyn MarketCatalog>, fetcher: Arc<dyn MarketDataFetcher>) -> Self {
        Self { catalog, fetcher }
    }

    /// Markets matching any filter, ordered by id. No filters lists everything.
    pub async fn list_markets(
        &self,
        filters: &[MarketFilter],
        page: Page,
    ) -> AnalyticsResult<Vec<Market>> {
        page.validate()?;
        for filter in filters {
            filter.validate()?;
        }
        Ok(self.catalog.markets_for_filter(filters, page).await?)
    }

    /// Runs one discovery round and aligns the catalog with it.
    pub async fn discover_and_reconcile(&self) -> AnalyticsResult<ReconcileReport> {
        let providers = self.fetcher.fetch_providers_markets().await?;
        let discovered: Vec<DiscoveredMarket> = providers
            .into_iter()
            .flat_map(|p| p.markets)
            .collect();
        let tracked = self.catalog.all_markets().await?;

        let plan = catalog::plan(&tracked, &discovered);
        let report = catalog::apply(self.catalog.as_ref(), plan).await;
        info!(
            discovered = discovered.len(),
            tracked = tracked.len(),
            activated = report.activated,
            inactivated = report.inactivated,
            inserted = report.inserted,
            failed = report.failed.len(),
            "market discovery complete"
        );
        Ok(report)
    }
}
