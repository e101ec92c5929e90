//! Reconciliation of the tracked market catalog against a discovery round.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::models::{DiscoveredMarket, Market, MarketId, MarketKey};
use crate::storage::{InsertOutcome, MarketCatalog};

/// Catalog operations needed to match a discovery round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub activate: Vec<Market>,
    pub inactivate: Vec<Market>,
    pub insert: Vec<DiscoveredMarket>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.activate.is_empty() && self.inactivate.is_empty() && self.insert.is_empty()
    }
}

/// Three-way split of tracked vs discovered markets.
///
/// Flag changes that would be no-ops are left out, so reconciling the same
/// inputs twice yields an empty second plan. Nothing is ever deleted.
pub fn plan(tracked: &[Market], discovered: &[DiscoveredMarket]) -> ReconcilePlan {
    let discovered_keys: HashSet<MarketKey> = discovered.iter().map(|m| m.key()).collect();
    let tracked_keys: HashSet<MarketKey> = tracked.iter().map(|m| m.key()).collect();

    let mut plan = ReconcilePlan::default();
    for market in tracked {
        let seen = discovered_keys.contains(&market.key());
        match (seen, market.active) {
            (true, false) => plan.activate.push(market.clone()),
            (false, true) => plan.inactivate.push(market.clone()),
            _ => {}
        }
    }

    let mut queued = HashSet::new();
    for market in discovered {
        let key = market.key();
        if !tracked_keys.contains(&key) && queued.insert(key) {
            plan.insert.push(market.clone());
        }
    }
    plan
}

/// What applying a plan did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub activated: usize,
    pub inactivated: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub failed: Vec<(MarketKey, String)>,
}

/// Applies a plan, isolating failures per market.
pub async fn apply(catalog: &dyn MarketCatalog, plan: ReconcilePlan) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for market in plan.inactivate {
        match catalog.inactivate_market(market.id).await {
            Ok(()) => report.inactivated += 1,
            Err(err) => {
                warn!(market_id = %market.id, error = %err, "failed to inactivate market");
                report.failed.push((market.key(), err.to_string()));
            }
        }
    }

    for market in plan.activate {
        match catalog.activate_market(market.id).await {
            Ok(()) => report.activated += 1,
            Err(err) => {
                warn!(market_id = %market.id, error = %err, "failed to activate market");
                report.failed.push((market.key(), err.to_string()));
            }
        }
    }

    for market in plan.insert {
        let key = market.key();
        let outcome = match market.validate() {
            Ok(()) => catalog.insert_market(&market).await,
            Err(err) => Err(anyhow::Error::new(err)),
        };
        match outcome {
            Ok(InsertOutcome::Inserted(stored)) => {
                info!(market_id = %stored.id, url = %stored.url, "tracking new market");
                report.inserted += 1;
            }
            Ok(InsertOutcome::AlreadyPresent(_)) => report.already_present += 1,
            Err(err) => {
                warn!(url = %market.url, error = %err, "failed to insert market");
                report.failed.push((key, err.to_string()));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetId;

    fn asset(c: char) -> AssetId {
        AssetId::from_string(c.to_string().repeat(64))
    }

    fn tracked(id: u64, url: &str, active: bool) -> Market {
        Market {
            id: MarketId::new(id),
            provider_name: "p".to_string(),
            url: url.to_string(),
            base_asset: asset('a'),
            quote_asset: asset('b'),
            active,
        }
    }

    fn found(url: &str) -> DiscoveredMarket {
        DiscoveredMarket::new("p", url, asset('a'), asset('b'))
    }

    fn ids(markets: &[Market]) -> Vec<MarketId> {
        markets.iter().map(|m| m.id).collect()
    }

    #[test]
    fn missing_markets_go_inactive() {
        let tracked = vec![
            tracked(1, "https://a", true),
            tracked(2, "https://b", true),
            tracked(3, "https://c", true),
        ];
        let plan = plan(&tracked, &[found("https://b")]);

        assert_eq!(ids(&plan.inactivate), vec![MarketId::new(1), MarketId::new(3)]);
        assert!(plan.activate.is_empty());
        assert!(plan.insert.is_empty());
    }

    #[test]
    fn new_markets_are_inserted() {
        let plan = plan(&[], &[found("https://x")]);
        assert_eq!(plan.insert, vec![found("https://x")]);
    }

    #[test]
    fn rediscovered_market_is_reactivated() {
        let plan = plan(&[tracked(4, "https://d", false)], &[found("https://d")]);
        assert_eq!(ids(&plan.activate), vec![MarketId::new(4)]);
    }

    #[test]
    fn duplicate_discoveries_insert_once() {
        let plan = plan(&[], &[found("https://x"), found("https://x/")]);
        assert_eq!(plan.insert.len(), 1);
    }

    #[test]
    fn steady_state_is_empty() {
        let plan = plan(
            &[tracked(1, "https://a", true), tracked(2, "https://b", false)],
            &[found("https://a")],
        );
        assert!(plan.is_empty());
    }
}
