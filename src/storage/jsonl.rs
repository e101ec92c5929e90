//! File-backed stores using one JSON object per line.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

use super::bucket::{bucket_balances, bucket_prices};
use super::memory::CatalogState;
use super::{InsertOutcome, MarketCatalog, SeriesQuery, TimeSeriesStore};
use crate::models::{
    DiscoveredMarket, Market, MarketBalancePoint, MarketFilter, MarketId, MarketPricePoint, Page,
};

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

async fn read_jsonl<T: for<'de> serde::Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let file = match fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
    };

    let mut lines = BufReader::new(file).lines();
    let mut items = Vec::new();
    while let Some(line) = lines.next_line().await.context("Failed to read line")? {
        if line.trim().is_empty() {
            continue;
        }
        let item: T = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse JSONL line in {}: {line}", path.display()))?;
        items.push(item);
    }
    Ok(items)
}

async fn append_jsonl<T: serde::Serialize>(path: &Path, item: &T) -> Result<()> {
    ensure_parent(path).await?;

    let mut line = serde_json::to_string(item).context("Failed to serialize item")?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {} for append", path.display()))?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn write_jsonl<'a, T: serde::Serialize + 'a>(
    path: &Path,
    items: impl Iterator<Item = &'a T>,
) -> Result<()> {
    let mut content = String::new();
    for item in items {
        content.push_str(&serde_json::to_string(item).context("Failed to serialize item")?);
        content.push('\n');
    }

    ensure_parent(path).await?;

    let tmp = path.with_extension("jsonl.tmp");
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Balances under `balances/<market>.jsonl`, prices under `prices/<market>.jsonl`.
pub struct JsonlTimeSeriesStore {
    base_path: PathBuf,
}

impl JsonlTimeSeriesStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn series_file(&self, kind: &str, market_id: MarketId) -> PathBuf {
        self.base_path.join(kind).join(format!("{market_id}.jsonl"))
    }

    async fn markets_in(&self, kind: &str, query: &SeriesQuery) -> Result<Vec<MarketId>> {
        if !query.market_ids.is_empty() {
            return Ok(query.market_ids.clone());
        }

        let dir = self.base_path.join(kind);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).map(str::parse) {
                Some(Ok(id)) => ids.push(id),
                _ => debug!(path = %path.display(), "skipping non-market series file"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Reads a market's series, keeping the last write for each timestamp.
    async fn read_series<T>(
        &self,
        kind: &str,
        market_id: MarketId,
        timestamp: impl Fn(&T) -> DateTime<Utc>,
    ) -> Result<Vec<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let items: Vec<T> = read_jsonl(&self.series_file(kind, market_id)).await?;
        let deduped: BTreeMap<DateTime<Utc>, T> =
            items.into_iter().map(|p| (timestamp(&p), p)).collect();
        Ok(deduped.into_values().collect())
    }
}

#[async_trait::async_trait]
impl TimeSeriesStore for JsonlTimeSeriesStore {
    async fn insert_balance(&self, point: &MarketBalancePoint) -> Result<()> {
        append_jsonl(&self.series_file("balances", point.market_id), point).await
    }

    async fn insert_price(&self, point: &MarketPricePoint) -> Result<()> {
        append_jsonl(&self.series_file("prices", point.market_id), point).await
    }

    async fn query_balances(
        &self,
        query: &SeriesQuery,
    ) -> Result<HashMap<MarketId, Vec<MarketBalancePoint>>> {
        let mut points = Vec::new();
        for market_id in self.markets_in("balances", query).await? {
            points.extend(
                self.read_series("balances", market_id, |p: &MarketBalancePoint| p.timestamp)
                    .await?,
            );
        }
        Ok(bucket_balances(&points, query))
    }

    async fn query_prices(
        &self,
        query: &SeriesQuery,
    ) -> Result<HashMap<MarketId, Vec<MarketPricePoint>>> {
        let mut points = Vec::new();
        for market_id in self.markets_in("prices", query).await? {
            points.extend(
                self.read_series("prices", market_id, |p: &MarketPricePoint| p.timestamp)
                    .await?,
            );
        }
        Ok(bucket_prices(&points, query))
    }
}

/// Market catalog persisted as `markets/index.jsonl`, rewritten on every change.
pub struct JsonMarketCatalog {
    index_file: PathBuf,
    lock: Mutex<()>,
}

impl JsonMarketCatalog {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            index_file: base_path.as_ref().join("markets").join("index.jsonl"),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<CatalogState> {
        let markets: Vec<Market> = read_jsonl(&self.index_file).await?;
        Ok(CatalogState::from_markets(markets))
    }

    async fn save(&self, state: &CatalogState) -> Result<()> {
        write_jsonl(&self.index_file, state.markets()).await
    }

    async fn set_active(&self, id: MarketId, active: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        if state.set_active(id, active)? {
            self.save(&state).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketCatalog for JsonMarketCatalog {
    async fn insert_market(&self, market: &DiscoveredMarket) -> Result<InsertOutcome> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let outcome = state.insert(market);
        if matches!(outcome, InsertOutcome::Inserted(_)) {
            self.save(&state).await?;
        }
        Ok(outcome)
    }

    async fn all_markets(&self) -> Result<Vec<Market>> {
        Ok(self.load().await?.markets().cloned().collect())
    }

    async fn markets_by_active(&self, active: bool) -> Result<Vec<Market>> {
        Ok(self.load().await?.by_active(active))
    }

    async fn markets_for_filter(
        &self,
        filters: &[MarketFilter],
        page: Page,
    ) -> Result<Vec<Market>> {
        Ok(self.load().await?.filtered(filters, page))
    }

    async fn activate_market(&self, id: MarketId) -> Result<()> {
        self.set_active(id, true).await
    }

    async fn inactivate_market(&self, id: MarketId) -> Result<()> {
        self.set_active(id, false).await
    }
}
