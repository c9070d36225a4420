use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::Bar;
use crate::source::BarSource;

const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Training,
    Live,
}

impl WindowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Live => "live",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub symbol: String,
    pub kind: WindowKind,
    pub saved_at_ms: u64,
    pub bars: Vec<Bar>,
}

impl CacheSnapshot {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let now_ms = now.timestamp_millis().max(0) as u64;
        Duration::from_millis(now_ms.saturating_sub(self.saved_at_ms))
    }
}

/// File-backed store of bar windows, one directory per symbol.
///
/// Snapshots are named `<saved at>-<kind>-<symbol>.json`, so name order is
/// save order.
#[derive(Debug, Clone)]
pub struct BarCache {
    dir: PathBuf,
}

impl BarCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.dir.join(symbol)
    }

    fn suffix(symbol: &str, kind: WindowKind) -> String {
        format!("-{}-{}.json", kind.as_str(), symbol)
    }

    pub fn save(
        &self,
        symbol: &str,
        kind: WindowKind,
        bars: &[Bar],
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let dir = self.symbol_dir(symbol);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let snapshot = CacheSnapshot {
            symbol: symbol.to_string(),
            kind,
            saved_at_ms: now.timestamp_millis().max(0) as u64,
            bars: bars.to_vec(),
        };
        let name = format!(
            "{}{}",
            now.format(FILE_TIME_FORMAT),
            Self::suffix(symbol, kind)
        );
        let path = dir.join(name);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&snapshot)?)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move snapshot to {}", path.display()))?;
        Ok(path)
    }

    /// Snapshot files for `(symbol, kind)`, oldest first.
    pub fn list(&self, symbol: &str, kind: WindowKind) -> Result<Vec<PathBuf>> {
        let dir = self.symbol_dir(symbol);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let suffix = Self::suffix(symbol, kind);
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
        {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix));
            if matches {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn get_last(&self, symbol: &str, kind: WindowKind) -> Result<Option<CacheSnapshot>> {
        let Some(path) = self.list(symbol, kind)?.pop() else {
            return Ok(None);
        };
        let payload = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let snapshot = serde_json::from_slice(&payload)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Delete every snapshot of `(symbol, kind)` except the newest. Returns the number removed.
    pub fn prune_all_but_latest(&self, symbol: &str, kind: WindowKind) -> Result<usize> {
        let mut files = self.list(symbol, kind)?;
        files.pop();
        for path in &files {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Ok(files.len())
    }
}

/// Union of `cached` and `fetched` deduplicated by timestamp, ascending,
/// keeping only the newest `max_len` bars. A bar already in `cached` wins
/// over a fetched bar with the same timestamp.
pub fn merge_window(cached: &[Bar], fetched: &[Bar], max_len: usize) -> Vec<Bar> {
    let mut by_ts: BTreeMap<u64, Bar> = BTreeMap::new();
    for bar in cached.iter().chain(fetched.iter()) {
        by_ts.entry(bar.timestamp_ms).or_insert(*bar);
    }
    let skip = by_ts.len().saturating_sub(max_len);
    by_ts.into_values().skip(skip).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub kind: WindowKind,
    pub full_lookback: Duration,
    pub tail_lookback: Duration,
    pub staleness: Duration,
}

/// Which path a refresh took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Tail,
    Full,
}

/// Keeps one bar window per `(symbol, kind)` current with as few fetches as possible.
#[derive(Debug, Clone)]
pub struct IncrementalCache {
    store: BarCache,
}

impl IncrementalCache {
    pub fn new(store: BarCache) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &BarCache {
        &self.store
    }

    /// Fresh snapshot: fetch the tail and merge, keeping the previous window
    /// length. Otherwise fetch the full lookback. The result is saved and
    /// older snapshots of the same kind are pruned.
    pub async fn refresh<S: BarSource>(
        &self,
        source: &S,
        symbol: &str,
        interval: &str,
        spec: &WindowSpec,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Bar>, RefreshMode)> {
        let last = match self.store.get_last(symbol, spec.kind) {
            Ok(last) => last,
            Err(e) => {
                tracing::warn!(
                    symbol,
                    kind = spec.kind.as_str(),
                    error = %e,
                    "unreadable cache snapshot, falling back to full fetch"
                );
                None
            }
        };
        let fresh = last
            .filter(|s| !s.bars.is_empty() && s.age(now) < spec.staleness);

        let (window, mode) = match fresh {
            Some(snapshot) => {
                let tail = source.get_bars(symbol, spec.tail_lookback, interval).await?;
                let merged = merge_window(&snapshot.bars, &tail, snapshot.bars.len());
                tracing::debug!(
                    symbol,
                    kind = spec.kind.as_str(),
                    fetched = tail.len(),
                    window = merged.len(),
                    "cache tail merged"
                );
                (merged, RefreshMode::Tail)
            }
            None => {
                let bars = source.get_bars(symbol, spec.full_lookback, interval).await?;
                if bars.is_empty() {
                    return Err(AppError::Data(format!(
                        "full fetch for {} returned no bars",
                        symbol
                    ))
                    .into());
                }
                let len = bars.len();
                let merged = merge_window(&[], &bars, len);
                tracing::info!(
                    symbol,
                    kind = spec.kind.as_str(),
                    window = merged.len(),
                    "cache filled from full fetch"
                );
                (merged, RefreshMode::Full)
            }
        };

        self.store.save(symbol, spec.kind, &window, now)?;
        self.store.prune_all_but_latest(symbol, spec.kind)?;
        Ok((window, mode))
    }
}
