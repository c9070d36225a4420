use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::parse_interval_ms;
use crate::error::AppError;
use crate::model::Bar;
use crate::source::BarSource;

use super::types::{parse_klines, BinanceApiErrorResponse};

/// Maximum rows Binance returns per klines request.
pub const KLINES_PAGE_LIMIT: usize = 1000;

/// Client for the public market-data endpoints.
pub struct BinanceRestClient {
    http: reqwest::Client,
    base_url: String,
    // Simple rate limiter: request count in current minute window
    request_count: AtomicU64,
    window_start: std::sync::Mutex<Instant>,
}

impl BinanceRestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_count: AtomicU64::new(0),
            window_start: std::sync::Mutex::new(Instant::now()),
        })
    }

    fn check_rate_limit(&self) {
        let mut start = self
            .window_start
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if start.elapsed().as_secs() >= 60 {
            *start = Instant::now();
            self.request_count.store(0, Ordering::Relaxed);
        }
        let count = self.request_count.fetch_add(1, Ordering::Relaxed);
        if count > 960 {
            tracing::warn!(count, "Approaching rate limit (80% of 1200/min)");
        }
    }

    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/v3/ping", self.base_url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("ping failed: {}", e)))?
            .error_for_status()
            .context("ping returned error status")?;
        Ok(())
    }

    /// One page of klines starting at `start_ms` (inclusive). Only klines
    /// closed by `end_ms` are returned.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: u64,
        end_ms: u64,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        self.check_rate_limit();
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&endTime={}&limit={}",
            self.base_url,
            symbol,
            interval,
            start_ms,
            end_ms,
            limit.clamp(1, KLINES_PAGE_LIMIT)
        );

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("klines request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<BinanceApiErrorResponse>(&body) {
                return Err(AppError::BinanceApi {
                    code: err.code,
                    msg: err.msg,
                }
                .into());
            }
            return Err(AppError::Network(format!("klines returned {}: {}", status, body)).into());
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("klines body: {}", e)))?;
        Ok(parse_klines(&body, end_ms)?)
    }

    /// All klines in `[start_ms, end_ms]`, paging forward until the range is covered.
    pub async fn get_klines_range(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Vec<Bar>> {
        let interval_ms = parse_interval_ms(interval)
            .map_err(|e| AppError::Config(format!("{:#}", e)))?;
        let mut out: Vec<Bar> = Vec::new();
        let mut cursor = start_ms;
        while cursor <= end_ms {
            let page = self
                .get_klines(symbol, interval, cursor, end_ms, KLINES_PAGE_LIMIT)
                .await?;
            let Some(last) = page.last().map(|b| b.timestamp_ms) else {
                break;
            };
            let full_page = page.len() >= KLINES_PAGE_LIMIT;
            out.extend(page.into_iter().filter(|b| b.timestamp_ms >= cursor));
            if !full_page {
                break;
            }
            cursor = last + interval_ms;
        }
        tracing::debug!(
            symbol,
            interval,
            start_ms,
            end_ms,
            bars = out.len(),
            "klines range fetched"
        );
        Ok(out)
    }
}

impl BarSource for BinanceRestClient {
    async fn get_bars(&self, symbol: &str, lookback: Duration, interval: &str) -> Result<Vec<Bar>> {
        let end_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let start_ms = end_ms.saturating_sub(lookback.as_millis() as u64);
        self.get_klines_range(symbol, interval, start_ms, end_ms)
            .await
            .with_context(|| format!("fetching {} {} bars", symbol, interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let client =
            BinanceRestClient::new("https://api.binance.com/", Duration::from_secs(5)).expect("client");
        assert_eq!(client.base_url, "https://api.binance.com");
    }

    #[test]
    fn rate_limiter_counts_requests() {
        let client =
            BinanceRestClient::new("https://api.binance.com", Duration::from_secs(5)).expect("client");
        client.check_rate_limit();
        client.check_rate_limit();
        assert_eq!(client.request_count.load(Ordering::Relaxed), 2);
    }
}
