use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::cache::{WindowKind, WindowSpec};
use crate::ensemble::{EstimatorSpec, TrainOptions};
use crate::error::AppError;
use crate::features::DEFAULT_HORIZONS;
use crate::indicator::IndicatorSpec;
use crate::notify::Identity;
use crate::signals::SignalSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub trader: TraderConfig,
    #[serde(default)]
    pub signal: SignalSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub indicators: BTreeMap<String, IndicatorSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub rest_base_url: String,
    pub symbol: String,
    pub interval: String,
    #[serde(default = "default_training_lookback_days")]
    pub training_lookback_days: u64,
    #[serde(default = "default_live_lookback_days")]
    pub live_lookback_days: u64,
    #[serde(default = "default_tail_lookback_hours")]
    pub tail_lookback_hours: u64,
    #[serde(default = "default_fetch_retry_delay_secs")]
    pub fetch_retry_delay_secs: u64,
    #[serde(default = "default_fetch_max_attempts")]
    pub fetch_max_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_training_lookback_days() -> u64 {
    60
}
fn default_live_lookback_days() -> u64 {
    15
}
fn default_tail_lookback_hours() -> u64 {
    6
}
fn default_fetch_retry_delay_secs() -> u64 {
    5
}
fn default_fetch_max_attempts() -> u32 {
    3
}
fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraderConfig {
    pub poll_interval_secs: u64,
    /// 0 disables periodic retraining.
    pub retrain_every_hours: u64,
    pub horizons: Vec<usize>,
    pub folds: usize,
    pub seed: u64,
    pub estimator: EstimatorSpec,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            retrain_every_hours: 0,
            horizons: DEFAULT_HORIZONS.to_vec(),
            folds: 10,
            seed: 42,
            estimator: EstimatorSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub staleness_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/cache"),
            staleness_minutes: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub channel: String,
    pub username: String,
    pub icon: String,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: "#trading".to_string(),
            username: "sandbox-signal".to_string(),
            icon: ":chart_with_upwards_trend:".to_string(),
            timeout_secs: 10,
        }
    }
}

impl NotifyConfig {
    pub fn identity(&self) -> Identity {
        Identity {
            username: self.username.clone(),
            icon: self.icon.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Unset disables status documents.
    pub sqlite_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: PathBuf,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from("sandbox-signal.log"),
            json: true,
        }
    }
}

/// Parse a Binance kline interval string (e.g. "1s", "1m", "1h", "1d", "1w", "1M") into milliseconds.
pub fn parse_interval_ms(s: &str) -> Result<u64> {
    if s.len() < 2 {
        bail!("invalid interval '{}': expected format like '1m'", s);
    }

    let (num_str, suffix) = s.split_at(s.len() - 1);
    let n: u64 = num_str.parse().with_context(|| {
        format!(
            "invalid interval '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid interval '{}': quantity must be > 0", s);
    }

    let unit_ms = match suffix {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 7 * 86_400_000,
        "M" => 30 * 86_400_000,
        _ => bail!(
            "invalid interval '{}': unsupported suffix '{}', expected one of s/m/h/d/w/M",
            s,
            suffix
        ),
    };

    n.checked_mul(unit_ms)
        .with_context(|| format!("invalid interval '{}': value is too large", s))
}

const HOUR_SECS: u64 = 3_600;

impl ExchangeConfig {
    pub fn interval_ms(&self) -> Result<u64> {
        parse_interval_ms(&self.interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_retry_delay_secs)
    }
}

impl Config {
    /// Read `.env`, then the TOML file at [`DEFAULT_CONFIG_PATH`].
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_str = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&config_str).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(s).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(AppError::Config(msg).into()) };

        if self.exchange.symbol.trim().is_empty() {
            return fail("exchange.symbol is empty".to_string());
        }
        if let Err(e) = self.exchange.interval_ms() {
            return fail(format!("exchange.interval: {:#}", e));
        }
        if self.exchange.fetch_max_attempts == 0 {
            return fail("exchange.fetch_max_attempts must be >= 1".to_string());
        }
        if self.exchange.training_lookback_days == 0 || self.exchange.live_lookback_days == 0 {
            return fail("exchange lookback windows must be at least one day".to_string());
        }
        if self.notify.timeout_secs == 0 {
            return fail("notify.timeout_secs must be > 0".to_string());
        }
        if self.trader.poll_interval_secs == 0 {
            return fail("trader.poll_interval_secs must be > 0".to_string());
        }
        if self.trader.horizons.is_empty() || self.trader.horizons.contains(&0) {
            return fail("trader.horizons must be non-empty positive bar counts".to_string());
        }
        if self.trader.folds < 2 {
            return fail(format!("trader.folds must be >= 2, got {}", self.trader.folds));
        }
        let SignalSettings {
            low_quantile,
            high_quantile,
            aggregate_threshold,
        } = self.signal;
        if !(0.0..=1.0).contains(&low_quantile)
            || !(0.0..=1.0).contains(&high_quantile)
            || low_quantile > high_quantile
        {
            return fail(format!(
                "signal quantiles must satisfy 0 <= low <= high <= 1, got {} / {}",
                low_quantile, high_quantile
            ));
        }
        if aggregate_threshold < 0 {
            return fail("signal.aggregate_threshold must be >= 0".to_string());
        }
        if self.indicators.is_empty() {
            return fail("at least one [indicators.<name>] section is required".to_string());
        }
        for (name, spec) in &self.indicators {
            spec.validate()
                .with_context(|| format!("indicator '{}'", name))?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.trader.poll_interval_secs)
    }

    pub fn retrain_every(&self) -> Option<Duration> {
        match self.trader.retrain_every_hours {
            0 => None,
            h => Some(Duration::from_secs(h.saturating_mul(HOUR_SECS))),
        }
    }

    pub fn training_window(&self) -> WindowSpec {
        self.window(WindowKind::Training, self.exchange.training_lookback_days)
    }

    pub fn live_window(&self) -> WindowSpec {
        self.window(WindowKind::Live, self.exchange.live_lookback_days)
    }

    fn window(&self, kind: WindowKind, days: u64) -> WindowSpec {
        WindowSpec {
            kind,
            full_lookback: Duration::from_secs(days.saturating_mul(24 * HOUR_SECS)),
            tail_lookback: Duration::from_secs(
                self.exchange.tail_lookback_hours.saturating_mul(HOUR_SECS),
            ),
            staleness: Duration::from_secs(self.cache.staleness_minutes.saturating_mul(60)),
        }
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            horizons: self.trader.horizons.clone(),
            folds: self.trader.folds,
            seed: self.trader.seed,
        }
    }

    /// Where fitted signal thresholds for `symbol` are kept.
    pub fn thresholds_path(&self, symbol: &str) -> PathBuf {
        self.cache.dir.join(symbol).join("signal_thresholds.json")
    }
}
