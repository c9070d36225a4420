pub mod atr;
pub mod bollinger;
pub mod consecutive;
pub mod ema;
pub mod macd;
pub mod pivot;
pub mod rolling;
pub mod rsi;
pub mod sma;
pub mod stochastic;

use anyhow::Result;
use serde::Deserialize;

use crate::config::parse_interval_ms;
use crate::error::AppError;
use crate::model::bar::{self, Bar, PriceField};
use crate::model::Frame;

pub use bollinger::BandMode;
pub use pivot::PivotMode;

fn default_close() -> String {
    "close".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovingAverageParams {
    #[serde(default = "default_close")]
    pub column: String,
    #[serde(default = "MovingAverageParams::default_window")]
    pub window: usize,
    #[serde(default)]
    pub min_periods: usize,
}

impl MovingAverageParams {
    fn default_window() -> usize {
        50
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MacdParams {
    pub column: String,
    pub fast_window: usize,
    pub slow_window: usize,
    pub signal_window: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            column: default_close(),
            fast_window: 12,
            slow_window: 26,
            signal_window: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StochasticParams {
    pub window: usize,
    pub k_smooth: usize,
    pub d_smooth: usize,
    pub min_periods: usize,
}

impl Default for StochasticParams {
    fn default() -> Self {
        Self {
            window: 14,
            k_smooth: 0,
            d_smooth: 3,
            min_periods: 0,
        }
    }
}

/// Same knobs as [`StochasticParams`] with `%K` smoothed by default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SlowStochasticParams {
    pub window: usize,
    pub k_smooth: usize,
    pub d_smooth: usize,
}

impl Default for SlowStochasticParams {
    fn default() -> Self {
        Self {
            window: 14,
            k_smooth: 3,
            d_smooth: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AtrParams {
    pub window: usize,
}

impl Default for AtrParams {
    fn default() -> Self {
        Self { window: 14 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BollingerParams {
    pub column: String,
    pub window: usize,
    pub stdev_multiplier: f64,
    pub min_periods: usize,
    pub mode: BandMode,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            column: default_close(),
            window: 20,
            stdev_multiplier: 2.0,
            min_periods: 0,
            mode: BandMode::Ranges,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RsiParams {
    pub column: String,
    pub window: usize,
    pub min_periods: usize,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            column: default_close(),
            window: 14,
            min_periods: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PivotParams {
    pub mode: PivotMode,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConsecutiveParams {
    /// Extra resample periods such as `"1h"` or `"4h"`.
    pub add_periods: Vec<String>,
}

/// Closed set of indicator kinds, each with its own parameters.
///
/// In TOML an indicator is a table with a `kind` key plus that kind's parameters:
///
/// ```toml
/// [indicators.macd]
/// kind = "macd"
/// slow_window = 50
/// fast_window = 15
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorSpec {
    Sma(MovingAverageParams),
    Ema(MovingAverageParams),
    Macd(MacdParams),
    #[serde(alias = "fstoc")]
    Stochastic(StochasticParams),
    #[serde(alias = "sstoc")]
    SlowStochastic(SlowStochasticParams),
    Atr(AtrParams),
    #[serde(alias = "bbands")]
    Bollinger(BollingerParams),
    Rsi(RsiParams),
    Pivot(PivotParams),
    #[serde(alias = "consecutive_periods")]
    Consecutive(ConsecutiveParams),
}

fn config_err(msg: String) -> anyhow::Error {
    AppError::Config(msg).into()
}

fn require_positive(kind: &str, name: &str, v: usize) -> Result<()> {
    if v == 0 {
        return Err(config_err(format!("{}: {} must be > 0", kind, name)));
    }
    Ok(())
}

fn price_column(bars: &[Bar], name: &str) -> Result<Vec<f64>> {
    let field = PriceField::parse(name)
        .ok_or_else(|| AppError::Data(format!("missing input column '{}'", name)))?;
    Ok(bar::column(bars, field))
}

impl IndicatorSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Sma(_) => "sma",
            Self::Ema(_) => "ema",
            Self::Macd(_) => "macd",
            Self::Stochastic(_) => "stochastic",
            Self::SlowStochastic(_) => "slow_stochastic",
            Self::Atr(_) => "atr",
            Self::Bollinger(_) => "bollinger",
            Self::Rsi(_) => "rsi",
            Self::Pivot(_) => "pivot",
            Self::Consecutive(_) => "consecutive",
        }
    }

    /// Reject parameter sets no indicator can run with.
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind_name();
        match self {
            Self::Sma(p) | Self::Ema(p) => require_positive(kind, "window", p.window),
            Self::Macd(p) => {
                require_positive(kind, "fast_window", p.fast_window)?;
                require_positive(kind, "slow_window", p.slow_window)?;
                require_positive(kind, "signal_window", p.signal_window)
            }
            Self::Stochastic(p) => {
                require_positive(kind, "window", p.window)?;
                require_positive(kind, "d_smooth", p.d_smooth)
            }
            Self::SlowStochastic(p) => {
                require_positive(kind, "window", p.window)?;
                require_positive(kind, "d_smooth", p.d_smooth)
            }
            Self::Atr(p) => require_positive(kind, "window", p.window),
            Self::Bollinger(p) => {
                require_positive(kind, "window", p.window)?;
                if !p.stdev_multiplier.is_finite() {
                    return Err(config_err(format!(
                        "{}: stdev_multiplier must be finite",
                        kind
                    )));
                }
                Ok(())
            }
            Self::Rsi(p) => require_positive(kind, "window", p.window),
            Self::Pivot(_) => Ok(()),
            Self::Consecutive(p) => {
                for period in &p.add_periods {
                    parse_interval_ms(period).map_err(|e| {
                        config_err(format!("{}: add_periods entry {:#}", kind, e))
                    })?;
                }
                Ok(())
            }
        }
    }

    /// Run the indicator over `bars`. Column names are unprefixed (`macd`, `signal`, ...).
    pub fn compute(&self, bars: &[Bar]) -> Result<Frame> {
        let frame = Frame::new(bar::timestamps(bars));
        let low = || bar::column(bars, PriceField::Low);
        let high = || bar::column(bars, PriceField::High);
        let close = || bar::column(bars, PriceField::Close);

        match self {
            Self::Sma(p) => {
                let s = price_column(bars, &p.column)?;
                frame.with_column("sma", sma::sma(&s, p.window, p.min_periods))
            }
            Self::Ema(p) => {
                let s = price_column(bars, &p.column)?;
                frame.with_column("ema", ema::ema(&s, p.window, p.min_periods))
            }
            Self::Macd(p) => {
                let s = price_column(bars, &p.column)?;
                let out = macd::macd(&s, p.fast_window, p.slow_window, p.signal_window);
                frame
                    .with_column("macd", out.macd)?
                    .with_column("signal", out.signal)
            }
            Self::Stochastic(p) => {
                let out = stochastic::stochastic(
                    &low(),
                    &high(),
                    &close(),
                    p.window,
                    p.k_smooth,
                    p.d_smooth,
                    p.min_periods,
                );
                frame.with_column("k", out.k)?.with_column("d", out.d)
            }
            Self::SlowStochastic(p) => {
                let out = stochastic::stochastic(
                    &low(),
                    &high(),
                    &close(),
                    p.window,
                    p.k_smooth,
                    p.d_smooth,
                    0,
                );
                frame.with_column("k", out.k)?.with_column("d", out.d)
            }
            Self::Atr(p) => frame.with_column("atr", atr::atr(&low(), &high(), &close(), p.window)),
            Self::Bollinger(p) => {
                let s = price_column(bars, &p.column)?;
                let bands = bollinger::bollinger(&s, p.window, p.stdev_multiplier, p.min_periods);
                match p.mode {
                    BandMode::Ranges => frame
                        .with_column("lower", bands.lower)?
                        .with_column("middle", bands.middle)?
                        .with_column("upper", bands.upper),
                    BandMode::Spread => frame.with_column("spread", bands.spread()),
                }
            }
            Self::Rsi(p) => {
                let s = price_column(bars, &p.column)?;
                frame.with_column("rsi", rsi::rsi(&s, p.window, p.min_periods))
            }
            Self::Pivot(p) => {
                let cols = pivot::pivot_deviation(frame.index(), &close(), p.mode);
                let mut frame = frame;
                for (name, values) in pivot::PIVOT_LEVELS.iter().zip(cols) {
                    frame.push_column(name, values)?;
                }
                Ok(frame)
            }
            Self::Consecutive(p) => {
                let runs = consecutive::run_lengths(&close());
                let mut frame = frame
                    .with_column("up", runs.up)?
                    .with_column("down", runs.down)?;
                for period in &p.add_periods {
                    let interval = parse_interval_ms(period)
                        .map_err(|e| config_err(format!("consecutive: {:#}", e)))?;
                    let runs = consecutive::resampled_run_lengths(bars, interval);
                    frame.push_column(&format!("up_{}", period), runs.up)?;
                    frame.push_column(&format!("down_{}", period), runs.down)?;
                }
                Ok(frame)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize)]
    struct Doc {
        indicators: BTreeMap<String, IndicatorSpec>,
    }

    #[test]
    fn parses_kinds_with_defaults_and_aliases() {
        let doc: Doc = toml::from_str(
            r#"
[indicators.macd]
kind = "macd"
slow_window = 50
fast_window = 15

[indicators.fstoc]
kind = "fstoc"
k_smooth = 8

[indicators.bb]
kind = "bbands"
mode = "spread"

[indicators.atr]
kind = "atr"
"#,
        )
        .expect("parse");
        assert_eq!(
            doc.indicators["macd"],
            IndicatorSpec::Macd(MacdParams {
                column: "close".to_string(),
                fast_window: 15,
                slow_window: 50,
                signal_window: 9,
            })
        );
        match &doc.indicators["fstoc"] {
            IndicatorSpec::Stochastic(p) => {
                assert_eq!(p.k_smooth, 8);
                assert_eq!(p.d_smooth, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &doc.indicators["bb"] {
            IndicatorSpec::Bollinger(p) => assert_eq!(p.mode, BandMode::Spread),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(doc.indicators["atr"], IndicatorSpec::Atr(AtrParams { window: 14 }));
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let res: std::result::Result<Doc, _> = toml::from_str(
            r#"
[indicators.x]
kind = "ichimoku"
"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn zero_window_is_a_config_error() {
        let spec = IndicatorSpec::Rsi(RsiParams {
            window: 0,
            ..RsiParams::default()
        });
        let err = spec.validate().expect_err("invalid");
        assert!(matches!(
            crate::error::classify(&err),
            Some(AppError::Config(_))
        ));
    }

    #[test]
    fn unknown_source_column_is_a_data_error() {
        let spec = IndicatorSpec::Sma(MovingAverageParams {
            column: "vwap".to_string(),
            window: 3,
            min_periods: 0,
        });
        let bars = vec![Bar {
            timestamp_ms: 0,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }];
        let err = spec.compute(&bars).expect_err("missing column");
        assert!(matches!(
            crate::error::classify(&err),
            Some(AppError::Data(_))
        ));
    }
}
