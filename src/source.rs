use std::future::Future;
use std::time::Duration;

use anyhow::Result;

use crate::model::Bar;

/// Supplier of OHLCV bars for a symbol.
///
/// Implementations return bars in ascending timestamp order covering roughly
/// the last `lookback`; gaps are allowed.
pub trait BarSource: Send + Sync {
    fn get_bars(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: &str,
    ) -> impl Future<Output = Result<Vec<Bar>>> + Send;
}
