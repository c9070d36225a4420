use super::ema::ema;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdOutput {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

/// `EMA(fast) - EMA(slow)` and its `EMA(signal)` line.
pub fn macd(series: &[f64], fast: usize, slow: usize, signal: usize) -> MacdOutput {
    let fast_line = ema(series, fast, 0);
    let slow_line = ema(series, slow, 0);
    let line: Vec<f64> = fast_line
        .iter()
        .zip(slow_line.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal, 0);
    MacdOutput {
        macd: line,
        signal: signal_line,
    }
}
