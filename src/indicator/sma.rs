/// Trailing simple moving average over `window` values.
///
/// Undefined inputs are skipped; a position is defined once the window holds
/// at least `max(min_periods, 1)` defined values.
pub fn sma(series: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    let mut roll = RollingSum::new(window);
    let min_count = min_periods.max(1);
    series
        .iter()
        .map(|&v| {
            roll.push(v);
            if roll.count >= min_count {
                roll.sum / roll.count as f64
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Ring buffer holding the sum and count of the defined values in the window.
#[derive(Debug, Clone)]
pub(crate) struct RollingSum {
    window: usize,
    buffer: Vec<f64>,
    head: usize,
    pub(crate) count: usize,
    pub(crate) sum: f64,
}

impl RollingSum {
    pub(crate) fn new(window: usize) -> Self {
        assert!(window > 0, "SMA window must be > 0");
        Self {
            window,
            buffer: vec![f64::NAN; window],
            head: 0,
            count: 0,
            sum: 0.0,
        }
    }

    pub(crate) fn push(&mut self, value: f64) {
        self.buffer[self.head] = value;
        self.head = (self.head + 1) % self.window;
        // Summed from the buffer each time; a running total leaves residue
        // when large values leave a window of zeros.
        self.count = self.buffer.iter().filter(|v| !v.is_nan()).count();
        self.sum = self.buffer.iter().filter(|v| !v.is_nan()).sum();
    }
}
