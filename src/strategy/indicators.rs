//! Technical indicators used by the breakout rule

/// Window of the trend filter's moving average.
pub const MA_WINDOW: usize = 5;

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period || period == 0 {
        return None;
    }

    let sum: f64 = values[values.len() - period..].iter().sum();
    Some(sum / period as f64)
}

/// Breakout threshold: today's open plus `k` times yesterday's range.
pub fn target_price(open: f64, range: f64, k: f64) -> f64 {
    open + range * k
}
