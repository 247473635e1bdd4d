/// Forward relative return against the mean of the next `period` closes.
///
/// `s[i] = mean(close[i+1 ..= i+period]) / close[i] - 1`
///
/// This is `close.shift(-period).rolling(period).mean() / close - 1`, so the
/// alignment follows the rolling window: the first `period - 1` rows and the
/// last `period` rows have an incomplete window and are `NaN`. A zero or
/// non-finite close also yields `NaN`, as does any missing value inside the window.
pub fn forward_mean_return(close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return out;
    }

    for i in (period - 1)..(n - period) {
        let current = close[i];
        let window_mean = close[i + 1..=i + period].iter().sum::<f64>() / period as f64;
        if current != 0.0 && current.is_finite() && window_mean.is_finite() {
            out[i] = window_mean / current - 1.0;
        }
    }

    out
}
