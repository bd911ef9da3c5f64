//! Scalar statistics shared by partition summaries and portfolio metrics.

/// `good / (good + bad) * 100`, zero when nothing was evaluated.
pub fn win_rate(good: usize, bad: usize) -> f64 {
    let decided = good + bad;
    if decided == 0 {
        return 0.0;
    }
    good as f64 / decided as f64 * 100.0
}

/// Mean-over-stddev of trade P&L.
///
/// Zero with fewer than two trades or zero variance, never a division error.
pub fn sharpe_ratio(trade_pnl: &[f64]) -> f64 {
    if trade_pnl.len() < 2 {
        return 0.0;
    }
    let std = std_dev(trade_pnl);
    if std < 1e-15 || !std.is_finite() {
        return 0.0;
    }
    mean_f64(trade_pnl) / std
}

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Mean of the present values; zero when none are present.
pub fn mean_present<I: IntoIterator<Item = Option<f64>>>(values: I) -> f64 {
    let present: Vec<f64> = values.into_iter().flatten().collect();
    mean_f64(&present)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_rate_is_zero_guarded() {
        assert_eq!(win_rate(0, 0), 0.0);
        assert_eq!(win_rate(3, 1), 75.0);
        assert_eq!(win_rate(0, 4), 0.0);
    }

    #[test]
    fn sharpe_zero_variance_is_zero() {
        assert_eq!(sharpe_ratio(&[0.5, 0.5, 0.5]), 0.0);
    }

    #[test]
    fn sharpe_needs_two_trades() {
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sharpe_ratio(&[1.0]), 0.0);
    }

    #[test]
    fn sharpe_known_values() {
        // mean 2, sample std 1
        let s = sharpe_ratio(&[1.0, 2.0, 3.0]);
        assert!((s - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sample_std() {
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138089935299395).abs() < 1e-12);
        assert_eq!(std_dev(&[1.0]), 0.0);
    }

    #[test]
    fn mean_of_present_values() {
        assert_eq!(mean_present([Some(1.0), None, Some(3.0)]), 2.0);
        assert_eq!(mean_present([None, None]), 0.0);
    }
}
