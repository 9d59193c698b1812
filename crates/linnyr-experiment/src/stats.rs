//! Descriptive statistics over a chart variable's time series, computed
//! once per experiment run snapshot.

use linnyr_model::VariableStats;

/// `NaN`/infinite samples count as exceptions and are excluded from the
/// rest of the aggregate, matching the evaluator's own "filter absent
/// values out of the aggregate" policy for statistic operators.
pub fn compute(values: &[f64]) -> VariableStats {
    let mut n = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut non_zero_tally = 0usize;
    let mut exceptions = 0usize;
    let mut last = 0.0;

    for &value in values {
        if !value.is_finite() {
            exceptions += 1;
            continue;
        }
        n += 1;
        sum += value;
        min = min.min(value);
        max = max.max(value);
        if value != 0.0 {
            non_zero_tally += 1;
        }
        last = value;
    }

    let mean = if n > 0 { sum / n as f64 } else { 0.0 };
    let variance = if n > 0 {
        values
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| (v - mean).powi(2))
            .sum::<f64>()
            / n as f64
    } else {
        0.0
    };

    VariableStats {
        n,
        sum,
        mean,
        variance,
        min: if n > 0 { min } else { 0.0 },
        max: if n > 0 { max } else { 0.0 },
        non_zero_tally,
        exceptions,
        last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_over_a_plain_series() {
        let stats = compute(&[0.0, 10.0, 10.0, 10.0]);
        assert_eq!(stats.n, 4);
        assert_eq!(stats.sum, 30.0);
        assert_eq!(stats.mean, 7.5);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.non_zero_tally, 3);
        assert_eq!(stats.last, 10.0);
        assert_eq!(stats.exceptions, 0);
    }

    #[test]
    fn non_finite_samples_are_tallied_as_exceptions_and_excluded() {
        let stats = compute(&[1.0, f64::NAN, 3.0]);
        assert_eq!(stats.n, 2);
        assert_eq!(stats.exceptions, 1);
        assert_eq!(stats.sum, 4.0);
    }

    #[test]
    fn an_empty_series_reports_zeroed_statistics() {
        let stats = compute(&[]);
        assert_eq!(stats.n, 0);
        assert_eq!(stats.sum, 0.0);
        assert_eq!(stats.mean, 0.0);
    }
}
