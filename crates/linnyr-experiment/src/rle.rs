//! Run-length-encoded, semicolon-separated decimal vectors — the on-disk
//! representation used for a run's persisted time series.

/// Encodes `values` at `precision` decimal places, collapsing consecutive
/// equal-at-that-precision runs into `"<count>x<value>"`.
pub fn encode(values: &[f64], precision: u32) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut iter = values.iter();
    let Some(&first) = iter.next() else {
        return String::new();
    };
    let mut run_value = round(first, precision);
    let mut run_len: u32 = 1;
    for &raw in iter {
        let value = round(raw, precision);
        if value == run_value {
            run_len += 1;
        } else {
            runs.push(format_run(run_value, run_len, precision));
            run_value = value;
            run_len = 1;
        }
    }
    runs.push(format_run(run_value, run_len, precision));
    runs.join(";")
}

/// The inverse of [`encode`]: expands each `"<count>x<value>"` or bare
/// `"<value>"` token back into its repeated values.
pub fn decode(text: &str) -> Vec<f64> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(';')
        .flat_map(|token| match token.split_once('x') {
            Some((count, value)) => {
                let count: u32 = count.parse().unwrap_or(1);
                let value: f64 = value.parse().unwrap_or(0.0);
                std::iter::repeat(value).take(count as usize)
            }
            None => std::iter::repeat(token.parse().unwrap_or(0.0)).take(1),
        })
        .collect()
}

fn round(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn format_run(value: f64, len: u32, precision: u32) -> String {
    let formatted = format!("{:.*}", precision as usize, value);
    if len > 1 {
        format!("{len}x{formatted}")
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_flat_run_collapses_to_a_single_token() {
        let encoded = encode(&[5.0, 5.0, 5.0, 5.0], 2);
        assert_eq!(encoded, "4x5.00");
    }

    #[test]
    fn mixed_runs_separate_with_semicolons() {
        let encoded = encode(&[0.0, 10.0, 10.0, 10.0], 0);
        assert_eq!(encoded, "0;3x10");
    }

    #[test]
    fn decode_is_the_inverse_of_encode() {
        let values = vec![0.0, 10.0, 10.0, 10.0, 2.5];
        let encoded = encode(&values, 4);
        assert_eq!(decode(&encoded), values);
    }

    #[test]
    fn an_empty_vector_round_trips_to_an_empty_string() {
        assert_eq!(encode(&[], 2), "");
        assert_eq!(decode(""), Vec::<f64>::new());
    }
}
