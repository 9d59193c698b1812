//! Dataset raw-data encoding: semicolon-separated decimals truncated to a
//! configurable precision — distinct from the run-length-encoded vectors
//! [`linnyr_experiment::rle`] produces for run results.

pub fn encode(values: &[f64], precision: u32) -> String {
    values
        .iter()
        .map(|v| format!("{:.*}", precision as usize, v))
        .collect::<Vec<_>>()
        .join(";")
}

pub fn decode(text: &str) -> Vec<f64> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(';').map(|s| s.parse().unwrap_or(0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_configured_precision() {
        let values = vec![1.0, 2.5, -3.75];
        let encoded = encode(&values, 2);
        assert_eq!(encoded, "1.00;2.50;-3.75");
        assert_eq!(decode(&encoded), values);
    }
}
