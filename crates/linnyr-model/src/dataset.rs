//! Dataset time-scaling and wildcard modifier matching.

use regex::Regex;

use crate::entities::{Dataset, DatasetModifier, InterpolationMethod};

impl Dataset {
    /// `defaultValue(d)`: equal to the stored default for every
    /// interpolation method except weighted-sum, which scales by the ratio
    /// of model to dataset timestep duration (a sum over a longer model
    /// step needs proportionally more of the dataset's "per-sample" default).
    pub fn default_value_for(&self, model_dt: f64) -> f64 {
        if self.interpolation == InterpolationMethod::WeightedSum {
            self.default_value * model_dt / self.time_scale
        } else {
            self.default_value
        }
    }

    /// Produces the model-timestep-aligned vector over `[0 .. run_length]`.
    /// Element 0 is the initial value; element 1 corresponds to the first
    /// modeled step. Array datasets skip scaling entirely and are indexed
    /// directly by timestep.
    pub fn compute_vector(&self, model_dt: f64, run_length: usize) -> Vec<f64> {
        if self.array {
            return (0..=run_length)
                .map(|t| self.raw_data.get(t).copied().unwrap_or(0.0))
                .collect();
        }
        if self.raw_data.is_empty() {
            return vec![self.default_value_for(model_dt); run_length + 1];
        }
        let mut out = Vec::with_capacity(run_length + 1);
        out.push(self.raw_at_index(0));
        for t in 1..=run_length {
            let window_start = (t - 1) as f64 * model_dt;
            let window_end = t as f64 * model_dt;
            out.push(self.sample_window(window_start, window_end));
        }
        out
    }

    fn raw_index_for_time(&self, raw_time: f64) -> i64 {
        (raw_time / self.time_scale).floor() as i64
    }

    fn raw_at_index(&self, index: i64) -> f64 {
        let len = self.raw_data.len() as i64;
        if len == 0 {
            return self.default_value;
        }
        let i = if self.periodic {
            index.rem_euclid(len)
        } else {
            index.clamp(0, len - 1)
        };
        self.raw_data[i as usize]
    }

    /// Aggregates every raw sample overlapping `[window_start, window_end)`
    /// according to the dataset's interpolation method.
    fn sample_window(&self, window_start: f64, window_end: f64) -> f64 {
        let first = self.raw_index_for_time(window_start);
        let last = self.raw_index_for_time((window_end - f64::EPSILON).max(window_start));

        match self.interpolation {
            InterpolationMethod::Nearest => {
                let mid = (window_start + window_end) / 2.0;
                self.raw_at_index(self.raw_index_for_time(mid))
            }
            InterpolationMethod::Max => (first..=last)
                .map(|i| self.raw_at_index(i))
                .fold(f64::MIN, f64::max),
            InterpolationMethod::WeightedMean | InterpolationMethod::WeightedSum => {
                let mut weighted_total = 0.0;
                let mut weight_total = 0.0;
                for i in first..=last {
                    let sample_start = i as f64 * self.time_scale;
                    let sample_end = sample_start + self.time_scale;
                    let overlap = overlap_len(window_start, window_end, sample_start, sample_end);
                    if overlap <= 0.0 {
                        continue;
                    }
                    weighted_total += self.raw_at_index(i) * overlap;
                    weight_total += overlap;
                }
                if weight_total <= 0.0 {
                    return 0.0;
                }
                match self.interpolation {
                    InterpolationMethod::WeightedMean => weighted_total / weight_total,
                    InterpolationMethod::WeightedSum => weighted_total / self.time_scale,
                    _ => unreachable!(),
                }
            }
        }
    }
}

fn overlap_len(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

/// Translates a modifier selector into an anchored regex: `?` matches one
/// character, `*` matches any run of characters.
fn selector_regex(selector: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    for c in selector.chars() {
        match c {
            '?' => pattern.push('.'),
            '*' => pattern.push_str(".*"),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// `?`/`*` count as a crude specificity measure: fewer wildcard characters
/// and a longer literal selector both indicate a more targeted match.
fn specificity(selector: &str) -> (usize, std::cmp::Reverse<usize>) {
    let wildcards = selector.chars().filter(|c| *c == '?' || *c == '*').count();
    (wildcards, std::cmp::Reverse(selector.len()))
}

/// Returns every modifier whose selector matches at least one string in
/// `candidates`, ordered from most to least specific (fewest wildcards,
/// then longest selector, wins ties first).
pub fn matching_modifiers<'a>(
    modifiers: &'a [DatasetModifier],
    candidates: &[&str],
) -> Vec<&'a DatasetModifier> {
    let mut matches: Vec<&DatasetModifier> = modifiers
        .iter()
        .filter(|m| {
            selector_regex(&m.selector)
                .map(|re| candidates.iter().any(|c| re.is_match(c)))
                .unwrap_or(false)
        })
        .collect();
    matches.sort_by_key(|m| specificity(&m.selector));
    matches
}

/// The most specific modifier matching `selector`, if any — the rule
/// `attributeExpression` uses to pick a single expression out of several
/// overlapping wildcard modifiers.
pub fn most_specific_modifier<'a>(
    modifiers: &'a [DatasetModifier],
    selector: &str,
) -> Option<&'a DatasetModifier> {
    matching_modifiers(modifiers, &[selector]).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    fn ds(raw: Vec<f64>, dt: f64, method: InterpolationMethod, periodic: bool) -> Dataset {
        Dataset {
            name: "d".into(),
            id: "d".into(),
            default_value: 0.0,
            scale_unit: "1".into(),
            time_scale: dt,
            time_unit: "h".into(),
            interpolation: method,
            periodic,
            array: false,
            raw_data: raw,
            modifiers: Vec::new(),
        }
    }

    #[test]
    fn default_value_scales_only_for_weighted_sum() {
        let mut d = ds(vec![], 2.0, InterpolationMethod::Nearest, false);
        d.default_value = 10.0;
        assert_eq!(d.default_value_for(4.0), 10.0);
        d.interpolation = InterpolationMethod::WeightedSum;
        assert_eq!(d.default_value_for(4.0), 20.0);
    }

    #[test]
    fn array_dataset_is_indexed_directly_without_scaling() {
        let mut d = ds(vec![1.0, 2.0, 3.0], 1.0, InterpolationMethod::Nearest, false);
        d.array = true;
        assert_eq!(d.compute_vector(5.0, 2), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn periodic_dataset_wraps_modulo_raw_length() {
        let d = ds(vec![1.0, 2.0, 3.0], 1.0, InterpolationMethod::Nearest, true);
        assert_eq!(d.raw_at_index(3), 1.0);
        assert_eq!(d.raw_at_index(-1), 3.0);
    }

    #[test]
    fn non_periodic_dataset_clamps_at_edges() {
        let d = ds(vec![1.0, 2.0, 3.0], 1.0, InterpolationMethod::Nearest, false);
        assert_eq!(d.raw_at_index(10), 3.0);
        assert_eq!(d.raw_at_index(-5), 1.0);
    }

    #[test]
    fn weighted_mean_blends_two_raw_samples_covering_one_model_step() {
        let d = ds(vec![0.0, 10.0, 20.0], 1.0, InterpolationMethod::WeightedMean, false);
        // model step of length 1 starting halfway into raw sample 0 overlaps
        // raw[0] for 0.5 and raw[1] for 0.5
        let v = d.sample_window(0.5, 1.5);
        assert!((v - 5.0).abs() < 1e-9);
    }

    #[test]
    fn matching_modifiers_ranks_exact_match_before_wildcards() {
        let modifiers = vec![
            DatasetModifier {
                selector: "abc *".into(),
                expression: Expr::constant("m1", 1.0),
            },
            DatasetModifier {
                selector: "abc 1".into(),
                expression: Expr::constant("m2", 2.0),
            },
        ];
        let best = most_specific_modifier(&modifiers, "abc 1").unwrap();
        assert_eq!(best.selector, "abc 1");
    }
}
