//! Dimension cross-product, orthogonality validation, and combination
//! selector expansion — the combinatorics that run before a single block
//! gets scheduled.

use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CombinationError {
    #[error("selector '{selector}' appears in both dimension {dimension_a} and dimension {dimension_b}")]
    NotOrthogonal {
        selector: String,
        dimension_a: usize,
        dimension_b: usize,
    },
    #[error("combination selector '{0}' expands to itself, directly or transitively")]
    SelfReferential(String),
    #[error("combination selector '{selector}' expands into two selectors from dimension {dimension}")]
    ExpansionNotOrthogonal { selector: String, dimension: usize },
}

/// Rejects an experiment whose dimensions aren't pairwise disjoint, naming
/// the duplicate selector and the two dimensions it appears in.
pub fn validate_orthogonality(dimensions: &[Vec<String>]) -> Result<(), CombinationError> {
    let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
    for (index, dimension) in dimensions.iter().enumerate() {
        for selector in dimension {
            if let Some(&first) = seen.get(selector.as_str()) {
                return Err(CombinationError::NotOrthogonal {
                    selector: selector.clone(),
                    dimension_a: first,
                    dimension_b: index,
                });
            }
            seen.insert(selector, index);
        }
    }
    Ok(())
}

/// The Cartesian product of every dimension's selector set, one selector
/// per dimension per combination.
pub fn cartesian_product(dimensions: &[Vec<String>]) -> Vec<Vec<String>> {
    dimensions.iter().fold(vec![Vec::new()], |combinations, dimension| {
        combinations
            .into_iter()
            .flat_map(|prefix| {
                dimension.iter().map(move |selector| {
                    let mut next = prefix.clone();
                    next.push(selector.clone());
                    next
                })
            })
            .collect()
    })
}

/// A combination selector definition: `name:member_a,member_b,...`. Defined
/// this way rather than a richer grammar because no wire format is named for
/// "a combination selector names a tuple of other selectors" —
/// recorded as an Open Decision.
pub fn parse_combination_selector_defs(defs: &[String]) -> FxHashMap<&str, Vec<&str>> {
    defs.iter()
        .filter_map(|def| def.split_once(':'))
        .map(|(name, members)| (name, members.split(',').map(str::trim).collect()))
        .collect()
}

/// Expands every combination selector in `combo` into its member selectors,
/// transitively, rejecting self-reference and expansions that would put two
/// selectors from the same dimension into the result.
pub fn expand_combination_selectors(
    combo: &[String],
    defs: &FxHashMap<&str, Vec<&str>>,
    dimension_of: &FxHashMap<&str, usize>,
) -> Result<Vec<String>, CombinationError> {
    let mut expanded = Vec::new();
    let mut seen_dimensions: FxHashMap<usize, String> = FxHashMap::default();
    for selector in combo {
        expand_one(selector, defs, &mut Vec::new(), &mut expanded)?;
    }
    for selector in &expanded {
        if let Some(&dim) = dimension_of.get(selector.as_str()) {
            if let Some(previous) = seen_dimensions.insert(dim, selector.clone()) {
                if previous != *selector {
                    return Err(CombinationError::ExpansionNotOrthogonal {
                        selector: selector.clone(),
                        dimension: dim,
                    });
                }
            }
        }
    }
    Ok(expanded)
}

fn expand_one(
    selector: &str,
    defs: &FxHashMap<&str, Vec<&str>>,
    visiting: &mut Vec<String>,
    out: &mut Vec<String>,
) -> Result<(), CombinationError> {
    if visiting.iter().any(|s| s == selector) {
        return Err(CombinationError::SelfReferential(selector.to_string()));
    }
    match defs.get(selector) {
        Some(members) => {
            visiting.push(selector.to_string());
            for member in members {
                expand_one(member, defs, visiting, out)?;
            }
            visiting.pop();
        }
        None => out.push(selector.to_string()),
    }
    Ok(())
}

/// Drops any combination whose selector set intersects the excluded set.
pub fn exclude(combinations: Vec<Vec<String>>, excluded: &[String]) -> Vec<Vec<String>> {
    combinations
        .into_iter()
        .filter(|combo| !combo.iter().any(|s| excluded.contains(s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cartesian_product_of_two_dimensions_is_their_full_cross() {
        let dims = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["x".to_string(), "y".to_string()],
        ];
        let combos = cartesian_product(&dims);
        assert_eq!(combos.len(), 4);
        assert!(combos.contains(&vec!["a".to_string(), "x".to_string()]));
        assert!(combos.contains(&vec!["b".to_string(), "y".to_string()]));
    }

    #[test]
    fn a_selector_shared_across_dimensions_fails_orthogonality() {
        let dims = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["a".to_string(), "c".to_string()],
        ];
        let err = validate_orthogonality(&dims).unwrap_err();
        assert_eq!(
            err,
            CombinationError::NotOrthogonal {
                selector: "a".to_string(),
                dimension_a: 0,
                dimension_b: 1,
            }
        );
    }

    #[test]
    fn a_combination_selector_expands_transitively() {
        let defs_raw = vec!["pair:a,b".to_string(), "trio:pair,c".to_string()];
        let defs = parse_combination_selector_defs(&defs_raw);
        let dimension_of = FxHashMap::default();
        let expanded =
            expand_combination_selectors(&["trio".to_string()], &defs, &dimension_of).unwrap();
        assert_eq!(expanded, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn a_self_referential_combination_selector_is_rejected() {
        let defs_raw = vec!["loop:loop".to_string()];
        let defs = parse_combination_selector_defs(&defs_raw);
        let dimension_of = FxHashMap::default();
        let result = expand_combination_selectors(&["loop".to_string()], &defs, &dimension_of);
        assert_eq!(result, Err(CombinationError::SelfReferential("loop".to_string())));
    }

    #[test]
    fn exclusion_drops_any_combination_containing_an_excluded_selector() {
        let combos = vec![vec!["a".to_string(), "x".to_string()], vec!["b".to_string(), "x".to_string()]];
        let kept = exclude(combos, &["a".to_string()]);
        assert_eq!(kept, vec![vec!["b".to_string(), "x".to_string()]]);
    }
}
