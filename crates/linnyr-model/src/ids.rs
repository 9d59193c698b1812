//! Canonical identifier and code derivation rules.
//!
//! Every named entity gets a lowercase canonical identifier derived from its
//! display name (and actor, when applicable): trim, collapse internal
//! whitespace, lowercase, substitute a fixed set of punctuation. Processes
//! get monotonically assigned decimal codes; products get Excel-style
//! base-26 letter codes. Links and constraints derive their identifier from
//! their endpoints' codes rather than their own display name, so renaming an
//! endpoint doesn't invalidate everything that refers to the link.

/// Lowercases, trims, collapses internal whitespace to single spaces, then
/// replaces spaces and a fixed set of punctuation with `_` so the result is
/// a valid bare identifier.
pub fn canonical_id(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' | '/' | '\'' => '_',
            c => c,
        })
        .collect()
}

/// Process codes are decimal strings assigned monotonically on creation:
/// the first process created is `"1"`, the second `"2"`, etc.
pub fn process_code(sequence: u32) -> String {
    sequence.to_string()
}

/// Product codes are Excel-style base-26 letter codes: `1 -> A`, `26 -> Z`,
/// `27 -> AA`, `28 -> AB`, ...
pub fn product_code(sequence: u32) -> String {
    let mut n = sequence;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Links derive their identifier from endpoint codes joined by three
/// underscores, so a rename of either endpoint never invalidates a link
/// reference that's keyed on the (stable) code instead of the name.
pub fn link_id(from_code: &str, to_code: &str) -> String {
    format!("{from_code}___{to_code}")
}

/// Constraints use four underscores, distinguishing a constraint between
/// the same two endpoint codes from a link between them.
pub fn constraint_id(from_code: &str, to_code: &str) -> String {
    format!("{from_code}____{to_code}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_collapses_whitespace_and_lowercases() {
        assert_eq!(canonical_id("  Power   Plant  "), "power_plant");
    }

    #[test]
    fn canonical_id_substitutes_punctuation() {
        assert_eq!(canonical_id("CO2-emission/cap"), "co2_emission_cap");
    }

    #[test]
    fn product_codes_roll_over_like_spreadsheet_columns() {
        assert_eq!(product_code(1), "A");
        assert_eq!(product_code(26), "Z");
        assert_eq!(product_code(27), "AA");
        assert_eq!(product_code(28), "AB");
        assert_eq!(product_code(52), "AZ");
        assert_eq!(product_code(53), "BA");
    }

    #[test]
    fn process_codes_are_plain_decimal() {
        assert_eq!(process_code(1), "1");
        assert_eq!(process_code(42), "42");
    }

    #[test]
    fn link_and_constraint_ids_use_different_underscore_counts() {
        assert_eq!(link_id("1", "A"), "1___A");
        assert_eq!(constraint_id("1", "A"), "1____A");
        assert_ne!(link_id("1", "A"), constraint_id("1", "A"));
    }
}
