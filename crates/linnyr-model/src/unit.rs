//! Scale-unit registry: name-identified units related to each other by a
//! `scalar * base` definition, with transitive conversion resolution.

use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct ScaleUnit {
    scalar: f64,
    base: String,
}

/// `"1"` is the always-present atomic base unit every other unit ultimately
/// resolves against.
pub const BASE_UNIT: &str = "1";

pub struct UnitRegistry {
    units: FxHashMap<String, ScaleUnit>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        let mut units = FxHashMap::default();
        units.insert(
            BASE_UNIT.to_string(),
            ScaleUnit {
                scalar: 1.0,
                base: BASE_UNIT.to_string(),
            },
        );
        Self { units }
    }

    /// Registers `name` as `scalar * base`. Fails if `name` is already
    /// registered — overwriting an existing unit's definition is not
    /// permitted; use a rename instead.
    pub fn add(&mut self, name: &str, scalar: f64, base: &str) -> Result<(), String> {
        if self.units.contains_key(name) {
            return Err(format!("scale unit '{name}' already exists"));
        }
        self.units.insert(
            name.to_string(),
            ScaleUnit {
                scalar,
                base: base.to_string(),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Renaming a unit to itself is a no-op that always succeeds.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), String> {
        if old == new {
            return Ok(());
        }
        if self.units.contains_key(new) {
            return Err(format!("scale unit '{new}' already exists"));
        }
        let def = self
            .units
            .remove(old)
            .ok_or_else(|| format!("unknown scale unit '{old}'"))?;
        self.units.insert(new.to_string(), def);
        for unit in self.units.values_mut() {
            if unit.base == old {
                unit.base = new.to_string();
            }
        }
        Ok(())
    }

    /// Resolves the scalar factor from `name` back to the atomic base,
    /// following the `base` chain until it reaches `"1"` or a cycle/unknown
    /// reference makes resolution impossible.
    fn resolve_to_atomic(&self, name: &str) -> Option<f64> {
        let mut factor = 1.0;
        let mut current = name;
        let mut steps = 0;
        loop {
            if current == BASE_UNIT {
                return Some(factor);
            }
            let unit = self.units.get(current)?;
            factor *= unit.scalar;
            current = &unit.base;
            steps += 1;
            if steps > self.units.len() + 1 {
                return None; // cyclic base chain
            }
        }
    }

    /// Converts a quantity expressed in `from` into `to`, resolving
    /// transitively through whatever common ancestor both units share.
    /// Returns `None` (the caller maps this to `Value::Undefined`) when
    /// either unit is unknown or the chains never meet.
    pub fn convert(&self, quantity: f64, from: &str, to: &str) -> Option<f64> {
        if from == to {
            return Some(quantity);
        }
        let from_factor = self.resolve_to_atomic(from)?;
        let to_factor = self.resolve_to_atomic(to)?;
        Some(quantity * from_factor / to_factor)
    }

    /// Every registered unit except the implicit `"1"` base, as
    /// `(name, scalar, base)` triples, for persistence.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64, &str)> {
        self.units
            .iter()
            .filter(|(name, _)| name.as_str() != BASE_UNIT)
            .map(|(name, unit)| (name.as_str(), unit.scalar, unit.base.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_a_duplicate_name_is_rejected() {
        let mut units = UnitRegistry::new();
        units.add("kW", 1000.0, "1").unwrap();
        assert!(units.add("kW", 1.0, "1").is_err());
    }

    #[test]
    fn transitive_conversion_through_a_shared_ancestor() {
        let mut units = UnitRegistry::new();
        units.add("kW", 1000.0, "1").unwrap();
        units.add("MW", 1_000_000.0, "1").unwrap();
        assert_eq!(units.convert(1.0, "MW", "kW"), Some(1000.0));
    }

    #[test]
    fn unknown_unit_conversion_is_none() {
        let units = UnitRegistry::new();
        assert_eq!(units.convert(1.0, "bogus", "1"), None);
    }

    #[test]
    fn rename_to_self_is_a_no_op() {
        let mut units = UnitRegistry::new();
        units.add("kW", 1000.0, "1").unwrap();
        units.rename("kW", "kW").unwrap();
        assert!(units.contains("kW"));
    }

    #[test]
    fn rename_updates_dependent_bases() {
        let mut units = UnitRegistry::new();
        units.add("kW", 1000.0, "1").unwrap();
        units.add("MW", 1000.0, "kW").unwrap();
        units.rename("kW", "kilowatt").unwrap();
        assert_eq!(units.convert(1.0, "MW", "kilowatt"), Some(1000.0));
    }
}
