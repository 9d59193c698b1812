//! Model-wide configuration recognized by the host at load time.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::unit::UnitRegistry;

/// A preconfigured scale unit, applied to a fresh [`UnitRegistry`] via
/// [`ModelConfig::apply_scale_units`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleUnitConfig {
    pub name: String,
    pub scalar: f64,
    pub base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub default_time_scale: f64,
    pub default_time_unit: String,
    pub default_currency_unit: String,
    pub default_scale_unit: String,
    pub decimal_comma: bool,
    pub slight_slack_notices: bool,
    pub dataset_precision: u32,
    pub results_precision: u32,
    pub user_name: String,
    pub scale_units: Vec<ScaleUnitConfig>,
    pub min_cluster_size: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_time_scale: 1.0,
            default_time_unit: "h".to_string(),
            default_currency_unit: "EUR".to_string(),
            default_scale_unit: "1".to_string(),
            decimal_comma: false,
            slight_slack_notices: false,
            dataset_precision: 8,
            results_precision: 8,
            user_name: String::new(),
            scale_units: Vec::new(),
            min_cluster_size: 1,
        }
    }
}

impl ModelConfig {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Registers every preconfigured scale unit, in declaration order so
    /// that a later entry may use an earlier one as its base.
    pub fn apply_scale_units(&self, units: &mut UnitRegistry) -> Result<(), String> {
        for unit in &self.scale_units {
            units.add(&unit.name, unit.scalar, &unit.base)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_precision_matches_spec() {
        let config = ModelConfig::default();
        assert_eq!(config.dataset_precision, 8);
        assert_eq!(config.results_precision, 8);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config = ModelConfig::from_json_str(r#"{"user_name": "alice"}"#).unwrap();
        assert_eq!(config.user_name, "alice");
        assert_eq!(config.default_time_unit, "h");
    }

    #[test]
    fn scale_units_apply_in_declaration_order() {
        let config = ModelConfig::from_json_str(
            r#"{"scale_units": [
                {"name": "kW", "scalar": 1000.0, "base": "1"},
                {"name": "MW", "scalar": 1000.0, "base": "kW"}
            ]}"#,
        )
        .unwrap();
        let mut units = UnitRegistry::new();
        config.apply_scale_units(&mut units).unwrap();
        assert_eq!(units.convert(1.0, "MW", "1"), Some(1_000_000.0));
    }
}
