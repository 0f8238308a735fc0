use std::collections::HashMap;
use std::path::Path;

use bias_core::{EngineError, EngineResult, FactorId, FactorMeta, SanityBounds};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawRegistry {
    factor: Vec<RawFactor>,
    #[serde(default)]
    sanity_bounds: HashMap<String, RawBounds>,
}

#[derive(Debug, Deserialize)]
struct RawFactor {
    id: String,
    weight_nominal: f64,
    staleness_budget_secs: i64,
    owner: String,
}

#[derive(Debug, Deserialize)]
struct RawBounds {
    min: f64,
    max: f64,
}

/// Declarative, boot-time-only factor configuration. Hot-reload is out of
/// scope; a new registry requires a process restart.
#[derive(Debug, Clone)]
pub struct FactorRegistry {
    meta: HashMap<FactorId, FactorMeta>,
    order: Vec<FactorId>,
}

impl FactorRegistry {
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let parsed: RawRegistry =
            toml::from_str(raw).map_err(|e| EngineError::ConfigInvalid(format!("parse error: {e}")))?;
        Self::from_raw(parsed)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::ConfigInvalid(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&raw)
    }

    fn from_raw(raw: RawRegistry) -> EngineResult<Self> {
        if raw.factor.is_empty() {
            return Err(EngineError::ConfigInvalid("registry declares no factors".into()));
        }

        let mut shared_bounds: HashMap<String, SanityBounds> = HashMap::new();
        for (symbol, b) in raw.sanity_bounds {
            if b.min >= b.max {
                return Err(EngineError::ConfigInvalid(format!(
                    "sanity bounds for '{symbol}' have min >= max"
                )));
            }
            shared_bounds.insert(symbol, SanityBounds { min: b.min, max: b.max });
        }

        let mut meta = HashMap::new();
        let mut order = Vec::new();
        for f in raw.factor {
            if f.weight_nominal < 0.0 {
                return Err(EngineError::ConfigInvalid(format!(
                    "factor '{}' has negative nominal weight",
                    f.id
                )));
            }
            if f.owner.trim().is_empty() {
                return Err(EngineError::ConfigInvalid(format!("factor '{}' has no owner", f.id)));
            }
            let id = FactorId::new(f.id.clone());
            if meta.contains_key(&id) {
                return Err(EngineError::ConfigInvalid(format!("factor '{}' declared twice", f.id)));
            }
            order.push(id.clone());
            meta.insert(
                id.clone(),
                FactorMeta {
                    factor_id: id,
                    weight_nominal: f.weight_nominal,
                    staleness_budget: chrono::Duration::seconds(f.staleness_budget_secs),
                    owner: f.owner,
                    sanity_bounds: if shared_bounds.is_empty() {
                        None
                    } else {
                        Some(shared_bounds.clone())
                    },
                },
            );
        }

        Ok(Self { meta, order })
    }

    pub fn enabled(&self) -> &[FactorId] {
        &self.order
    }

    pub fn get(&self, id: &FactorId) -> Option<&FactorMeta> {
        self.meta.get(id)
    }

    pub fn is_known(&self, id: &FactorId) -> bool {
        self.meta.contains_key(id)
    }

    pub fn owner_of(&self, id: &FactorId) -> Option<&str> {
        self.meta.get(id).map(|m| m.owner.as_str())
    }

    pub fn weight_nominal(&self, id: &FactorId) -> Option<f64> {
        self.meta.get(id).map(|m| m.weight_nominal)
    }

    pub fn sanity_bounds_for(&self, id: &FactorId, symbol: &str) -> Option<SanityBounds> {
        self.meta
            .get(id)
            .and_then(|m| m.sanity_bounds.as_ref())
            .and_then(|b| b.get(symbol))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[factor]]
        id = "credit_spreads"
        weight_nominal = 0.18
        staleness_budget_secs = 86400
        owner = "scheduled_pull"

        [[factor]]
        id = "vix_term"
        weight_nominal = 0.16
        staleness_budget_secs = 3600
        owner = "scheduled_pull"

        [sanity_bounds."^VIX"]
        min = 9.0
        max = 90.0
    "#;

    #[test]
    fn loads_valid_registry() {
        let reg = FactorRegistry::from_toml_str(SAMPLE).unwrap();
        assert_eq!(reg.enabled().len(), 2);
        assert!(reg.is_known(&FactorId::new("vix_term")));
        assert_eq!(reg.owner_of(&FactorId::new("vix_term")), Some("scheduled_pull"));
        let bounds = reg.sanity_bounds_for(&FactorId::new("vix_term"), "^VIX").unwrap();
        assert_eq!(bounds.min, 9.0);
    }

    #[test]
    fn rejects_empty_registry() {
        let err = FactorRegistry::from_toml_str("").unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn rejects_duplicate_factor_id() {
        let toml = r#"
            [[factor]]
            id = "vix_term"
            weight_nominal = 0.1
            staleness_budget_secs = 60
            owner = "a"

            [[factor]]
            id = "vix_term"
            weight_nominal = 0.2
            staleness_budget_secs = 60
            owner = "b"
        "#;
        assert!(FactorRegistry::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_negative_weight() {
        let toml = r#"
            [[factor]]
            id = "vix_term"
            weight_nominal = -0.1
            staleness_budget_secs = 60
            owner = "a"
        "#;
        assert!(FactorRegistry::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_inverted_sanity_bounds() {
        let toml = r#"
            [[factor]]
            id = "vix_term"
            weight_nominal = 0.1
            staleness_budget_secs = 60
            owner = "a"

            [sanity_bounds."^VIX"]
            min = 90.0
            max = 9.0
        "#;
        assert!(FactorRegistry::from_toml_str(toml).is_err());
    }

    #[test]
    fn loads_from_file() {
        use std::io::Write;
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(SAMPLE.as_bytes()).unwrap();
        let reg = FactorRegistry::from_file(tmp.path()).unwrap();
        assert_eq!(reg.enabled().len(), 2);
    }
}
