//! Damage specifiers - typed damage amounts applied to entities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Damage amounts keyed by damage kind (e.g. "blunt", "heat").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageSpecifier(pub BTreeMap<String, f32>);

impl DamageSpecifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: &str, amount: f32) -> Self {
        *self.0.entry(kind.to_string()).or_insert(0.0) += amount;
        self
    }

    /// Every amount multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.clone(), v * factor)).collect())
    }

    pub fn total(&self) -> f32 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| *v == 0.0)
    }
}
