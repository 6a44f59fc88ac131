//! Explosion type prototypes.
//!
//! An explosion type selects the damage dealt per unit of intensity and how
//! readily floor tiles break. Types are addressed by a dense
//! [`ExplosionTypeIndex`] so per-type obstruction tolerances can be stored in
//! plain vectors.

use crate::damage::DamageSpecifier;
use crate::error::ConfigError;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Dense index of a registered explosion type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExplosionTypeIndex(pub usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplosionType {
    pub id: String,
    /// Damage applied per unit of tile intensity.
    pub damage_per_intensity: DamageSpecifier,
    /// Tile break probabilities, paired with `tile_break_intensity`.
    #[serde(default = "default_break_chance")]
    pub tile_break_chance: Vec<f32>,
    /// Intensities at which the matching `tile_break_chance` applies.
    #[serde(default = "default_break_intensity")]
    pub tile_break_intensity: Vec<f32>,
    /// Effective intensity lost after each successful tile break.
    #[serde(default = "default_reroll_reduction")]
    pub tile_break_reroll_reduction: f32,
    /// Multiplier on the global knockback strength.
    #[serde(default = "default_knockback_scale")]
    pub knockback_scale: f32,
}

fn default_break_chance() -> Vec<f32> {
    vec![0.0, 1.0]
}

fn default_break_intensity() -> Vec<f32> {
    vec![0.0, 15.0]
}

fn default_reroll_reduction() -> f32 {
    10.0
}

fn default_knockback_scale() -> f32 {
    1.0
}

impl ExplosionType {
    /// A type with the default break curve and knockback.
    pub fn new(id: &str, damage_per_intensity: DamageSpecifier) -> Self {
        Self {
            id: id.to_string(),
            damage_per_intensity,
            tile_break_chance: default_break_chance(),
            tile_break_intensity: default_break_intensity(),
            tile_break_reroll_reduction: default_reroll_reduction(),
            knockback_scale: default_knockback_scale(),
        }
    }

    /// Probability that a floor tile breaks at the given intensity.
    ///
    /// Piecewise-linear over (`tile_break_intensity`, `tile_break_chance`),
    /// clamped to the end points.
    pub fn tile_break_chance(&self, intensity: f32) -> f32 {
        let points = &self.tile_break_intensity;
        let chances = &self.tile_break_chance;
        let n = points.len().min(chances.len());
        if n == 0 {
            return 0.0;
        }
        if intensity <= points[0] {
            return chances[0].clamp(0.0, 1.0);
        }
        for i in 1..n {
            if intensity <= points[i] {
                let span = points[i] - points[i - 1];
                let t = if span > 0.0 {
                    (intensity - points[i - 1]) / span
                } else {
                    1.0
                };
                return (chances[i - 1] + t * (chances[i] - chances[i - 1])).clamp(0.0, 1.0);
            }
        }
        chances[n - 1].clamp(0.0, 1.0)
    }

    /// Intensity at which an entity with `health` hit points is destroyed.
    ///
    /// Resistances are not modelled; a type that deals no damage can never
    /// destroy anything.
    pub fn destruction_threshold(&self, health: f32) -> f32 {
        let per_intensity = self.damage_per_intensity.total();
        if per_intensity <= 0.0 {
            f32::INFINITY
        } else {
            health.max(0.0) / per_intensity
        }
    }
}

/// Registry of explosion types.
#[derive(Resource, Debug, Clone, Default)]
pub struct ExplosionTypes {
    types: Vec<ExplosionType>,
}

impl ExplosionTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in types: a general purpose blast and a demolition charge that
    /// tears up floors aggressively.
    pub fn standard() -> Self {
        let default = ExplosionType::new(
            "default",
            DamageSpecifier::new().with("blunt", 5.0).with("heat", 5.0),
        );
        let demolition = ExplosionType {
            tile_break_chance: vec![0.0, 0.5, 1.0],
            tile_break_intensity: vec![0.0, 5.0, 10.0],
            tile_break_reroll_reduction: 5.0,
            knockback_scale: 0.5,
            ..ExplosionType::new(
                "demolition",
                DamageSpecifier::new().with("structural", 20.0),
            )
        };
        Self {
            types: vec![default, demolition],
        }
    }

    /// Load a JSON array of explosion types.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let list: Vec<ExplosionType> = serde_json::from_str(json)?;
        let mut types = Self::new();
        for ty in list {
            types.register(ty)?;
        }
        Ok(types)
    }

    pub fn register(&mut self, ty: ExplosionType) -> Result<ExplosionTypeIndex, ConfigError> {
        if self.types.iter().any(|t| t.id == ty.id) {
            return Err(ConfigError::DuplicateExplosionType(ty.id));
        }
        if ty.tile_break_chance.len() != ty.tile_break_intensity.len() {
            return Err(ConfigError::MismatchedBreakCurve {
                id: ty.id,
                chances: ty.tile_break_chance.len(),
                intensities: ty.tile_break_intensity.len(),
            });
        }
        self.types.push(ty);
        Ok(ExplosionTypeIndex(self.types.len() - 1))
    }

    pub fn index_of(&self, id: &str) -> Option<ExplosionTypeIndex> {
        self.types
            .iter()
            .position(|t| t.id == id)
            .map(ExplosionTypeIndex)
    }

    pub fn get(&self, index: ExplosionTypeIndex) -> Option<&ExplosionType> {
        self.types.get(index.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExplosionType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_chance_curve() {
        let ty = ExplosionType::new("t", DamageSpecifier::new().with("blunt", 1.0));
        assert_eq!(ty.tile_break_chance(-5.0), 0.0);
        assert!((ty.tile_break_chance(7.5) - 0.5).abs() < 1e-6);
        assert_eq!(ty.tile_break_chance(100.0), 1.0);
    }

    #[test]
    fn test_destruction_threshold() {
        let ty = ExplosionType::new("t", DamageSpecifier::new().with("blunt", 4.0));
        assert!((ty.destruction_threshold(100.0) - 25.0).abs() < 1e-6);

        let harmless = ExplosionType::new("flash", DamageSpecifier::new());
        assert!(harmless.destruction_threshold(1.0).is_infinite());
    }

    #[test]
    fn test_standard_types_pass_validation() {
        let mut types = ExplosionTypes::new();
        for ty in ExplosionTypes::standard().iter() {
            assert!(types.register(ty.clone()).is_ok(), "{} rejected", ty.id);
        }
        assert_eq!(types.len(), 2);
        assert_eq!(types.index_of("default"), Some(ExplosionTypeIndex(0)));
    }

    #[test]
    fn test_registry_rejects_duplicates_and_bad_curves() {
        let mut types = ExplosionTypes::standard();
        assert_eq!(types.len(), 2);
        assert_eq!(types.index_of("demolition"), Some(ExplosionTypeIndex(1)));

        let dup = ExplosionType::new("default", DamageSpecifier::new());
        assert!(matches!(
            types.register(dup),
            Err(ConfigError::DuplicateExplosionType(_))
        ));

        let bad = ExplosionType {
            tile_break_chance: vec![0.0],
            ..ExplosionType::new("bad", DamageSpecifier::new())
        };
        assert!(matches!(
            types.register(bad),
            Err(ConfigError::MismatchedBreakCurve { .. })
        ));
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let json = r#"[{"id": "mini", "damage_per_intensity": {"heat": 2.0}}]"#;
        let types = ExplosionTypes::from_json(json).unwrap();
        let ty = types.get(ExplosionTypeIndex(0)).unwrap();
        assert_eq!(ty.id, "mini");
        assert_eq!(ty.tile_break_intensity, vec![0.0, 15.0]);
        assert_eq!(ty.tile_break_reroll_reduction, 10.0);
    }
}
