//! Simulation configuration and global tick resources.

use crate::error::ConfigError;
use crate::explosion::flood::FloodLimits;
use crate::explosion::processor::ProcessSettings;
use bevy_ecs::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Configuration for the simulation and explosion tuning.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/30 = 0.0333 for 30 Hz).
    pub fixed_timestep: f32,
    /// Cell size of the entity spatial grid in world units.
    pub spatial_cell_size: f32,
    /// Tile budget: most explosion tiles processed per tick.
    pub tiles_per_tick: usize,
    /// Flood fill iteration cap.
    pub max_iterations: u32,
    /// Flood fill tile count cap.
    pub max_area: usize,
    /// Knockback impulse per unit of tile intensity.
    pub knockback_per_intensity: f32,
    /// Most times a single floor tile can step down per explosion.
    pub max_tile_breaks: u32,
    /// Fraction of velocity kept per second by thrown entities.
    pub velocity_retention: f32,
    /// Seed for floor break rolls.
    pub rng_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        let limits = FloodLimits::default();
        let process = ProcessSettings::default();
        Self {
            fixed_timestep: 1.0 / 30.0, // 30 Hz
            spatial_cell_size: 4.0,
            tiles_per_tick: 100,
            max_iterations: limits.max_iterations,
            max_area: limits.max_area, // pi * 50^2
            knockback_per_intensity: process.knockback_per_intensity,
            max_tile_breaks: process.max_tile_breaks,
            velocity_retention: 0.1,
            rng_seed: 0,
        }
    }
}

impl SimConfig {
    /// Load a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn flood_limits(&self) -> FloodLimits {
        FloodLimits {
            max_iterations: self.max_iterations,
            max_area: self.max_area,
        }
    }

    pub fn process_settings(&self) -> ProcessSettings {
        ProcessSettings {
            knockback_per_intensity: self.knockback_per_intensity,
            max_tile_breaks: self.max_tile_breaks,
        }
    }
}

/// Global simulation tick counter.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Seeded generator for floor break rolls.
#[derive(Resource, Debug, Clone)]
pub struct ExplosionRng(pub ChaCha8Rng);

impl ExplosionRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl Default for ExplosionRng {
    fn default() -> Self {
        Self::from_seed(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json(r#"{"tiles_per_tick": 25, "rng_seed": 7}"#).unwrap();
        assert_eq!(config.tiles_per_tick, 25);
        assert_eq!(config.rng_seed, 7);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.max_area, 7853);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(matches!(
            SimConfig::from_json("{\"tiles_per_tick\": \"lots\"}"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_tick_wraps() {
        let mut tick = SimTick(u64::MAX);
        tick.increment();
        assert_eq!(tick.0, 0);
    }
}
