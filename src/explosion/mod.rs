//! Explosion propagation and incremental application.
//!
//! An [`ExplosionRequest`] is queued in the [`scheduler::ExplosionQueue`].
//! When it reaches the front of the queue it is materialized: the
//! [`resolver`] finds the grids in range and the open-space frame, and the
//! [`flood`] fill produces intensity rings per region. The resulting
//! [`processor::Explosion`] then streams damage, knockback and floor breaks
//! into the world a bounded number of tiles per tick.

pub mod flood;
pub mod processor;
pub mod region;
pub mod resolver;
pub mod scheduler;
pub mod types;

pub use flood::{generate_tiles, ExplosionTiles, FloodLimits, TileWorld};
pub use processor::{AdvanceOutcome, Explosion, ExplosionEffects};
pub use region::{RegionExplosionState, RegionKind};
pub use scheduler::ExplosionQueue;
pub use types::{ExplosionType, ExplosionTypeIndex, ExplosionTypes};

use crate::grid::GridId;
use glam::{IVec2, Vec2};
use log::warn;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Where an explosion starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Epicenter {
    /// A tile of a grid.
    Tile { grid: GridId, tile: IVec2 },
    /// A world position, on a grid or in open space.
    World(Vec2),
}

/// Parameters of one explosion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionRequest {
    pub epicenter: Epicenter,
    /// Id of a registered [`ExplosionType`].
    pub explosion_type: String,
    /// Total intensity, summed over every tile reached.
    pub total_intensity: f32,
    /// Intensity drop-off per tile of distance.
    pub slope: f32,
    /// Cap on the intensity of any single tile.
    pub max_intensity: f32,
}

impl ExplosionRequest {
    pub fn new(
        epicenter: Epicenter,
        explosion_type: &str,
        total_intensity: f32,
        slope: f32,
        max_intensity: f32,
    ) -> Self {
        Self {
            epicenter,
            explosion_type: explosion_type.to_string(),
            total_intensity,
            slope,
            max_intensity,
        }
    }

    /// Requests with non-positive or non-finite parameters are no-ops.
    pub fn is_valid(&self) -> bool {
        self.total_intensity.is_finite()
            && self.slope.is_finite()
            && self.total_intensity > 0.0
            && self.slope > 0.0
            && self.max_intensity > 0.0
    }
}

/// Look up the request's explosion type and generate its tiles.
///
/// Invalid requests, unknown types and epicenters that resolve to nothing
/// are logged and yield `None`.
pub fn generate_for_request(
    world: &TileWorld,
    types: &ExplosionTypes,
    request: &ExplosionRequest,
    limits: FloodLimits,
) -> Option<(ExplosionTypeIndex, ExplosionTiles)> {
    if !request.is_valid() {
        warn!(
            "ignoring explosion with total {} slope {} max {}",
            request.total_intensity, request.slope, request.max_intensity
        );
        return None;
    }
    let Some(index) = types.index_of(&request.explosion_type) else {
        warn!("unknown explosion type '{}'", request.explosion_type);
        return None;
    };
    let tiles = generate_tiles(
        world,
        request.epicenter,
        index,
        request.total_intensity,
        request.slope,
        request.max_intensity,
        limits,
    );
    if tiles.is_none() {
        warn!("explosion epicenter {:?} resolves to no tile", request.epicenter);
    }
    Some((index, tiles?))
}

/// Total intensity of an explosion reaching `radius` tiles.
///
/// Intensity piles up like a cone of height `slope * radius`. When the cone
/// would poke above `max_intensity` the tip is cut off, leaving a frustum.
pub fn radius_to_intensity(radius: f32, slope: f32, max_intensity: f32) -> f32 {
    let height = slope * radius;
    let mut volume = slope * PI / 3.0 * radius.powi(3);
    if max_intensity > 0.0 && height > max_intensity {
        let tip = height - max_intensity;
        let tip_radius = tip / slope;
        volume -= tip * PI / 3.0 * tip_radius * tip_radius;
    }
    volume
}

/// Approximate radius of an explosion, ignoring the intensity cap.
pub fn intensity_to_radius(total_intensity: f32, slope: f32) -> f32 {
    if total_intensity <= 0.0 || slope <= 0.0 {
        return 0.0;
    }
    (3.0 * total_intensity / (slope * PI)).cbrt()
}
