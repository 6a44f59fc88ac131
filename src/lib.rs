//! This Bitter Ground - Explosion Core
//!
//! Tile-based explosion propagation for a world of free-floating grids.
//! Explosions flood outward ring by ring across grids and open space, are
//! held back by walls until strong enough to break them, and are applied to
//! the world a bounded number of tiles per fixed tick.
//! Uses `bevy_ecs` for the entity-component-system architecture.

pub mod api;
pub mod components;
pub mod config;
pub mod damage;
pub mod direction;
pub mod edges;
pub mod error;
pub mod explosion;
pub mod grid;
pub mod obstruction;
pub mod spatial;
pub mod systems;
pub mod world;

pub use api::SimWorld;
pub use components::*;
pub use config::{ExplosionRng, SimConfig, SimTick};
pub use damage::DamageSpecifier;
pub use direction::{Direction, DirectionMask};
pub use edges::GridEdgeIndex;
pub use error::ConfigError;
pub use explosion::{
    intensity_to_radius, radius_to_intensity, Epicenter, Explosion, ExplosionQueue, ExplosionRequest,
    ExplosionTiles, ExplosionType, ExplosionTypeIndex, ExplosionTypes, FloodLimits, RegionKind,
};
pub use grid::{Aabb, GridId, GridMap, TileDef, TileDefs, TileGrid, TileId, DEFAULT_TILE_SIZE};
pub use obstruction::{ObstructionIndex, TileObstruction};
pub use spatial::{SpatialEntry, SpatialGrid};
pub use systems::*;
pub use world::{ExplosionEvent, ExplosionFinished, Snapshot};
