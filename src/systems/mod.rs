//! ECS systems for the explosion simulation.
//!
//! Systems run chained, once per fixed tick:
//!
//! - `spatial_grid_update_system` - rebuilds the entity spatial grid
//! - `obstruction_index_system` - syncs anchored obstructions into the index
//! - `explosion_processing_system` - materializes queued explosions and
//!   applies a bounded number of tiles
//! - `movement_system` - moves thrown entities
//! - `destruction_cleanup_system` - despawns entities with no health left

pub mod destruction;
pub mod explosion;
pub mod movement;
pub mod serialization;

pub use destruction::*;
pub use explosion::*;
pub use movement::*;
pub use serialization::*;
