//! Snapshot types.
//!
//! The `Snapshot` struct is a serializable view of the simulation state that
//! renderers and replication layers consume. Explosion events describe the
//! generated rings once per explosion so observers can draw the blast without
//! re-running the flood fill.

use crate::components::*;
use crate::explosion::{ExplosionQueue, ExplosionTiles, RegionKind};
use crate::grid::GridMap;
use crate::systems::destruction::{DestroyedEntity, DestructionEventBuffer};
use crate::systems::explosion::ExplosionEventBuffer;
use bevy_ecs::prelude::*;
use glam::IVec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rings of one region of an explosion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRingsSnapshot {
    pub kind: RegionKind,
    /// Column-major 2x3 tile-to-world matrix.
    pub frame: [f32; 6],
    /// Tiles first reached at each iteration.
    pub rings: BTreeMap<u32, Vec<IVec2>>,
}

/// Emitted when an explosion's tiles are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionEvent {
    /// Queue id, `0` for previews.
    pub id: u64,
    pub explosion_type: String,
    pub epicenter: [f32; 2],
    pub iteration_intensity: Vec<f32>,
    pub regions: Vec<RegionRingsSnapshot>,
    pub space_frame: [f32; 6],
    pub total_tiles: usize,
}

impl ExplosionEvent {
    pub fn from_tiles(id: u64, explosion_type: &str, tiles: &ExplosionTiles) -> Self {
        Self {
            id,
            explosion_type: explosion_type.to_string(),
            epicenter: tiles.epicenter.to_array(),
            iteration_intensity: tiles.iteration_intensity.clone(),
            regions: tiles
                .regions
                .iter()
                .map(|r| RegionRingsSnapshot {
                    kind: r.kind,
                    frame: r.frame.to_cols_array(),
                    rings: r.tile_rings.clone(),
                })
                .collect(),
            space_frame: tiles.space_frame.to_cols_array(),
            total_tiles: tiles.total_tiles,
        }
    }
}

/// Emitted when an explosion has been fully applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplosionFinished {
    pub id: u64,
    pub tick: u64,
}

/// A damageable entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub health: f32,
    pub health_max: f32,
    pub obstruction: bool,
}

/// Summary of a grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub tile_size: f32,
    pub tiles: usize,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds.
    pub time: f32,
    pub entities: Vec<EntitySnapshot>,
    pub grids: Vec<GridSnapshot>,
    /// Explosions generated since the last snapshot.
    pub explosions: Vec<ExplosionEvent>,
    /// Explosions finished since the last snapshot.
    pub finished: Vec<ExplosionFinished>,
    /// Entities destroyed since the last snapshot.
    pub destroyed: Vec<DestroyedEntity>,
    pub active_explosion: Option<u64>,
    pub pending_explosions: usize,
}

impl Snapshot {
    /// Create a snapshot from the ECS world. Buffered events are copied, not
    /// drained.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let mut entities = Vec::new();
        let mut query = world.query::<(Entity, &Position, Option<&Velocity>, &Health, Option<&Obstruction>)>();
        for (entity, pos, vel, health, obstruction) in query.iter(world) {
            let vel = vel.copied().unwrap_or_default();
            entities.push(EntitySnapshot {
                id: entity.index(),
                x: pos.x,
                y: pos.y,
                vx: vel.vx,
                vy: vel.vy,
                health: health.current,
                health_max: health.max,
                obstruction: obstruction.is_some(),
            });
        }
        entities.sort_by_key(|e| e.id);

        let grids = world
            .get_resource::<GridMap>()
            .map(|grids| {
                grids
                    .iter()
                    .map(|g| GridSnapshot {
                        id: g.id.0,
                        x: g.position.x,
                        y: g.position.y,
                        rotation: g.rotation,
                        tile_size: g.tile_size,
                        tiles: g.tile_count(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let (explosions, finished) = world
            .get_resource::<ExplosionEventBuffer>()
            .map(|b| (b.events.clone(), b.finished.clone()))
            .unwrap_or_default();

        let destroyed = world
            .get_resource::<DestructionEventBuffer>()
            .map(|b| b.destroyed.clone())
            .unwrap_or_default();

        let (active_explosion, pending_explosions) = world
            .get_resource::<ExplosionQueue>()
            .map(|q| (q.active().map(|e| e.id), q.pending_count()))
            .unwrap_or_default();

        Self {
            tick,
            time,
            entities,
            grids,
            explosions,
            finished,
            destroyed,
            active_explosion,
            pending_explosions,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
