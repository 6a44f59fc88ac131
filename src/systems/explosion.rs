//! Explosion processing system - drives the queue against the ECS world.

use crate::components::{Contained, Health, Position, Velocity};
use crate::config::{ExplosionRng, SimConfig, SimTick};
use crate::damage::DamageSpecifier;
use crate::edges::GridEdgeIndex;
use crate::explosion::processor::TileOccupant;
use crate::explosion::{generate_for_request, Explosion, ExplosionEffects, ExplosionQueue, ExplosionTypes, TileWorld};
use crate::grid::{GridId, GridMap, TileDefs, TileId};
use crate::obstruction::ObstructionIndex;
use crate::spatial::SpatialGrid;
use crate::world::{ExplosionEvent, ExplosionFinished};
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemParam;
use glam::{Affine2, IVec2, Vec2};
use log::trace;

/// Explosion events produced since the last snapshot.
#[derive(Resource, Debug, Default)]
pub struct ExplosionEventBuffer {
    pub events: Vec<ExplosionEvent>,
    pub finished: Vec<ExplosionFinished>,
}

impl ExplosionEventBuffer {
    pub fn clear(&mut self) {
        self.events.clear();
        self.finished.clear();
    }
}

/// [`ExplosionEffects`] over the live ECS world.
#[derive(SystemParam)]
pub struct EcsEffects<'w, 's> {
    grids: ResMut<'w, GridMap>,
    edges: ResMut<'w, GridEdgeIndex>,
    defs: Res<'w, TileDefs>,
    spatial: Res<'w, SpatialGrid>,
    bodies: Query<'w, 's, (&'static Position, Has<Contained>)>,
    health: Query<'w, 's, &'static mut Health>,
    velocity: Query<'w, 's, &'static mut Velocity>,
}

impl EcsEffects<'_, '_> {
    /// Read-only view of the tile state for tile generation.
    pub fn tile_world<'a>(&'a self, obstructions: &'a ObstructionIndex) -> TileWorld<'a> {
        TileWorld {
            grids: &self.grids,
            defs: &self.defs,
            edges: &self.edges,
            obstructions,
        }
    }
}

impl ExplosionEffects for EcsEffects<'_, '_> {
    fn entities_on_tile(&mut self, frame: Affine2, tile: IVec2) -> Vec<TileOccupant> {
        let center = frame.transform_point2(tile.as_vec2() + Vec2::splat(0.5));
        let radius = frame.transform_vector2(Vec2::splat(0.5)).length() + 1e-3;
        let inverse = frame.inverse();

        self.spatial
            .query_radius(center.x, center.y, radius)
            .into_iter()
            .filter_map(|entry| {
                let (pos, contained) = self.bodies.get(entry.entity).ok()?;
                let position = pos.as_vec2();
                let local = inverse.transform_point2(position).floor().as_ivec2();
                (local == tile).then_some(TileOccupant {
                    entity: entry.entity,
                    position,
                    contained,
                })
            })
            .collect()
    }

    fn apply_damage(&mut self, entity: Entity, damage: &DamageSpecifier) {
        if let Ok(mut health) = self.health.get_mut(entity) {
            health.apply(damage);
        }
    }

    fn apply_knockback(&mut self, entity: Entity, impulse: Vec2) {
        // Anchored obstructions carry no velocity and stay put.
        if let Ok(mut velocity) = self.velocity.get_mut(entity) {
            velocity.add_impulse(impulse);
        }
    }

    fn floor_tile(&self, grid: GridId, tile: IVec2) -> Option<TileId> {
        self.grids.get(grid)?.tile(tile)
    }

    fn tile_defs(&self) -> &TileDefs {
        &self.defs
    }

    fn set_tiles(&mut self, grid: GridId, batch: &[(IVec2, Option<TileId>)]) {
        let Some(target) = self.grids.get_mut(grid) else {
            return;
        };
        for tile in target.set_tiles(batch) {
            self.edges.on_tile_changed(target, tile);
        }
    }
}

/// Spends the per-tick tile budget on queued explosions.
#[allow(clippy::too_many_arguments)]
pub fn explosion_processing_system(
    config: Res<SimConfig>,
    tick: Res<SimTick>,
    types: Res<ExplosionTypes>,
    obstructions: Res<ObstructionIndex>,
    mut queue: ResMut<ExplosionQueue>,
    mut rng: ResMut<ExplosionRng>,
    mut buffer: ResMut<ExplosionEventBuffer>,
    mut effects: EcsEffects,
) {
    if queue.is_idle() {
        return;
    }
    let limits = config.flood_limits();
    let settings = config.process_settings();
    let events = &mut buffer.events;

    let report = queue.tick(config.tiles_per_tick, &mut effects, &mut rng.0, |fx, queued| {
        let world = fx.tile_world(&obstructions);
        let (index, tiles) = generate_for_request(&world, &types, &queued.request, limits)?;
        let prototype = types.get(index)?.clone();
        events.push(ExplosionEvent::from_tiles(queued.id, &prototype.id, &tiles));
        Some(Explosion::new(queued.id, tiles, index, prototype, settings))
    });

    trace!(
        "tick {}: {} explosion tiles processed, {} pending",
        tick.0,
        report.processed,
        queue.pending_count()
    );
    buffer
        .finished
        .extend(report.finished.into_iter().map(|id| ExplosionFinished { id, tick: tick.0 }));
}
