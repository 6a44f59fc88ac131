//! Public API for the simulation.
//!
//! This module provides the main interface for a game client or admin tool to
//! drive the explosion simulation.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When `step(dt)` is called,
//! the simulation accumulates time and runs fixed updates as needed. Explosions are applied
//! a bounded number of tiles per fixed update, so one large blast never stalls a tick.

use crate::components::*;
use crate::config::{ExplosionRng, SimConfig, SimTick};
use crate::edges::GridEdgeIndex;
use crate::explosion::{generate_for_request, ExplosionQueue, ExplosionRequest, ExplosionTypes, TileWorld};
use crate::grid::{GridId, GridMap, TileDefs, TileGrid, TileId};
use crate::obstruction::{obstruction_index_system, ObstructionIndex, TileObstruction};
use crate::spatial::{spatial_grid_update_system, SpatialGrid};
use crate::systems::*;
use crate::world::{ExplosionEvent, Snapshot};
use bevy_ecs::prelude::*;
use glam::IVec2;
use log::debug;

/// The main simulation world container.
///
/// Holds the ECS world and schedule, providing a clean API for:
/// - Building grids and spawning entities
/// - Queueing, previewing and clearing explosions
/// - Stepping the simulation forward
/// - Extracting state snapshots
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    tick: u64,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
}

impl SimWorld {
    /// Create a new empty simulation world.
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a new simulation world with custom configuration and the
    /// standard tile and explosion registries.
    pub fn with_config(config: SimConfig) -> Self {
        Self::with_registries(config, TileDefs::standard(), ExplosionTypes::standard())
    }

    /// Create a simulation world with custom registries.
    pub fn with_registries(config: SimConfig, defs: TileDefs, types: ExplosionTypes) -> Self {
        let mut world = World::new();

        // Core resources
        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SpatialGrid::new(config.spatial_cell_size));
        world.insert_resource(SimTick(0));
        world.insert_resource(ExplosionRng::from_seed(config.rng_seed));

        // Tile state
        world.insert_resource(defs);
        world.insert_resource(GridMap::new());
        world.insert_resource(GridEdgeIndex::new());
        world.insert_resource(ObstructionIndex::new());

        // Explosions
        world.insert_resource(types);
        world.insert_resource(ExplosionQueue::new());
        world.insert_resource(ExplosionEventBuffer::default());
        world.insert_resource(DestructionEventBuffer::default());
        world.insert_resource(config);

        // Sequential: explosions read the spatial grid and obstruction index
        // built this tick, and thrown entities move after being hit.
        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                spatial_grid_update_system,
                obstruction_index_system,
                explosion_processing_system,
                movement_system,
                destruction_cleanup_system,
            )
                .chain(),
        );

        Self {
            world,
            schedule,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
        }
    }

    /// Step the simulation forward by `dt` seconds.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed updates
    /// as needed.
    pub fn step(&mut self, dt: f32) {
        let fixed_dt = self
            .world
            .get_resource::<SimConfig>()
            .map(|c| c.fixed_timestep)
            .unwrap_or(1.0 / 30.0);

        self.time_accumulator += dt;
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        if let Some(mut dt_res) = self.world.get_resource_mut::<DeltaTime>() {
            dt_res.0 = dt;
        }
        if let Some(mut tick_res) = self.world.get_resource_mut::<SimTick>() {
            tick_res.increment();
        }

        self.schedule.run(&mut self.world);

        self.tick += 1;
        self.time += dt;
    }

    // ------------------------------------------------------------------
    // Grids
    // ------------------------------------------------------------------

    /// Add (or replace) a grid and index its edges.
    pub fn add_grid(&mut self, grid: TileGrid) {
        debug!("adding grid {:?} with {} tiles", grid.id, grid.tile_count());
        self.world.resource_mut::<GridEdgeIndex>().rebuild_grid(&grid);
        self.world.resource_mut::<GridMap>().insert(grid);
    }

    /// Remove a grid with its edges and obstruction records.
    pub fn remove_grid(&mut self, id: GridId) -> Option<TileGrid> {
        self.world.resource_mut::<GridEdgeIndex>().remove_grid(id);
        self.world.resource_mut::<ObstructionIndex>().remove_grid(id);
        self.world.resource_mut::<GridMap>().remove(id)
    }

    pub fn grid(&self, id: GridId) -> Option<&TileGrid> {
        self.world.get_resource::<GridMap>()?.get(id)
    }

    /// Apply a batch of tile changes to a grid. Returns how many tiles
    /// actually changed.
    pub fn set_tiles(&mut self, grid: GridId, batch: &[(IVec2, Option<TileId>)]) -> usize {
        self.world.resource_scope(|world, mut grids: Mut<GridMap>| {
            let Some(target) = grids.get_mut(grid) else {
                return 0;
            };
            let changed = target.set_tiles(batch);
            let mut edges = world.resource_mut::<GridEdgeIndex>();
            for tile in &changed {
                edges.on_tile_changed(target, *tile);
            }
            changed.len()
        })
    }

    pub fn tile_defs(&self) -> &TileDefs {
        self.world.resource::<TileDefs>()
    }

    pub fn explosion_types(&self) -> &ExplosionTypes {
        self.world.resource::<ExplosionTypes>()
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Spawn a free damageable entity.
    pub fn spawn_entity(&mut self, x: f32, y: f32, health: f32) -> Entity {
        self.world.spawn(DamageableBundle::new(x, y, health)).id()
    }

    /// Spawn an entity inside a container. Explosions pass it by.
    pub fn spawn_contained(&mut self, x: f32, y: f32, health: f32) -> Entity {
        self.world.spawn((DamageableBundle::new(x, y, health), Contained)).id()
    }

    /// Spawn an obstruction at the center of a grid tile. Returns `None` if
    /// the grid does not exist.
    ///
    /// The obstruction index is updated right away so that explosions
    /// previewed or queued before the next tick already see it.
    pub fn spawn_obstruction(&mut self, anchored: Anchored, obstruction: Obstruction, health: f32) -> Option<Entity> {
        let center = self
            .world
            .get_resource::<GridMap>()?
            .get(anchored.grid)?
            .tile_center_world(anchored.tile);
        let bundle = ObstructionBundle::new(anchored, center, obstruction, health);
        let data = TileObstruction::from_occupant(
            &bundle.obstruction,
            Some(&bundle.health),
            self.world.resource::<ExplosionTypes>(),
        );
        let entity = self.world.spawn(bundle).id();
        self.world
            .resource_mut::<ObstructionIndex>()
            .insert(entity, anchored.grid, anchored.tile, data);
        Some(entity)
    }

    // ------------------------------------------------------------------
    // Explosions
    // ------------------------------------------------------------------

    /// Queue an explosion. Returns its id. Tiles are generated when it
    /// reaches the front of the queue.
    pub fn queue_explosion(&mut self, request: ExplosionRequest) -> u64 {
        let id = self.world.resource_mut::<ExplosionQueue>().push(request);
        debug!("queued explosion {id}");
        id
    }

    /// Generate the tiles an explosion would reach right now, without queueing
    /// or applying anything.
    pub fn preview_explosion(&self, request: &ExplosionRequest) -> Option<ExplosionEvent> {
        let config = self.world.get_resource::<SimConfig>()?;
        let types = self.world.get_resource::<ExplosionTypes>()?;
        let tile_world = TileWorld {
            grids: self.world.get_resource::<GridMap>()?,
            defs: self.world.get_resource::<TileDefs>()?,
            edges: self.world.get_resource::<GridEdgeIndex>()?,
            obstructions: self.world.get_resource::<ObstructionIndex>()?,
        };
        let (index, tiles) = generate_for_request(&tile_world, types, request, config.flood_limits())?;
        let ty = types.get(index)?;
        Some(ExplosionEvent::from_tiles(0, &ty.id, &tiles))
    }

    /// Drop every queued and active explosion.
    pub fn clear_explosions(&mut self) {
        self.world.resource_mut::<ExplosionQueue>().clear();
    }

    /// True when no explosion is queued or running.
    pub fn explosions_idle(&self) -> bool {
        self.world
            .get_resource::<ExplosionQueue>()
            .map_or(true, ExplosionQueue::is_idle)
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Get a snapshot of the current simulation state. Buffered events are
    /// drained.
    pub fn snapshot(&mut self) -> Snapshot {
        let snapshot = Snapshot::from_world(&mut self.world, self.tick, self.time);
        if let Some(mut buffer) = self.world.get_resource_mut::<ExplosionEventBuffer>() {
            buffer.clear();
        }
        if let Some(mut buffer) = self.world.get_resource_mut::<DestructionEventBuffer>() {
            buffer.clear();
        }
        snapshot
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&mut self) -> String {
        self.snapshot().to_json().unwrap_or_else(|_| "{}".to_string())
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn current_time(&self) -> f32 {
        self.time
    }

    pub fn config(&self) -> Option<&SimConfig> {
        self.world.get_resource::<SimConfig>()
    }

    /// Get the spatial grid reference (for debugging/visualization).
    pub fn spatial_grid(&self) -> Option<&SpatialGrid> {
        self.world.get_resource::<SpatialGrid>()
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explosion::Epicenter;
    use glam::Vec2;

    fn station(half: i32) -> SimWorld {
        let mut sim = SimWorld::new();
        let floor = sim.tile_defs().find("reinforced_floor").unwrap();
        sim.add_grid(TileGrid::new(GridId(1), Vec2::ZERO).with_rect(IVec2::splat(-half), IVec2::splat(half), floor));
        sim
    }

    fn blast(total: f32) -> ExplosionRequest {
        ExplosionRequest::new(Epicenter::Tile { grid: GridId(1), tile: IVec2::ZERO }, "default", total, 2.0, 10.0)
    }

    fn run_until_idle(sim: &mut SimWorld) {
        for _ in 0..500 {
            if sim.explosions_idle() {
                return;
            }
            sim.step(0.05);
        }
        panic!("explosion never finished");
    }

    #[test]
    fn test_new_world() {
        let mut sim = SimWorld::new();
        assert_eq!(sim.current_tick(), 0);
        assert!(sim.explosions_idle());
        let snapshot = sim.snapshot();
        assert!(snapshot.grids.is_empty());
        assert!(snapshot.entities.is_empty());
    }

    #[test]
    fn test_step_advances_tick() {
        let mut sim = SimWorld::new();
        sim.step(0.05);
        assert_eq!(sim.current_tick(), 1);
        sim.step(0.05);
        assert_eq!(sim.current_tick(), 2);
    }

    #[test]
    fn test_explosion_damages_and_throws() {
        let mut sim = station(12);
        let crew = sim.spawn_entity(3.5, 0.5, 10_000.0);
        let id = sim.queue_explosion(blast(300.0));
        run_until_idle(&mut sim);

        let health = sim.world().get::<Health>(crew).unwrap();
        assert!(health.current < health.max);
        // Thrown away from the epicenter.
        for _ in 0..30 {
            sim.step(0.05);
        }
        assert!(sim.world().get::<Position>(crew).unwrap().x > 3.5);

        let snapshot = sim.snapshot();
        assert_eq!(snapshot.explosions.len(), 1);
        assert_eq!(snapshot.explosions[0].id, id);
        assert_eq!(snapshot.finished.len(), 1);
        assert_eq!(snapshot.finished[0].id, id);
        assert_eq!(snapshot.pending_explosions, 0);
        assert_eq!(snapshot.active_explosion, None);

        // Drained.
        let again = sim.snapshot();
        assert!(again.explosions.is_empty());
        assert!(again.finished.is_empty());
    }

    #[test]
    fn test_preview_does_not_apply() {
        let mut sim = station(8);
        let crew = sim.spawn_entity(1.5, 0.5, 100.0);
        let event = sim.preview_explosion(&blast(60.0)).unwrap();
        assert_eq!(event.id, 0);
        assert!(event.total_tiles > 1);
        assert!(sim.explosions_idle());

        sim.step(0.05);
        assert_eq!(sim.world().get::<Health>(crew).unwrap().current, 100.0);
        assert!(sim.snapshot().explosions.is_empty());
    }

    #[test]
    fn test_unknown_type_is_a_no_op() {
        let mut sim = station(4);
        let request = ExplosionRequest::new(Epicenter::World(Vec2::ZERO), "nuke", 50.0, 2.0, 10.0);
        assert!(sim.preview_explosion(&request).is_none());
        sim.queue_explosion(request);
        sim.step(0.05);
        assert!(sim.explosions_idle());
        assert!(sim.snapshot().explosions.is_empty());
    }

    #[test]
    fn test_clear_explosions() {
        let mut sim = station(20);
        sim.queue_explosion(blast(2000.0));
        sim.queue_explosion(blast(2000.0));
        sim.step(0.05);
        assert!(!sim.explosions_idle());

        sim.clear_explosions();
        assert!(sim.explosions_idle());
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.pending_explosions, 0);
        assert_eq!(snapshot.active_explosion, None);
    }

    #[test]
    fn test_sealed_room_shields_outside() {
        let mut sim = station(8);
        for x in -2i32..=2 {
            for y in -2i32..=2 {
                if x.abs() == 2 || y.abs() == 2 {
                    let anchored = Anchored { grid: GridId(1), tile: IVec2::new(x, y) };
                    sim.spawn_obstruction(anchored, Obstruction::wall().indestructible(), 1.0e6)
                        .unwrap();
                }
            }
        }
        let inside = sim.spawn_entity(1.5, 0.5, 1000.0);
        let outside = sim.spawn_entity(4.5, 0.5, 1000.0);

        sim.queue_explosion(blast(80.0));
        run_until_idle(&mut sim);

        assert!(sim.world().get::<Health>(inside).unwrap().current < 1000.0);
        assert_eq!(sim.world().get::<Health>(outside).unwrap().current, 1000.0);
    }

    #[test]
    fn test_set_tiles_updates_edges() {
        let mut sim = station(3);
        assert_eq!(sim.set_tiles(GridId(1), &[(IVec2::ZERO, None)]), 1);
        assert_eq!(sim.set_tiles(GridId(1), &[(IVec2::ZERO, None)]), 0);
        assert_eq!(sim.set_tiles(GridId(9), &[(IVec2::ZERO, None)]), 0);

        let edges = sim.world().resource::<GridEdgeIndex>();
        assert!(edges.is_edge_tile(GridId(1), IVec2::X));
        assert!(!edges.is_edge_tile(GridId(1), IVec2::new(2, 2)));
    }

    #[test]
    fn test_obstruction_needs_grid() {
        let mut sim = SimWorld::new();
        let anchored = Anchored { grid: GridId(4), tile: IVec2::ZERO };
        assert!(sim.spawn_obstruction(anchored, Obstruction::wall(), 10.0).is_none());
    }

    #[test]
    fn test_snapshot_json() {
        let mut sim = station(2);
        sim.spawn_entity(0.5, 0.5, 10.0);
        let json = sim.snapshot_json();
        assert!(json.contains("entities"));
        assert!(json.contains("grids"));
    }
}
