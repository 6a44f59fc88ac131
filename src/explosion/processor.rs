//! Incremental explosion processor.
//!
//! An [`Explosion`] walks its rings in iteration order (then region, then
//! tile) and applies effects for at most `budget` tiles per call. Floor tile
//! changes are collected per grid and written once at the end of the call.

use super::flood::ExplosionTiles;
use super::region::{RegionExplosionState, RegionKind};
use super::types::{ExplosionType, ExplosionTypeIndex};
use crate::damage::DamageSpecifier;
use crate::grid::{GridId, TileDefs, TileId};
use bevy_ecs::entity::Entity;
use glam::{Affine2, IVec2, Vec2};
use log::trace;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};

/// An entity found on a tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileOccupant {
    pub entity: Entity,
    pub position: Vec2,
    /// Entities inside containers are shielded from explosions.
    pub contained: bool,
}

/// The world as seen by the processor.
pub trait ExplosionEffects {
    /// Entities whose position falls inside `tile` of a region with the given
    /// tile-to-world `frame`.
    fn entities_on_tile(&mut self, frame: Affine2, tile: IVec2) -> Vec<TileOccupant>;

    fn apply_damage(&mut self, entity: Entity, damage: &DamageSpecifier);

    fn apply_knockback(&mut self, entity: Entity, impulse: Vec2);

    /// Floor tile currently at `tile`, `None` if it is open space.
    fn floor_tile(&self, grid: GridId, tile: IVec2) -> Option<TileId>;

    fn tile_defs(&self) -> &TileDefs;

    /// Apply a batch of floor changes to one grid.
    fn set_tiles(&mut self, grid: GridId, batch: &[(IVec2, Option<TileId>)]);
}

/// Tuning shared by every explosion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSettings {
    pub knockback_per_intensity: f32,
    pub max_tile_breaks: u32,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            knockback_per_intensity: 0.5,
            max_tile_breaks: 3,
        }
    }
}

/// Result of one [`Explosion::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    pub processed: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    iteration: usize,
    region: usize,
    tile: usize,
}

/// An explosion being streamed into the world.
#[derive(Debug, Clone)]
pub struct Explosion {
    pub id: u64,
    pub type_index: ExplosionTypeIndex,
    pub epicenter: Vec2,
    prototype: ExplosionType,
    settings: ProcessSettings,
    regions: Vec<RegionExplosionState>,
    intensities: Vec<f32>,
    cursor: Cursor,
    processed_entities: HashSet<Entity>,
    tiles_processed: usize,
    total_tiles: usize,
}

impl Explosion {
    pub fn new(
        id: u64,
        tiles: ExplosionTiles,
        type_index: ExplosionTypeIndex,
        prototype: ExplosionType,
        settings: ProcessSettings,
    ) -> Self {
        let total_tiles = tiles.regions.iter().map(|r| r.tile_count()).sum();
        let mut explosion = Self {
            id,
            type_index,
            epicenter: tiles.epicenter,
            prototype,
            settings,
            regions: tiles.regions,
            intensities: tiles.iteration_intensity,
            cursor: Cursor::default(),
            processed_entities: HashSet::new(),
            tiles_processed: 0,
            total_tiles,
        };
        explosion.settle_cursor();
        explosion
    }

    pub fn is_finished(&self) -> bool {
        self.cursor.iteration >= self.intensities.len()
    }

    pub fn total_tiles(&self) -> usize {
        self.total_tiles
    }

    pub fn tiles_processed(&self) -> usize {
        self.tiles_processed
    }

    /// Apply effects for up to `budget` tiles.
    pub fn advance<R: Rng>(&mut self, budget: usize, effects: &mut impl ExplosionEffects, rng: &mut R) -> AdvanceOutcome {
        let mut pending: BTreeMap<GridId, Vec<(IVec2, Option<TileId>)>> = BTreeMap::new();
        let mut processed = 0;

        while processed < budget && !self.is_finished() {
            let cursor = self.cursor;
            let intensity = self.intensities[cursor.iteration];
            let region = &self.regions[cursor.region];
            let kind = region.kind;
            let frame = region.frame;
            let tile = region
                .tile_rings
                .get(&(cursor.iteration as u32))
                .and_then(|ring| ring.get(cursor.tile))
                .copied();
            self.cursor.tile += 1;
            self.settle_cursor();

            let Some(tile) = tile else {
                continue;
            };
            processed += 1;

            match kind {
                RegionKind::Grid(grid) => {
                    let Some(floor) = effects.floor_tile(grid, tile) else {
                        continue;
                    };
                    self.affect_entities(frame, tile, intensity, effects);
                    if let Some(next) = self.roll_floor_break(floor, intensity, effects.tile_defs(), rng) {
                        pending.entry(grid).or_default().push((tile, next));
                    }
                }
                RegionKind::Space => {
                    self.affect_entities(frame, tile, intensity, effects);
                }
            }
        }

        for (grid, batch) in pending {
            effects.set_tiles(grid, &batch);
        }

        self.tiles_processed += processed;
        trace!(
            "explosion {} processed {processed} tiles ({}/{})",
            self.id,
            self.tiles_processed,
            self.total_tiles
        );
        AdvanceOutcome {
            processed,
            finished: self.is_finished(),
        }
    }

    /// Move the cursor onto the next existing tile, or past the end.
    fn settle_cursor(&mut self) {
        while self.cursor.iteration < self.intensities.len() {
            if self.cursor.region >= self.regions.len() {
                self.cursor.iteration += 1;
                self.cursor.region = 0;
                self.cursor.tile = 0;
                continue;
            }
            let ring_len = self.regions[self.cursor.region]
                .tile_rings
                .get(&(self.cursor.iteration as u32))
                .map_or(0, Vec::len);
            if self.cursor.tile < ring_len {
                return;
            }
            self.cursor.region += 1;
            self.cursor.tile = 0;
        }
    }

    fn affect_entities(&mut self, frame: Affine2, tile: IVec2, intensity: f32, effects: &mut impl ExplosionEffects) {
        let damage = self.prototype.damage_per_intensity.scaled(intensity);
        let strength = self.settings.knockback_per_intensity * intensity * self.prototype.knockback_scale;
        for occupant in effects.entities_on_tile(frame, tile) {
            if occupant.contained || !self.processed_entities.insert(occupant.entity) {
                continue;
            }
            if !damage.is_empty() {
                effects.apply_damage(occupant.entity, &damage);
            }
            let direction = (occupant.position - self.epicenter).normalize_or_zero();
            if strength > 0.0 && direction != Vec2::ZERO {
                effects.apply_knockback(occupant.entity, direction * strength);
            }
        }
    }

    /// Roll floor breaks. Returns the replacement tile if the floor changed.
    fn roll_floor_break<R: Rng>(&self, floor: TileId, intensity: f32, defs: &TileDefs, rng: &mut R) -> Option<Option<TileId>> {
        let mut current = Some(floor);
        let mut effective = intensity;
        let mut breaks = 0;
        while let Some(tile) = current {
            if breaks >= self.settings.max_tile_breaks {
                break;
            }
            let Some(def) = defs.get(tile) else {
                break;
            };
            if def.indestructible {
                break;
            }
            let chance = self.prototype.tile_break_chance(effective);
            if chance <= 0.0 || rng.gen::<f32>() >= chance {
                break;
            }
            breaks += 1;
            effective -= self.prototype.tile_break_reroll_reduction;
            current = def.base;
        }
        (breaks > 0).then_some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::GridEdgeIndex;
    use crate::explosion::flood::{generate_tiles, FloodLimits, TileWorld};
    use crate::explosion::Epicenter;
    use crate::grid::{GridMap, TileGrid};
    use crate::obstruction::ObstructionIndex;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    struct MockWorld {
        grids: GridMap,
        defs: TileDefs,
        entities: Vec<(Entity, Vec2, bool)>,
        damage: HashMap<Entity, f32>,
        knockback: HashMap<Entity, Vec2>,
        batches: Vec<(GridId, usize)>,
    }

    impl MockWorld {
        fn new(half: i32, floor: &str) -> Self {
            let defs = TileDefs::standard();
            let id = defs.find(floor).unwrap();
            let mut grids = GridMap::new();
            grids.insert(TileGrid::new(GridId(1), Vec2::ZERO).with_rect(IVec2::splat(-half), IVec2::splat(half), id));
            Self {
                grids,
                defs,
                entities: Vec::new(),
                damage: HashMap::new(),
                knockback: HashMap::new(),
                batches: Vec::new(),
            }
        }

        fn tiles(&self, total: f32) -> ExplosionTiles {
            let mut edges = GridEdgeIndex::new();
            edges.rebuild_grid(self.grids.get(GridId(1)).unwrap());
            let obstructions = ObstructionIndex::new();
            let world = TileWorld {
                grids: &self.grids,
                defs: &self.defs,
                edges: &edges,
                obstructions: &obstructions,
            };
            generate_tiles(
                &world,
                Epicenter::Tile { grid: GridId(1), tile: IVec2::ZERO },
                ExplosionTypeIndex(0),
                total,
                2.0,
                10.0,
                FloodLimits::default(),
            )
            .unwrap()
        }
    }

    impl ExplosionEffects for MockWorld {
        fn entities_on_tile(&mut self, frame: Affine2, tile: IVec2) -> Vec<TileOccupant> {
            let inverse = frame.inverse();
            self.entities
                .iter()
                .filter(|(_, pos, _)| inverse.transform_point2(*pos).floor().as_ivec2() == tile)
                .map(|(entity, position, contained)| TileOccupant {
                    entity: *entity,
                    position: *position,
                    contained: *contained,
                })
                .collect()
        }

        fn apply_damage(&mut self, entity: Entity, damage: &DamageSpecifier) {
            *self.damage.entry(entity).or_default() += damage.total();
        }

        fn apply_knockback(&mut self, entity: Entity, impulse: Vec2) {
            *self.knockback.entry(entity).or_default() += impulse;
            // Throw the entity one tile further out so it lands in a later ring.
            if let Some(e) = self.entities.iter_mut().find(|(e, _, _)| *e == entity) {
                e.1 += impulse.normalize_or_zero();
            }
        }

        fn floor_tile(&self, grid: GridId, tile: IVec2) -> Option<TileId> {
            self.grids.get(grid)?.tile(tile)
        }

        fn tile_defs(&self) -> &TileDefs {
            &self.defs
        }

        fn set_tiles(&mut self, grid: GridId, batch: &[(IVec2, Option<TileId>)]) {
            self.batches.push((grid, batch.len()));
            if let Some(g) = self.grids.get_mut(grid) {
                g.set_tiles(batch);
            }
        }
    }

    fn explosion(world: &MockWorld, total: f32) -> Explosion {
        let ty = ExplosionType::new("test", DamageSpecifier::new().with("blunt", 1.0));
        Explosion::new(1, world.tiles(total), ExplosionTypeIndex(0), ty, ProcessSettings::default())
    }

    #[test]
    fn test_budget_is_never_exceeded() {
        let mut world = MockWorld::new(10, "reinforced_floor");
        let mut explosion = explosion(&world, 200.0);
        let total = explosion.total_tiles();
        assert!(total > 7);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut seen = 0;
        loop {
            let outcome = explosion.advance(7, &mut world, &mut rng);
            assert!(outcome.processed <= 7);
            seen += outcome.processed;
            if outcome.finished {
                break;
            }
            assert_eq!(outcome.processed, 7);
        }
        assert_eq!(seen, total);
        assert!(explosion.is_finished());
        assert_eq!(explosion.advance(7, &mut world, &mut rng).processed, 0);
    }

    #[test]
    fn test_budget_holds_across_region_boundaries() {
        // A 3x3 grid with a large blast spills into space, so the cursor
        // walks from the grid region into the space region mid-call.
        let mut world = MockWorld::new(1, "reinforced_floor");
        let tiles = world.tiles(800.0);
        assert_eq!(tiles.regions.len(), 2);
        assert!(tiles.region(RegionKind::Space).is_some());
        let mut explosion = explosion(&world, 800.0);
        let total = explosion.total_tiles();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let budgets = [1, 3, 5, 2, 7];
        let mut seen = 0;
        for budget in budgets.iter().cycle() {
            let outcome = explosion.advance(*budget, &mut world, &mut rng);
            assert!(outcome.processed <= *budget);
            seen += outcome.processed;
            if outcome.finished {
                break;
            }
            assert_eq!(outcome.processed, *budget);
        }
        assert_eq!(seen, total);
    }

    #[test]
    fn test_entity_damaged_once_even_when_thrown() {
        let mut world = MockWorld::new(10, "reinforced_floor");
        let crew = Entity::from_raw(42);
        let boxed = Entity::from_raw(43);
        world.entities.push((crew, Vec2::new(1.5, 0.5), false));
        world.entities.push((boxed, Vec2::new(-1.5, 0.5), true));

        let mut explosion = explosion(&world, 200.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        while !explosion.advance(3, &mut world, &mut rng).finished {}

        let expected = {
            let tiles = world.tiles(200.0);
            let region = tiles.region(RegionKind::Grid(GridId(1))).unwrap();
            tiles.iteration_intensity[region.ring_of(IVec2::new(1, 0)).unwrap() as usize]
        };
        assert!((world.damage[&crew] - expected).abs() < 1e-4);
        assert!(world.knockback[&crew].x > 0.0);
        assert!(!world.damage.contains_key(&boxed));
    }

    #[test]
    fn test_reinforced_floor_never_breaks() {
        let mut world = MockWorld::new(5, "reinforced_floor");
        let mut explosion = explosion(&world, 150.0);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        while !explosion.advance(50, &mut world, &mut rng).finished {}
        assert!(world.batches.is_empty());
    }

    #[test]
    fn test_floor_breaks_step_down_and_batch_per_call() {
        let mut world = MockWorld::new(5, "steel_floor");
        let ty = ExplosionType {
            tile_break_chance: vec![1.0, 1.0],
            ..ExplosionType::new("shred", DamageSpecifier::new())
        };
        let mut explosion = Explosion::new(1, world.tiles(150.0), ExplosionTypeIndex(0), ty, ProcessSettings::default());
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let outcome = explosion.advance(usize::MAX, &mut world, &mut rng);
        assert!(outcome.finished);
        assert_eq!(world.batches.len(), 1);
        // steel floor -> plating -> lattice -> space
        assert_eq!(world.grids.get(GridId(1)).unwrap().tile(IVec2::ZERO), None);
    }

    #[test]
    fn test_break_count_is_capped() {
        let world = MockWorld::new(1, "steel_floor");
        let ty = ExplosionType {
            tile_break_chance: vec![1.0, 1.0],
            ..ExplosionType::new("shred", DamageSpecifier::new())
        };
        let settings = ProcessSettings {
            max_tile_breaks: 1,
            ..ProcessSettings::default()
        };
        let explosion = Explosion::new(1, world.tiles(5.0), ExplosionTypeIndex(0), ty, settings);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let steel = world.defs.find("steel_floor").unwrap();
        let plating = world.defs.find("plating").unwrap();
        assert_eq!(explosion.roll_floor_break(steel, 10.0, &world.defs, &mut rng), Some(Some(plating)));
    }
}
