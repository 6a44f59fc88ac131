//! Explosion scheduler.
//!
//! Requests wait in a FIFO queue and are only turned into tile rings when
//! they reach the front, so several explosions queued in the same tick do
//! not all pay for their flood fill up front. At most one explosion is
//! active; each tick it gets whatever is left of the tile budget.

use super::processor::{Explosion, ExplosionEffects};
use super::ExplosionRequest;
use bevy_ecs::prelude::*;
use log::debug;
use rand::Rng;
use std::collections::VecDeque;

/// A request waiting in the queue.
#[derive(Debug, Clone)]
pub struct QueuedExplosion {
    pub id: u64,
    pub request: ExplosionRequest,
}

/// What happened during one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    pub started: Vec<u64>,
    pub finished: Vec<u64>,
    /// Requests dropped because they could not be materialized.
    pub rejected: Vec<u64>,
}

#[derive(Resource, Debug, Default)]
pub struct ExplosionQueue {
    pending: VecDeque<QueuedExplosion>,
    active: Option<Explosion>,
    next_id: u64,
}

impl ExplosionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request. Returns its explosion id.
    pub fn push(&mut self, request: ExplosionRequest) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.pending.push_back(QueuedExplosion { id, request });
        id
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active(&self) -> Option<&Explosion> {
        self.active.as_ref()
    }

    /// True when nothing is queued or running.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_none()
    }

    /// Drop every queued and active explosion.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.active = None;
    }

    /// Spend up to `budget` tiles on queued explosions.
    ///
    /// `materialize` turns a dequeued request into an [`Explosion`], or
    /// returns `None` to reject it. It receives the effects so it can read
    /// the world state they wrap.
    pub fn tick<E, R, F>(&mut self, budget: usize, effects: &mut E, rng: &mut R, mut materialize: F) -> TickReport
    where
        E: ExplosionEffects,
        R: Rng,
        F: FnMut(&E, &QueuedExplosion) -> Option<Explosion>,
    {
        let mut report = TickReport::default();
        while report.processed < budget {
            if self.active.is_none() {
                let Some(next) = self.pending.pop_front() else {
                    break;
                };
                match materialize(effects, &next) {
                    Some(explosion) => {
                        debug!("explosion {} started with {} tiles", next.id, explosion.total_tiles());
                        report.started.push(next.id);
                        self.active = Some(explosion);
                    }
                    None => {
                        report.rejected.push(next.id);
                        continue;
                    }
                }
            }
            let Some(active) = self.active.as_mut() else {
                break;
            };
            let outcome = active.advance(budget - report.processed, effects, rng);
            report.processed += outcome.processed;
            if !outcome.finished {
                break;
            }
            debug!("explosion {} finished", active.id);
            report.finished.push(active.id);
            self.active = None;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::damage::DamageSpecifier;
    use crate::explosion::flood::{generate_tiles, FloodLimits, TileWorld};
    use crate::explosion::processor::{ProcessSettings, TileOccupant};
    use crate::explosion::types::{ExplosionType, ExplosionTypeIndex};
    use crate::explosion::Epicenter;
    use crate::edges::GridEdgeIndex;
    use crate::grid::{GridId, GridMap, TileDefs, TileGrid, TileId};
    use crate::obstruction::ObstructionIndex;
    use glam::{Affine2, IVec2, Vec2};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Static {
        grids: GridMap,
        defs: TileDefs,
        edges: GridEdgeIndex,
        obstructions: ObstructionIndex,
    }

    impl Static {
        fn new() -> Self {
            let defs = TileDefs::standard();
            let floor = defs.find("reinforced_floor").unwrap();
            let grid = TileGrid::new(GridId(1), Vec2::ZERO).with_rect(IVec2::splat(-8), IVec2::splat(8), floor);
            let mut edges = GridEdgeIndex::new();
            edges.rebuild_grid(&grid);
            let mut grids = GridMap::new();
            grids.insert(grid);
            Self {
                grids,
                defs,
                edges,
                obstructions: ObstructionIndex::new(),
            }
        }
    }

    impl ExplosionEffects for Static {
        fn entities_on_tile(&mut self, _frame: Affine2, _tile: IVec2) -> Vec<TileOccupant> {
            Vec::new()
        }
        fn apply_damage(&mut self, _entity: Entity, _damage: &DamageSpecifier) {}
        fn apply_knockback(&mut self, _entity: Entity, _impulse: Vec2) {}
        fn floor_tile(&self, grid: GridId, tile: IVec2) -> Option<TileId> {
            self.grids.get(grid)?.tile(tile)
        }
        fn tile_defs(&self) -> &TileDefs {
            &self.defs
        }
        fn set_tiles(&mut self, _grid: GridId, _batch: &[(IVec2, Option<TileId>)]) {}
    }

    fn materialize(world: &Static, queued: &QueuedExplosion) -> Option<Explosion> {
        let tile_world = TileWorld {
            grids: &world.grids,
            defs: &world.defs,
            edges: &world.edges,
            obstructions: &world.obstructions,
        };
        let r = &queued.request;
        let tiles = generate_tiles(
            &tile_world,
            r.epicenter,
            ExplosionTypeIndex(0),
            r.total_intensity,
            r.slope,
            r.max_intensity,
            FloodLimits::default(),
        )?;
        let ty = ExplosionType::new("test", DamageSpecifier::new());
        Some(Explosion::new(queued.id, tiles, ExplosionTypeIndex(0), ty, ProcessSettings::default()))
    }

    fn request(total: f32) -> ExplosionRequest {
        ExplosionRequest::new(Epicenter::Tile { grid: GridId(1), tile: IVec2::ZERO }, "test", total, 2.0, 10.0)
    }

    #[test]
    fn test_fifo_one_active_at_a_time() {
        let mut world = Static::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut queue = ExplosionQueue::new();
        let first = queue.push(request(100.0));
        let second = queue.push(request(100.0));

        let report = queue.tick(5, &mut world, &mut rng, materialize);
        assert_eq!(report.started, vec![first]);
        assert_eq!(report.processed, 5);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.active().map(|e| e.id), Some(first));

        let mut finished = Vec::new();
        for _ in 0..1000 {
            let report = queue.tick(5, &mut world, &mut rng, materialize);
            assert!(report.processed <= 5);
            finished.extend(report.finished);
            if queue.is_idle() {
                break;
            }
        }
        assert_eq!(finished, vec![first, second]);
    }

    #[test]
    fn test_leftover_budget_starts_next_explosion() {
        let mut world = Static::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut queue = ExplosionQueue::new();
        // Two single-tile explosions fit in one tick.
        let a = queue.push(request(0.5));
        let b = queue.push(request(0.5));

        let report = queue.tick(10, &mut world, &mut rng, materialize);
        assert_eq!(report.finished, vec![a, b]);
        assert_eq!(report.processed, 2);
        assert!(queue.is_idle());
    }

    #[test]
    fn test_invalid_requests_are_rejected() {
        let mut world = Static::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut queue = ExplosionQueue::new();
        let bad = queue.push(request(-1.0));
        let good = queue.push(request(0.5));

        let report = queue.tick(10, &mut world, &mut rng, materialize);
        assert_eq!(report.rejected, vec![bad]);
        assert_eq!(report.finished, vec![good]);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut world = Static::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut queue = ExplosionQueue::new();
        queue.push(request(500.0));
        queue.push(request(500.0));
        queue.tick(1, &mut world, &mut rng, materialize);
        assert!(!queue.is_idle());

        queue.clear();
        assert!(queue.is_idle());
        assert_eq!(queue.tick(10, &mut world, &mut rng, materialize).processed, 0);
    }
}
