//! Obstruction index - per grid tile blocking data for the flood fill.
//!
//! Every anchored [`Obstruction`] contributes its blocked sides and a
//! destruction threshold per explosion type. When several obstructions share a
//! tile their masks are OR-ed and, per type, the largest threshold is kept.
//! The combined threshold may not match any single occupant; explosion balance
//! depends on this approximation, so it is left as is.

use crate::components::{Anchored, Health, Obstruction};
use crate::direction::DirectionMask;
use crate::explosion::types::{ExplosionTypeIndex, ExplosionTypes};
use crate::grid::GridId;
use bevy_ecs::prelude::*;
use glam::IVec2;
use std::collections::HashMap;

/// Combined blocking data of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileObstruction {
    pub blocked: DirectionMask,
    /// Destruction threshold (in tile intensity) per explosion type index.
    pub tolerance: Vec<f32>,
}

impl TileObstruction {
    pub fn new(blocked: DirectionMask, tolerance: Vec<f32>) -> Self {
        Self { blocked, tolerance }
    }

    /// Threshold for one explosion type. Types without an entry are treated
    /// as unable to destroy the obstruction.
    pub fn tolerance(&self, ty: ExplosionTypeIndex) -> f32 {
        self.tolerance.get(ty.0).copied().unwrap_or(f32::INFINITY)
    }

    /// Blocking data for a single occupant.
    pub fn from_occupant(obstruction: &Obstruction, health: Option<&Health>, types: &ExplosionTypes) -> Self {
        let hp = health.map(|h| h.current).unwrap_or(f32::INFINITY);
        let tolerance = types
            .iter()
            .map(|ty| {
                if obstruction.indestructible {
                    f32::INFINITY
                } else {
                    ty.destruction_threshold(hp)
                }
            })
            .collect();
        Self::new(obstruction.blocked, tolerance)
    }

    fn merge(&mut self, other: &TileObstruction) {
        self.blocked = self.blocked.union(other.blocked);
        if self.tolerance.len() < other.tolerance.len() {
            self.tolerance.resize(other.tolerance.len(), 0.0);
        }
        for (mine, theirs) in self.tolerance.iter_mut().zip(&other.tolerance) {
            *mine = mine.max(*theirs);
        }
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct ObstructionIndex {
    combined: HashMap<GridId, HashMap<IVec2, TileObstruction>>,
    occupants: HashMap<(GridId, IVec2), Vec<(Entity, TileObstruction)>>,
    locations: HashMap<Entity, (GridId, IVec2)>,
}

impl ObstructionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocking data for a tile, if anything obstructs it.
    pub fn get(&self, grid: GridId, tile: IVec2) -> Option<&TileObstruction> {
        self.combined.get(&grid)?.get(&tile)
    }

    /// Insert or move an occupant.
    pub fn insert(&mut self, entity: Entity, grid: GridId, tile: IVec2, data: TileObstruction) {
        self.remove(entity);
        self.occupants
            .entry((grid, tile))
            .or_default()
            .push((entity, data));
        self.locations.insert(entity, (grid, tile));
        self.recombine(grid, tile);
    }

    pub fn remove(&mut self, entity: Entity) {
        let Some((grid, tile)) = self.locations.remove(&entity) else {
            return;
        };
        if let Some(list) = self.occupants.get_mut(&(grid, tile)) {
            list.retain(|(e, _)| *e != entity);
            if list.is_empty() {
                self.occupants.remove(&(grid, tile));
            }
        }
        self.recombine(grid, tile);
    }

    /// Drop every record belonging to a grid.
    pub fn remove_grid(&mut self, grid: GridId) {
        self.combined.remove(&grid);
        self.occupants.retain(|(g, _), _| *g != grid);
        self.locations.retain(|_, (g, _)| *g != grid);
    }

    pub fn occupant_count(&self) -> usize {
        self.locations.len()
    }

    fn recombine(&mut self, grid: GridId, tile: IVec2) {
        let merged = self.occupants.get(&(grid, tile)).and_then(|list| {
            let mut iter = list.iter();
            let mut acc = iter.next()?.1.clone();
            for (_, data) in iter {
                acc.merge(data);
            }
            Some(acc)
        });
        match merged {
            Some(data) => {
                self.combined.entry(grid).or_default().insert(tile, data);
            }
            None => {
                if let Some(tiles) = self.combined.get_mut(&grid) {
                    tiles.remove(&tile);
                }
            }
        }
    }
}

/// System that keeps the obstruction index in sync with anchored obstructions.
pub fn obstruction_index_system(
    types: Res<ExplosionTypes>,
    mut index: ResMut<ObstructionIndex>,
    mut removed: RemovedComponents<Obstruction>,
    changed: Query<
        (Entity, &Obstruction, &Anchored, Option<&Health>),
        Or<(Changed<Obstruction>, Changed<Anchored>, Changed<Health>)>,
    >,
) {
    for entity in removed.read() {
        index.remove(entity);
    }
    for (entity, obstruction, anchored, health) in changed.iter() {
        let data = TileObstruction::from_occupant(obstruction, health, &types);
        index.insert(entity, anchored.grid, anchored.tile, data);
    }
}
