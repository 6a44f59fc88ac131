//! Grid edge index - tiles of each grid that border open space.
//!
//! An edge tile is an occupied tile with at least one empty cardinal
//! neighbor. For every edge tile the index stores which sides face space, so
//! the flood fill knows where an explosion can leave a grid.

use crate::direction::{Direction, DirectionMask};
use crate::grid::{GridId, TileGrid};
use bevy_ecs::prelude::*;
use glam::IVec2;
use std::collections::HashMap;

#[derive(Resource, Debug, Clone, Default)]
pub struct GridEdgeIndex {
    grids: HashMap<GridId, HashMap<IVec2, DirectionMask>>,
}

impl GridEdgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full scan of a grid. Used when a grid is first added.
    pub fn rebuild_grid(&mut self, grid: &TileGrid) {
        let edges = grid
            .tiles()
            .filter_map(|(pos, _)| space_facing(grid, pos).map(|mask| (pos, mask)))
            .collect();
        self.grids.insert(grid.id, edges);
    }

    pub fn remove_grid(&mut self, id: GridId) {
        self.grids.remove(&id);
    }

    /// Recompute edge membership for a changed tile and its cardinal neighbors.
    pub fn on_tile_changed(&mut self, grid: &TileGrid, tile: IVec2) {
        let edges = self.grids.entry(grid.id).or_default();
        for pos in std::iter::once(tile).chain(Direction::ALL.iter().map(|d| tile + d.offset())) {
            match space_facing(grid, pos) {
                Some(mask) => {
                    edges.insert(pos, mask);
                }
                None => {
                    edges.remove(&pos);
                }
            }
        }
    }

    /// True if the tile borders space. Unknown grids have no edges.
    pub fn is_edge_tile(&self, grid: GridId, tile: IVec2) -> bool {
        self.grids
            .get(&grid)
            .is_some_and(|edges| edges.contains_key(&tile))
    }

    /// Sides of the tile that open onto space (empty for non-edge tiles).
    pub fn space_directions(&self, grid: GridId, tile: IVec2) -> DirectionMask {
        self.grids
            .get(&grid)
            .and_then(|edges| edges.get(&tile))
            .copied()
            .unwrap_or(DirectionMask::NONE)
    }

    /// All edge tiles of a grid.
    pub fn edges(&self, grid: GridId) -> Option<&HashMap<IVec2, DirectionMask>> {
        self.grids.get(&grid)
    }
}

fn space_facing(grid: &TileGrid, pos: IVec2) -> Option<DirectionMask> {
    if !grid.has_tile(pos) {
        return None;
    }
    let mut mask = DirectionMask::NONE;
    for dir in Direction::ALL {
        if !grid.has_tile(pos + dir.offset()) {
            mask.insert(dir);
        }
    }
    (!mask.is_empty()).then_some(mask)
}
