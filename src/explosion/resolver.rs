//! Coordinate transform resolver.
//!
//! Finds the grids an explosion can reach and the frame open space is
//! flooded in. Open space is tiled in the frame of the *reference grid*, the
//! heaviest structure near the epicenter, so that an explosion next to a
//! rotated station spreads through space aligned with that station.
//!
//! The resolver also builds the [`SpaceFootprint`]: which space tiles are
//! covered by grid tiles, and which grid edge tiles overlay them. The space
//! flood never enters covered tiles; it hands off to the overlaying grid edge
//! tiles instead.

use super::intensity_to_radius;
use crate::edges::GridEdgeIndex;
use crate::grid::{Aabb, GridId, GridMap, TileDefs, TileGrid, DEFAULT_TILE_SIZE};
use glam::{Affine2, IVec2, Vec2};
use std::collections::{HashMap, HashSet};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Grids relevant to one explosion and the open-space frame.
#[derive(Debug, Clone)]
pub struct LocalGrids {
    /// Grid whose frame orients open space, if any.
    pub reference: Option<GridId>,
    /// Grids whose bounds intersect the relevance box, in id order.
    pub grids: Vec<GridId>,
    /// Transform from space tile coordinates to world space.
    pub space_frame: Affine2,
    /// Grid tiles further than this from the epicenter are ignored when
    /// building the space footprint.
    pub max_distance: f32,
}

impl LocalGrids {
    /// Transform from a grid's tile space into the space tile frame.
    pub fn to_reference(&self, grid: &TileGrid) -> Affine2 {
        self.space_frame.inverse() * grid.tile_frame()
    }
}

/// Approximate explosion radius in tiles used to size the search boxes.
pub fn search_radius(total_intensity: f32, slope: f32, max_iterations: u32) -> f32 {
    (0.5 + intensity_to_radius(total_intensity, slope)).min(max_iterations as f32 / 4.0)
}

/// Find local grids and pick the reference grid.
///
/// The reference grid is the heaviest grid intersecting a box of half extent
/// `radius` around the epicenter; if none does, the heaviest grid in the
/// wide box (half extent `4 * radius`) is used. Massless grids never become
/// the reference.
pub fn local_grids(grids: &GridMap, defs: &TileDefs, epicenter: Vec2, radius: f32) -> LocalGrids {
    let tight = Aabb::centered(epicenter, radius);
    let wide = Aabb::centered(epicenter, 4.0 * radius);
    let local = grids.grids_intersecting(&wide);

    let heaviest = |area: &Aabb| {
        let mut best: Option<(GridId, f32)> = None;
        for grid in local.iter().filter_map(|id| grids.get(*id)) {
            if !grid.world_aabb().is_some_and(|b| b.intersects(area)) {
                continue;
            }
            let mass = grid.mass(defs);
            if mass > best.map(|(_, m)| m).unwrap_or(0.0) {
                best = Some((grid.id, mass));
            }
        }
        best.map(|(id, _)| id)
    };
    let reference = heaviest(&tight).or_else(|| heaviest(&wide));

    let space_frame = reference
        .and_then(|id| grids.get(id))
        .map(|g| g.tile_frame())
        .unwrap_or_else(|| Affine2::from_scale(Vec2::splat(DEFAULT_TILE_SIZE)));

    LocalGrids {
        reference,
        grids: local,
        space_frame,
        max_distance: 4.0 * radius,
    }
}

/// Space tiles covered by grids, with the grid edge tiles overlaying them.
#[derive(Debug, Clone, Default)]
pub struct SpaceFootprint {
    covered: HashSet<IVec2>,
    overlays: HashMap<IVec2, Vec<(GridId, IVec2)>>,
}

impl SpaceFootprint {
    pub fn build(grids: &GridMap, edges: &GridEdgeIndex, local: &LocalGrids, epicenter: Vec2) -> Self {
        let mut footprint = Self::default();
        for grid in local.grids.iter().filter_map(|id| grids.get(*id)) {
            let to_space = local.to_reference(grid);
            let mut tiles: Vec<IVec2> = grid
                .tiles()
                .map(|(pos, _)| pos)
                .filter(|pos| grid.tile_center_world(*pos).distance(epicenter) <= local.max_distance)
                .collect();
            tiles.sort_unstable_by_key(|t| (t.y, t.x));

            let project = |tile: &IVec2| {
                let space = to_space
                    .transform_point2(tile.as_vec2() + Vec2::splat(0.5))
                    .floor()
                    .as_ivec2();
                (space, *tile, edges.is_edge_tile(grid.id, *tile))
            };

            #[cfg(feature = "parallel")]
            let projected: Vec<(IVec2, IVec2, bool)> = tiles.par_iter().map(project).collect();

            #[cfg(not(feature = "parallel"))]
            let projected: Vec<(IVec2, IVec2, bool)> = tiles.iter().map(project).collect();

            for (space, tile, is_edge) in projected {
                footprint.covered.insert(space);
                if is_edge {
                    footprint.overlays.entry(space).or_default().push((grid.id, tile));
                }
            }
        }
        for list in footprint.overlays.values_mut() {
            list.sort_unstable_by_key(|(g, t)| (*g, t.y, t.x));
        }
        footprint
    }

    pub fn is_covered(&self, tile: IVec2) -> bool {
        self.covered.contains(&tile)
    }

    /// Grid edge tiles overlaying a space tile.
    pub fn overlays(&self, tile: IVec2) -> &[(GridId, IVec2)] {
        self.overlays.get(&tile).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn covered_count(&self) -> usize {
        self.covered.len()
    }
}
