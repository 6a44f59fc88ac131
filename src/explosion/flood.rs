//! Flood-fill tile generator.
//!
//! Turns an explosion request into intensity rings. Each iteration first tops
//! up the intensity of earlier rings (innermost first, capped at the maximum
//! intensity), then expands every region by one iteration. Whatever
//! intensity is left when a pass runs out is spread evenly over the ring
//! being processed, so the outermost ring usually ends up fractional.

use super::region::{FloodContext, HandOff, RegionExplosionState, RegionKind};
use super::resolver::{self, LocalGrids, SpaceFootprint};
use super::types::ExplosionTypeIndex;
use super::Epicenter;
use crate::edges::GridEdgeIndex;
use crate::grid::{GridId, GridMap, TileDefs};
use crate::obstruction::ObstructionIndex;
use glam::{Affine2, IVec2, Vec2};
use log::debug;
use std::collections::BTreeMap;
use std::f32::consts::PI;

/// Hard caps on a single flood fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloodLimits {
    pub max_iterations: u32,
    pub max_area: usize,
}

impl Default for FloodLimits {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_area: (PI * 50.0 * 50.0) as usize,
        }
    }
}

/// The world state a flood fill reads. Nothing here is mutated while tiles
/// are generated.
#[derive(Clone, Copy)]
pub struct TileWorld<'a> {
    pub grids: &'a GridMap,
    pub defs: &'a TileDefs,
    pub edges: &'a GridEdgeIndex,
    pub obstructions: &'a ObstructionIndex,
}

/// Output of the flood fill.
#[derive(Debug, Clone)]
pub struct ExplosionTiles {
    /// Intensity of each ring, indexed by iteration and shared by all regions.
    pub iteration_intensity: Vec<f32>,
    /// Finalized regions, grids in id order followed by space.
    pub regions: Vec<RegionExplosionState>,
    /// Transform from space tile coordinates to world space.
    pub space_frame: Affine2,
    pub reference: Option<GridId>,
    /// World position of the epicenter.
    pub epicenter: Vec2,
    pub total_tiles: usize,
}

impl ExplosionTiles {
    pub fn iterations(&self) -> usize {
        self.iteration_intensity.len()
    }

    /// Sum of `ring size * ring intensity` over every region.
    pub fn total_applied_intensity(&self) -> f32 {
        self.regions
            .iter()
            .flat_map(|r| r.tile_rings.iter())
            .map(|(i, ring)| ring.len() as f32 * self.iteration_intensity[*i as usize])
            .sum()
    }

    pub fn region(&self, kind: RegionKind) -> Option<&RegionExplosionState> {
        self.regions.iter().find(|r| r.kind == kind)
    }
}

/// Where the epicenter ended up after resolving it against the grids.
enum Seed {
    Grid(GridId, IVec2),
    Space(Vec2),
}

fn resolve_epicenter(grids: &GridMap, epicenter: Epicenter) -> Option<(Seed, Vec2)> {
    match epicenter {
        Epicenter::Tile { grid, tile } => {
            let g = grids.get(grid)?;
            let world = g.tile_center_world(tile);
            if g.has_tile(tile) {
                Some((Seed::Grid(grid, tile), world))
            } else {
                Some((Seed::Space(world), world))
            }
        }
        Epicenter::World(world) => match grids.grid_at(world) {
            Some((grid, tile)) => Some((Seed::Grid(grid, tile), world)),
            None => Some((Seed::Space(world), world)),
        },
    }
}

struct Regions {
    grids: BTreeMap<GridId, RegionExplosionState>,
    space: Option<RegionExplosionState>,
}

impl Regions {
    fn grid(&mut self, id: GridId, world: &TileWorld, local: &LocalGrids) -> Option<&mut RegionExplosionState> {
        if !self.grids.contains_key(&id) {
            let grid = world.grids.get(id)?;
            let region = RegionExplosionState::new(RegionKind::Grid(id), grid.tile_frame(), local.to_reference(grid));
            self.grids.insert(id, region);
        }
        self.grids.get_mut(&id)
    }

    fn space(&mut self, local: &LocalGrids) -> &mut RegionExplosionState {
        self.space.get_or_insert_with(|| {
            RegionExplosionState::new(RegionKind::Space, local.space_frame, Affine2::IDENTITY)
        })
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegionExplosionState> {
        self.grids.values_mut().chain(self.space.iter_mut())
    }

    fn has_pending(&self) -> bool {
        self.grids.values().chain(self.space.iter()).any(|r| r.has_pending())
    }

    fn into_vec(self) -> Vec<RegionExplosionState> {
        let mut out: Vec<_> = self.grids.into_values().collect();
        out.extend(self.space);
        out
    }
}

/// Generate the tile rings of one explosion.
///
/// Returns `None` for invalid parameters or an epicenter on an unknown grid.
#[allow(clippy::too_many_arguments)]
pub fn generate_tiles(
    world: &TileWorld,
    epicenter: Epicenter,
    explosion_type: ExplosionTypeIndex,
    total_intensity: f32,
    slope: f32,
    max_intensity: f32,
    limits: FloodLimits,
) -> Option<ExplosionTiles> {
    let valid = total_intensity.is_finite() && slope.is_finite();
    if !valid || total_intensity <= 0.0 || slope <= 0.0 || !(max_intensity > 0.0) {
        return None;
    }
    let (seed, epicenter_world) = resolve_epicenter(world.grids, epicenter)?;

    let radius = resolver::search_radius(total_intensity, slope, limits.max_iterations);
    let local = resolver::local_grids(world.grids, world.defs, epicenter_world, radius);
    let footprint = SpaceFootprint::build(world.grids, world.edges, &local, epicenter_world);

    let step = slope / 2.0;
    let ctx = FloodContext {
        grids: world.grids,
        edges: world.edges,
        obstructions: world.obstructions,
        footprint: &footprint,
        space_inverse: local.space_frame.inverse(),
        explosion_type,
        step,
        max_intensity,
    };

    let mut regions = Regions {
        grids: BTreeMap::new(),
        space: None,
    };
    match seed {
        Seed::Grid(id, tile) => regions.grid(id, world, &local)?.seed(tile, &ctx),
        Seed::Space(pos) => {
            let tile = ctx.space_inverse.transform_point2(pos).floor().as_ivec2();
            regions.space(&local).seed(tile, &ctx);
        }
    }

    let finish = |mut regions: Regions, intensities: Vec<f32>, total_tiles: usize| {
        for region in regions.iter_mut() {
            region.cleanup();
        }
        ExplosionTiles {
            iteration_intensity: intensities,
            regions: regions.into_vec(),
            space_frame: local.space_frame,
            reference: local.reference,
            epicenter: epicenter_world,
            total_tiles,
        }
    };

    if total_intensity < step {
        return Some(finish(regions, vec![total_intensity.min(max_intensity)], 1));
    }

    let ring_intensity = step.min(max_intensity);
    let mut intensities = vec![ring_intensity];
    let mut ring_tiles: Vec<u32> = vec![1];
    let mut remaining = total_intensity - ring_intensity;
    let mut total_tiles = 1usize;
    let mut saturated = 0usize;
    let mut iteration = 1u32;
    let mut previous_remaining = remaining;
    let mut unchanged = 0u32;
    let mut handoffs = Vec::new();

    while remaining > 0.0 && iteration <= limits.max_iterations && total_tiles < limits.max_area {
        // Top up inner rings before adding a new one.
        let mut exhausted = false;
        for j in saturated..intensities.len() {
            let tiles = ring_tiles[j] as f32;
            let increase = step.min(max_intensity - intensities[j]);
            if increase <= 0.0 {
                continue;
            }
            if tiles * increase >= remaining {
                intensities[j] += remaining / tiles;
                remaining = 0.0;
                exhausted = true;
                break;
            }
            intensities[j] += increase;
            remaining -= tiles * increase;
        }
        while saturated < intensities.len() && intensities[saturated] >= max_intensity {
            saturated += 1;
        }
        if exhausted {
            break;
        }

        let mut new_tiles = 0u32;
        for region in regions.iter_mut() {
            new_tiles += region.expand(iteration, &ctx, &mut handoffs);
        }
        for handoff in handoffs.drain(..) {
            match handoff {
                HandOff::ToSpace(tile) => regions.space(&local).receive(iteration + 1, tile),
                HandOff::ToGrid(id, tile) => {
                    if let Some(region) = regions.grid(id, world, &local) {
                        region.receive(iteration + 1, tile);
                    }
                }
            }
        }
        total_tiles += new_tiles as usize;

        let cost = new_tiles as f32 * ring_intensity;
        if new_tiles > 0 && cost >= remaining {
            intensities.push(remaining / new_tiles as f32);
            ring_tiles.push(new_tiles);
            break;
        }
        intensities.push(ring_intensity);
        ring_tiles.push(new_tiles);
        remaining -= cost;

        if remaining == previous_remaining && !regions.has_pending() {
            unchanged += 1;
            if unchanged >= 2 {
                debug!("explosion contained after {iteration} iterations, {remaining:.2} intensity left");
                break;
            }
        } else {
            unchanged = 0;
        }
        previous_remaining = remaining;
        iteration += 1;
    }

    let tiles = finish(regions, intensities, total_tiles);
    debug!(
        "generated {} tiles over {} iterations in {} regions",
        tiles.total_tiles,
        tiles.iterations(),
        tiles.regions.len()
    );
    Some(tiles)
}
