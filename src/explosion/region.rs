//! Per-region flood fill state.
//!
//! A region is either one grid or open space. Both use the same state and
//! spreading rules; they differ only in how a neighbor tile is looked up and
//! in where the explosion crosses into another region:
//!
//! - a grid hands off to space through the sides of its edge tiles that face
//!   space,
//! - space hands off to a grid when it reaches a space tile covered by that
//!   grid's footprint.
//!
//! Hand-offs arrive in the target region one iteration later.
//!
//! Tiles spread to cardinal neighbors two iterations after being entered and
//! to diagonal neighbors three iterations after. A tile with an obstruction
//! that seals every side it was approached from is still reached (and
//! damaged) but only starts spreading once the explosion has had enough
//! iterations to break the obstruction.

use super::resolver::SpaceFootprint;
use super::types::ExplosionTypeIndex;
use crate::direction::{Direction, DirectionMask, DIAGONALS};
use crate::edges::GridEdgeIndex;
use crate::grid::{GridId, GridMap};
use crate::obstruction::{ObstructionIndex, TileObstruction};
use glam::{Affine2, IVec2, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    Grid(GridId),
    Space,
}

/// A tile crossing into another region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandOff {
    ToSpace(IVec2),
    ToGrid(GridId, IVec2),
}

/// Read-only inputs shared by every region of one flood fill.
pub(crate) struct FloodContext<'a> {
    pub grids: &'a GridMap,
    pub edges: &'a GridEdgeIndex,
    pub obstructions: &'a ObstructionIndex,
    pub footprint: &'a SpaceFootprint,
    /// World to space tile frame.
    pub space_inverse: Affine2,
    pub explosion_type: ExplosionTypeIndex,
    pub step: f32,
    pub max_intensity: f32,
}

#[derive(Debug, Clone)]
pub struct RegionExplosionState {
    pub kind: RegionKind,
    /// Transform from region tile space to world space.
    pub frame: Affine2,
    /// Transform from region tile space into the space tile frame.
    pub to_reference: Affine2,
    /// Tiles first reached at each iteration.
    pub tile_rings: BTreeMap<u32, Vec<IVec2>>,
    blocked_rings: BTreeMap<u32, Vec<IVec2>>,
    processed: HashSet<IVec2>,
    entered: HashSet<IVec2>,
    spread_cardinal: BTreeMap<u32, Vec<IVec2>>,
    spread_diagonal: BTreeMap<u32, Vec<IVec2>>,
    delayed_spreaders: BTreeMap<u32, Vec<IVec2>>,
    delayed_neighbors: BTreeMap<u32, Vec<(IVec2, Direction)>>,
    incoming: BTreeMap<u32, Vec<IVec2>>,
    /// Iteration at which an obstructed tile's obstruction breaks. `None`
    /// means this explosion can never break it.
    clear_at: HashMap<IVec2, Option<u32>>,
}

impl RegionExplosionState {
    pub fn new(kind: RegionKind, frame: Affine2, to_reference: Affine2) -> Self {
        Self {
            kind,
            frame,
            to_reference,
            tile_rings: BTreeMap::new(),
            blocked_rings: BTreeMap::new(),
            processed: HashSet::new(),
            entered: HashSet::new(),
            spread_cardinal: BTreeMap::new(),
            spread_diagonal: BTreeMap::new(),
            delayed_spreaders: BTreeMap::new(),
            delayed_neighbors: BTreeMap::new(),
            incoming: BTreeMap::new(),
            clear_at: HashMap::new(),
        }
    }

    /// World-space center of a tile of this region.
    pub fn tile_center_world(&self, tile: IVec2) -> Vec2 {
        self.frame.transform_point2(tile.as_vec2() + Vec2::splat(0.5))
    }

    /// Number of tiles across all rings.
    pub fn tile_count(&self) -> usize {
        self.tile_rings.values().map(Vec::len).sum()
    }

    /// Iteration at which a tile was first reached, after cleanup.
    pub fn ring_of(&self, tile: IVec2) -> Option<u32> {
        self.tile_rings
            .iter()
            .find(|(_, ring)| ring.contains(&tile))
            .map(|(i, _)| *i)
    }

    /// Place the epicenter at iteration 0. It always spreads, even if it is
    /// obstructed, except through sides its obstruction seals.
    pub(crate) fn seed(&mut self, tile: IVec2, ctx: &FloodContext) {
        self.processed.insert(tile);
        if let Some(obstruction) = self.obstruction(ctx, tile) {
            let clear = clear_iteration(obstruction, 0, ctx);
            self.clear_at.insert(tile, clear);
        }
        self.tile_rings.entry(0).or_default().push(tile);
        self.enter(tile, 0);
    }

    /// Queue a tile handed off from another region.
    pub(crate) fn receive(&mut self, iteration: u32, tile: IVec2) {
        self.incoming.entry(iteration).or_default().push(tile);
    }

    /// True while any work is scheduled for a later iteration.
    pub(crate) fn has_pending(&self) -> bool {
        !(self.spread_cardinal.is_empty()
            && self.spread_diagonal.is_empty()
            && self.delayed_spreaders.is_empty()
            && self.delayed_neighbors.is_empty()
            && self.incoming.is_empty())
    }

    /// Run one iteration. Returns the number of newly reached tiles,
    /// including obstructed ones, and pushes hand-offs for `iteration + 1`.
    pub(crate) fn expand(&mut self, iteration: u32, ctx: &FloodContext, out: &mut Vec<HandOff>) -> u32 {
        let mut count = 0;

        if let Some(unlocked) = self.delayed_spreaders.remove(&iteration) {
            for tile in unlocked {
                if self.entered.insert(tile) {
                    self.spread_cardinal.entry(iteration).or_default().push(tile);
                    self.spread_diagonal.entry(iteration + 1).or_default().push(tile);
                }
            }
        }

        if let Some(sources) = self.spread_cardinal.remove(&iteration) {
            for src in sources {
                for dir in Direction::ALL {
                    count += self.spread_to(src, dir, iteration, ctx, out);
                }
            }
        }

        if let Some(sources) = self.spread_diagonal.remove(&iteration) {
            for src in sources {
                for (a, b) in DIAGONALS {
                    count += self.spread_diagonal_to(src, a, b, iteration, ctx, out);
                }
            }
        }

        if let Some(neighbors) = self.delayed_neighbors.remove(&iteration) {
            for (src, dir) in neighbors {
                count += self.spread_to(src, dir, iteration, ctx, out);
            }
        }

        if let Some(arrivals) = self.incoming.remove(&iteration) {
            for tile in arrivals {
                count += self.arrive(tile, iteration, ctx, out);
            }
        }

        count
    }

    /// Fold delayed tiles into the ring they were discovered in and strip
    /// duplicates so every tile belongs to exactly one ring.
    pub(crate) fn cleanup(&mut self) {
        for (iteration, tiles) in std::mem::take(&mut self.blocked_rings) {
            self.tile_rings.entry(iteration).or_default().extend(tiles);
        }
        let mut seen = HashSet::with_capacity(self.processed.len());
        for ring in self.tile_rings.values_mut() {
            ring.retain(|t| seen.insert(*t));
        }
        self.tile_rings.retain(|_, ring| !ring.is_empty());

        self.spread_cardinal.clear();
        self.spread_diagonal.clear();
        self.delayed_spreaders.clear();
        self.delayed_neighbors.clear();
        self.incoming.clear();
        self.clear_at.clear();
        self.entered.clear();
    }

    fn enter(&mut self, tile: IVec2, iteration: u32) {
        self.entered.insert(tile);
        self.spread_cardinal.entry(iteration + 2).or_default().push(tile);
        self.spread_diagonal.entry(iteration + 3).or_default().push(tile);
    }

    fn obstruction<'a>(&self, ctx: &FloodContext<'a>, tile: IVec2) -> Option<&'a TileObstruction> {
        match self.kind {
            RegionKind::Grid(grid) => ctx.obstructions.get(grid, tile),
            RegionKind::Space => None,
        }
    }

    /// True if the region has a floor tile here (grid) or the tile is open
    /// space not covered by a grid (space).
    fn exists(&self, ctx: &FloodContext, tile: IVec2) -> bool {
        match self.kind {
            RegionKind::Grid(grid) => ctx.grids.get(grid).is_some_and(|g| g.has_tile(tile)),
            RegionKind::Space => !ctx.footprint.is_covered(tile),
        }
    }

    /// True if the explosion can pass through `side` of `tile` at `iteration`.
    fn side_open(&self, ctx: &FloodContext, tile: IVec2, side: Direction, iteration: u32) -> bool {
        match self.obstruction(ctx, tile) {
            Some(o) if o.blocked.contains(side) => {
                matches!(self.clear_at.get(&tile), Some(Some(c)) if *c <= iteration)
            }
            _ => true,
        }
    }

    fn spread_to(
        &mut self,
        src: IVec2,
        dir: Direction,
        iteration: u32,
        ctx: &FloodContext,
        out: &mut Vec<HandOff>,
    ) -> u32 {
        if self.obstruction(ctx, src).is_some_and(|o| o.blocked.contains(dir)) {
            match self.clear_at.get(&src).copied() {
                Some(Some(clear)) if clear > iteration => {
                    self.delayed_neighbors.entry(clear).or_default().push((src, dir));
                    return 0;
                }
                Some(None) => return 0,
                _ => {}
            }
        }

        let neighbor = src + dir.offset();
        match self.kind {
            RegionKind::Grid(grid) => {
                if ctx.edges.space_directions(grid, src).contains(dir) {
                    let world = self.tile_center_world(neighbor);
                    let space = ctx.space_inverse.transform_point2(world).floor().as_ivec2();
                    out.push(HandOff::ToSpace(space));
                    return 0;
                }
                if !self.exists(ctx, neighbor) {
                    return 0;
                }
            }
            RegionKind::Space => {
                if ctx.footprint.is_covered(neighbor) {
                    self.jump_to_grids(neighbor, ctx, out);
                    return 0;
                }
            }
        }
        self.process_candidate(neighbor, dir.opposite().mask(), iteration, ctx)
    }

    fn spread_diagonal_to(
        &mut self,
        src: IVec2,
        a: Direction,
        b: Direction,
        iteration: u32,
        ctx: &FloodContext,
        out: &mut Vec<HandOff>,
    ) -> u32 {
        let target = src + a.offset() + b.offset();
        if self.processed.contains(&target) && self.entered.contains(&target) {
            return 0;
        }

        let mut entry = DirectionMask::NONE;
        for (first, second) in [(a, b), (b, a)] {
            if !self.side_open(ctx, src, first, iteration) {
                continue;
            }
            let mid = src + first.offset();
            if !self.exists(ctx, mid)
                || !self.side_open(ctx, mid, first.opposite(), iteration)
                || !self.side_open(ctx, mid, second, iteration)
            {
                continue;
            }
            entry.insert(second.opposite());
        }
        if entry.is_empty() {
            return 0;
        }

        if !self.exists(ctx, target) {
            // Space reaches covered tiles diagonally too; grids leave only
            // through cardinal edge sides.
            if self.kind == RegionKind::Space {
                self.jump_to_grids(target, ctx, out);
            }
            return 0;
        }
        self.process_candidate(target, entry, iteration, ctx)
    }

    fn jump_to_grids(&mut self, space_tile: IVec2, ctx: &FloodContext, out: &mut Vec<HandOff>) {
        if !self.processed.insert(space_tile) {
            return;
        }
        for (grid, tile) in ctx.footprint.overlays(space_tile) {
            out.push(HandOff::ToGrid(*grid, *tile));
        }
    }

    /// Handle a tile handed off from another region.
    fn arrive(&mut self, tile: IVec2, iteration: u32, ctx: &FloodContext, out: &mut Vec<HandOff>) -> u32 {
        match self.kind {
            RegionKind::Grid(grid) => {
                if !self.exists(ctx, tile) {
                    return 0;
                }
                let mut entry = ctx.edges.space_directions(grid, tile);
                if entry.is_empty() {
                    entry = DirectionMask::ALL;
                }
                self.process_candidate(tile, entry, iteration, ctx)
            }
            RegionKind::Space => {
                if ctx.footprint.is_covered(tile) {
                    self.jump_to_grids(tile, ctx, out);
                    return 0;
                }
                self.process_candidate(tile, DirectionMask::ALL, iteration, ctx)
            }
        }
    }

    /// Reach `tile` from the sides in `entry`. Returns 1 if the tile is new.
    fn process_candidate(&mut self, tile: IVec2, entry: DirectionMask, iteration: u32, ctx: &FloodContext) -> u32 {
        if self.processed.contains(&tile) {
            // A sealed tile reached again through a side it leaves open.
            if !self.entered.contains(&tile)
                && self
                    .obstruction(ctx, tile)
                    .is_some_and(|o| !o.blocked.blocks_all_of(entry))
            {
                self.enter(tile, iteration);
            }
            return 0;
        }
        self.processed.insert(tile);

        let Some(obstruction) = self.obstruction(ctx, tile) else {
            self.tile_rings.entry(iteration).or_default().push(tile);
            self.enter(tile, iteration);
            return 1;
        };

        let clear = clear_iteration(obstruction, iteration, ctx);
        self.clear_at.insert(tile, clear);

        if !obstruction.blocked.blocks_all_of(entry) {
            self.tile_rings.entry(iteration).or_default().push(tile);
            self.enter(tile, iteration);
            return 1;
        }

        self.blocked_rings.entry(iteration).or_default().push(tile);
        if let Some(clear) = clear {
            let unlock = clear.max(iteration + 2);
            self.delayed_spreaders.entry(unlock).or_default().push(tile);
        }
        1
    }
}

/// Iteration at which the explosion has piled enough intensity on a tile to
/// break its obstruction, or `None` if its tolerance exceeds the cap.
fn clear_iteration(obstruction: &TileObstruction, discovered: u32, ctx: &FloodContext) -> Option<u32> {
    let tolerance = obstruction.tolerance(ctx.explosion_type);
    if !tolerance.is_finite() || tolerance > ctx.max_intensity {
        return None;
    }
    let delay = (tolerance.max(0.0) / ctx.step).ceil();
    Some(discovered.saturating_add(delay as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Obstruction;
    use crate::grid::{TileDefs, TileGrid};
    use bevy_ecs::entity::Entity;

    struct Fixture {
        grids: GridMap,
        edges: GridEdgeIndex,
        obstructions: ObstructionIndex,
        footprint: SpaceFootprint,
    }

    impl Fixture {
        fn new() -> Self {
            let floor = TileDefs::standard().find("steel_floor").unwrap();
            let grid = TileGrid::new(GridId(1), Vec2::ZERO).with_rect(IVec2::splat(-5), IVec2::splat(5), floor);
            let mut edges = GridEdgeIndex::new();
            edges.rebuild_grid(&grid);
            let mut grids = GridMap::new();
            grids.insert(grid);
            Self {
                grids,
                edges,
                obstructions: ObstructionIndex::new(),
                footprint: SpaceFootprint::default(),
            }
        }

        fn ctx(&self) -> FloodContext<'_> {
            FloodContext {
                grids: &self.grids,
                edges: &self.edges,
                obstructions: &self.obstructions,
                footprint: &self.footprint,
                space_inverse: Affine2::IDENTITY,
                explosion_type: ExplosionTypeIndex(0),
                step: 1.0,
                max_intensity: 10.0,
            }
        }
    }

    fn run(region: &mut RegionExplosionState, ctx: &FloodContext, iterations: u32) -> Vec<HandOff> {
        let mut out = Vec::new();
        for i in 1..=iterations {
            region.expand(i, ctx, &mut out);
        }
        out
    }

    fn grid_region() -> RegionExplosionState {
        RegionExplosionState::new(RegionKind::Grid(GridId(1)), Affine2::IDENTITY, Affine2::IDENTITY)
    }

    #[test]
    fn test_cardinal_then_diagonal_timing() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();
        let mut region = grid_region();
        region.seed(IVec2::ZERO, &ctx);
        run(&mut region, &ctx, 3);
        region.cleanup();

        assert_eq!(region.ring_of(IVec2::ZERO), Some(0));
        assert_eq!(region.ring_of(IVec2::new(1, 0)), Some(2));
        assert_eq!(region.ring_of(IVec2::new(0, -1)), Some(2));
        assert_eq!(region.ring_of(IVec2::new(1, 1)), Some(3));
        assert_eq!(region.tile_count(), 9);
    }

    #[test]
    fn test_indestructible_wall_is_reached_but_never_spreads() {
        let mut fixture = Fixture::new();
        let data = TileObstruction::new(Obstruction::wall().blocked, vec![f32::INFINITY]);
        fixture.obstructions.insert(Entity::from_raw(1), GridId(1), IVec2::new(1, 0), data);
        let ctx = fixture.ctx();

        let mut region = grid_region();
        region.seed(IVec2::ZERO, &ctx);
        run(&mut region, &ctx, 12);
        region.cleanup();

        assert_eq!(region.ring_of(IVec2::new(1, 0)), Some(2));
        let behind = region.ring_of(IVec2::new(2, 0)).unwrap();
        assert!(behind >= 5, "reached behind the wall at {behind}");
    }

    #[test]
    fn test_breakable_wall_delays_spread() {
        let mut fixture = Fixture::new();
        // Breaks after four steps of intensity.
        let data = TileObstruction::new(DirectionMask::ALL, vec![4.0]);
        fixture.obstructions.insert(Entity::from_raw(1), GridId(1), IVec2::new(1, 0), data);
        let ctx = fixture.ctx();

        let mut region = grid_region();
        region.seed(IVec2::ZERO, &ctx);
        // Discovered at 2, clears at 6.
        let mut out = Vec::new();
        for i in 1..=5 {
            region.expand(i, &ctx, &mut out);
        }
        assert!(region.processed.contains(&IVec2::new(1, 0)));
        assert!(!region.entered.contains(&IVec2::new(1, 0)));

        region.expand(6, &ctx, &mut out);
        assert!(region.entered.contains(&IVec2::new(1, 0)));
        assert!(region.processed.contains(&IVec2::new(2, 0)));
    }

    #[test]
    fn test_edge_tiles_hand_off_to_space() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();
        let mut region = grid_region();
        region.seed(IVec2::new(5, 0), &ctx);
        let out = run(&mut region, &ctx, 2);
        assert!(out.contains(&HandOff::ToSpace(IVec2::new(6, 0))));
    }
}
