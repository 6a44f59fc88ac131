//! Tile grids - rigid, tile-based structures floating in open space.
//!
//! A grid stores a sparse map of tile coordinates to tile definitions. Missing
//! entries are open space. Each grid has its own world transform (position,
//! rotation, tile size), so neighboring grids are generally not aligned.

use crate::error::ConfigError;
use bevy_ecs::prelude::*;
use glam::{Affine2, IVec2, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default edge length of a tile in world units.
pub const DEFAULT_TILE_SIZE: f32 = 1.0;

/// Identifier of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridId(pub u32);

/// Index into [`TileDefs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileId(pub u16);

/// Floor material definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileDef {
    pub name: String,
    /// Material this tile degrades into when broken. `None` breaks to space.
    pub base: Option<TileId>,
    /// Indestructible tiles never break.
    #[serde(default)]
    pub indestructible: bool,
    /// Physical mass contributed to the owning grid.
    #[serde(default = "default_tile_mass")]
    pub mass: f32,
}

fn default_tile_mass() -> f32 {
    1.0
}

/// Registry of floor materials.
#[derive(Resource, Debug, Clone, Default)]
pub struct TileDefs {
    defs: Vec<TileDef>,
}

impl TileDefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small default palette: reinforced floor → plating → lattice → space.
    pub fn standard() -> Self {
        let mut defs = Self::new();
        let lattice = defs.register(TileDef {
            name: "lattice".to_string(),
            base: None,
            indestructible: false,
            mass: 0.2,
        });
        let plating = defs.register(TileDef {
            name: "plating".to_string(),
            base: Some(lattice),
            indestructible: false,
            mass: 1.0,
        });
        defs.register(TileDef {
            name: "steel_floor".to_string(),
            base: Some(plating),
            indestructible: false,
            mass: 1.0,
        });
        defs.register(TileDef {
            name: "reinforced_floor".to_string(),
            base: Some(plating),
            indestructible: true,
            mass: 2.0,
        });
        defs
    }

    /// Load a JSON array of tile definitions. Ids follow array order.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let list: Vec<TileDef> = serde_json::from_str(json)?;
        for def in &list {
            if let Some(base) = def.base {
                if base.0 as usize >= list.len() {
                    return Err(ConfigError::UnknownBaseTile {
                        tile: def.name.clone(),
                        base: base.0,
                    });
                }
            }
        }
        Ok(Self { defs: list })
    }

    /// Register a tile definition and return its id.
    pub fn register(&mut self, def: TileDef) -> TileId {
        self.defs.push(def);
        TileId((self.defs.len() - 1) as u16)
    }

    pub fn get(&self, id: TileId) -> Option<&TileDef> {
        self.defs.get(id.0 as usize)
    }

    /// Look up a tile id by name.
    pub fn find(&self, name: &str) -> Option<TileId> {
        self.defs
            .iter()
            .position(|d| d.name == name)
            .map(|i| TileId(i as u16))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Square box centered on `center` with the given half side length.
    pub fn centered(center: Vec2, half_extent: f32) -> Self {
        Self {
            min: center - Vec2::splat(half_extent),
            max: center + Vec2::splat(half_extent),
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Smallest box containing all the given points.
    pub fn from_points(points: impl IntoIterator<Item = Vec2>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }
}

/// A single tile grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileGrid {
    pub id: GridId,
    /// World position of the grid's local origin.
    pub position: Vec2,
    /// Rotation of the grid in radians.
    pub rotation: f32,
    /// Edge length of each tile in world units.
    pub tile_size: f32,
    tiles: HashMap<IVec2, TileId>,
}

impl TileGrid {
    /// Create an empty, axis-aligned grid.
    pub fn new(id: GridId, position: Vec2) -> Self {
        Self {
            id,
            position,
            rotation: 0.0,
            tile_size: DEFAULT_TILE_SIZE,
            tiles: HashMap::new(),
        }
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    /// Fill a rectangle (inclusive corners) with one tile type.
    pub fn with_rect(mut self, min: IVec2, max: IVec2, tile: TileId) -> Self {
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                self.tiles.insert(IVec2::new(x, y), tile);
            }
        }
        self
    }

    pub fn tile(&self, pos: IVec2) -> Option<TileId> {
        self.tiles.get(&pos).copied()
    }

    pub fn has_tile(&self, pos: IVec2) -> bool {
        self.tiles.contains_key(&pos)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Iterate all occupied tiles (unordered).
    pub fn tiles(&self) -> impl Iterator<Item = (IVec2, TileId)> + '_ {
        self.tiles.iter().map(|(p, t)| (*p, *t))
    }

    /// Apply a batch of tile mutations. `None` removes the tile.
    ///
    /// Returns the coordinates whose contents actually changed.
    pub fn set_tiles(&mut self, batch: &[(IVec2, Option<TileId>)]) -> Vec<IVec2> {
        let mut changed = Vec::with_capacity(batch.len());
        for &(pos, tile) in batch {
            let previous = match tile {
                Some(t) => self.tiles.insert(pos, t),
                None => self.tiles.remove(&pos),
            };
            if previous != tile {
                changed.push(pos);
            }
        }
        changed
    }

    /// Transform from tile space (tile `(x, y)` spans `[x, x+1) × [y, y+1)`)
    /// to world space.
    pub fn tile_frame(&self) -> Affine2 {
        Affine2::from_scale_angle_translation(
            Vec2::splat(self.tile_size),
            self.rotation,
            self.position,
        )
    }

    /// Map a point in tile space to world space.
    pub fn local_to_world(&self, local: Vec2) -> Vec2 {
        self.tile_frame().transform_point2(local)
    }

    /// World-space center of a tile.
    pub fn tile_center_world(&self, pos: IVec2) -> Vec2 {
        self.local_to_world(pos.as_vec2() + Vec2::splat(0.5))
    }

    /// Tile coordinate containing a world position (may be empty).
    pub fn world_to_tile(&self, world: Vec2) -> IVec2 {
        self.tile_frame()
            .inverse()
            .transform_point2(world)
            .floor()
            .as_ivec2()
    }

    /// Inclusive bounds of the occupied tiles in tile space.
    pub fn local_bounds(&self) -> Option<(IVec2, IVec2)> {
        let mut iter = self.tiles.keys();
        let first = *iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))))
    }

    /// World-space bounding box of all occupied tiles.
    pub fn world_aabb(&self) -> Option<Aabb> {
        let (min, max) = self.local_bounds()?;
        let frame = self.tile_frame();
        let lo = min.as_vec2();
        let hi = (max + IVec2::ONE).as_vec2();
        Aabb::from_points(
            [
                Vec2::new(lo.x, lo.y),
                Vec2::new(hi.x, lo.y),
                Vec2::new(lo.x, hi.y),
                Vec2::new(hi.x, hi.y),
            ]
            .map(|c| frame.transform_point2(c)),
        )
    }

    /// Physical mass of the grid (sum of tile masses).
    pub fn mass(&self, defs: &TileDefs) -> f32 {
        self.tiles
            .values()
            .map(|t| defs.get(*t).map(|d| d.mass).unwrap_or(1.0))
            .sum()
    }
}

/// Resource holding every grid in the world.
#[derive(Resource, Debug, Clone, Default)]
pub struct GridMap {
    grids: BTreeMap<GridId, TileGrid>,
}

impl GridMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, grid: TileGrid) {
        self.grids.insert(grid.id, grid);
    }

    pub fn remove(&mut self, id: GridId) -> Option<TileGrid> {
        self.grids.remove(&id)
    }

    pub fn get(&self, id: GridId) -> Option<&TileGrid> {
        self.grids.get(&id)
    }

    pub fn get_mut(&mut self, id: GridId) -> Option<&mut TileGrid> {
        self.grids.get_mut(&id)
    }

    /// Iterate grids in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TileGrid> {
        self.grids.values()
    }

    /// Grids whose world bounds intersect the box, in id order.
    pub fn grids_intersecting(&self, aabb: &Aabb) -> Vec<GridId> {
        self.grids
            .values()
            .filter(|g| g.world_aabb().is_some_and(|b| b.intersects(aabb)))
            .map(|g| g.id)
            .collect()
    }

    /// First grid (in id order) with an occupied tile under the world position.
    pub fn grid_at(&self, world: Vec2) -> Option<(GridId, IVec2)> {
        self.grids.values().find_map(|g| {
            let tile = g.world_to_tile(world);
            g.has_tile(tile).then_some((g.id, tile))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_world_to_tile_axis_aligned() {
        let grid = TileGrid::new(GridId(1), Vec2::new(10.0, 0.0));
        assert_eq!(grid.world_to_tile(Vec2::new(10.5, 0.5)), IVec2::new(0, 0));
        assert_eq!(grid.world_to_tile(Vec2::new(9.5, -0.5)), IVec2::new(-1, -1));
        let center = grid.tile_center_world(IVec2::new(2, 3));
        assert!((center - Vec2::new(12.5, 3.5)).length() < 1e-5);
    }

    #[test]
    fn test_world_to_tile_rotated() {
        // Rotated a quarter turn: local +x points along world +y.
        let grid = TileGrid::new(GridId(1), Vec2::ZERO).with_rotation(FRAC_PI_2);
        let center = grid.tile_center_world(IVec2::new(2, 0));
        assert!((center - Vec2::new(-0.5, 2.5)).length() < 1e-4);
        assert_eq!(grid.world_to_tile(center), IVec2::new(2, 0));
    }

    #[test]
    fn test_set_tiles_reports_changes() {
        let defs = TileDefs::standard();
        let floor = defs.find("steel_floor").unwrap();
        let plating = defs.find("plating").unwrap();
        let mut grid = TileGrid::new(GridId(1), Vec2::ZERO).with_rect(IVec2::ZERO, IVec2::ONE, floor);

        let changed = grid.set_tiles(&[
            (IVec2::new(0, 0), Some(plating)),
            (IVec2::new(1, 1), Some(floor)),
            (IVec2::new(1, 0), None),
        ]);
        assert_eq!(changed, vec![IVec2::new(0, 0), IVec2::new(1, 0)]);
        assert_eq!(grid.tile_count(), 3);
    }

    #[test]
    fn test_tile_defs_from_json() {
        let json = r#"[
            {"name": "lattice", "base": null, "mass": 0.2},
            {"name": "plating", "base": 0}
        ]"#;
        let defs = TileDefs::from_json(json).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs.get(TileId(1)).unwrap().base, Some(TileId(0)));
        assert_eq!(defs.get(TileId(1)).unwrap().mass, 1.0);

        let broken = r#"[{"name": "plating", "base": 4}]"#;
        assert!(matches!(
            TileDefs::from_json(broken),
            Err(ConfigError::UnknownBaseTile { base: 4, .. })
        ));
    }

    #[test]
    fn test_grid_at_and_intersection() {
        let defs = TileDefs::standard();
        let floor = defs.find("steel_floor").unwrap();
        let mut map = GridMap::new();
        map.insert(TileGrid::new(GridId(1), Vec2::ZERO).with_rect(IVec2::ZERO, IVec2::new(4, 4), floor));
        map.insert(TileGrid::new(GridId(2), Vec2::new(50.0, 0.0)).with_rect(IVec2::ZERO, IVec2::ONE, floor));

        assert_eq!(map.grid_at(Vec2::new(2.5, 2.5)), Some((GridId(1), IVec2::new(2, 2))));
        assert_eq!(map.grid_at(Vec2::new(20.0, 20.0)), None);

        let hits = map.grids_intersecting(&Aabb::centered(Vec2::ZERO, 10.0));
        assert_eq!(hits, vec![GridId(1)]);
        assert!((map.get(GridId(1)).unwrap().mass(&defs) - 25.0).abs() < 1e-5);
    }
}
