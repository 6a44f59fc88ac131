//! Spatial partitioning for entity lookups.
//!
//! Explosions ask "who stands on this tile" once per processed tile, so the
//! lookup must cost O(k) in the number of nearby entities, not O(n).

use crate::components::{Health, Position};
use bevy_ecs::prelude::*;
use std::collections::HashMap;

/// Grid-based spatial partitioning structure.
///
/// Divides the world into square cells and tracks which entities are in each
/// cell. Rebuilt every tick by [`spatial_grid_update_system`].
#[derive(Resource, Debug)]
pub struct SpatialGrid {
    /// Cell size in world units.
    pub cell_size: f32,
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    entity_cells: HashMap<Entity, (i32, i32)>,
}

/// Entry in a spatial cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub x: f32,
    pub y: f32,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            entity_cells: HashMap::new(),
        }
    }

    #[inline]
    pub fn world_to_cell(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entity_cells.clear();
    }

    /// Insert or move an entity.
    pub fn insert(&mut self, entity: Entity, x: f32, y: f32) {
        let cell = self.world_to_cell(x, y);
        if let Some(&old_cell) = self.entity_cells.get(&entity) {
            if let Some(entries) = self.cells.get_mut(&old_cell) {
                entries.retain(|e| e.entity != entity);
            }
        }
        self.cells.entry(cell).or_default().push(SpatialEntry { entity, x, y });
        self.entity_cells.insert(entity, cell);
    }

    pub fn remove(&mut self, entity: Entity) {
        if let Some(cell) = self.entity_cells.remove(&entity) {
            if let Some(entries) = self.cells.get_mut(&cell) {
                entries.retain(|e| e.entity != entity);
            }
        }
    }

    /// All entities within `radius` of a point, closest first. Ties are
    /// broken by entity id so results do not depend on hash order.
    pub fn query_radius(&self, x: f32, y: f32, radius: f32) -> Vec<SpatialEntry> {
        let radius_sq = radius * radius;
        let cells_to_check = (radius / self.cell_size).ceil() as i32 + 1;
        let center_cell = self.world_to_cell(x, y);

        let mut results = Vec::new();
        for dx in -cells_to_check..=cells_to_check {
            for dy in -cells_to_check..=cells_to_check {
                let cell = (center_cell.0 + dx, center_cell.1 + dy);
                if let Some(entries) = self.cells.get(&cell) {
                    for entry in entries {
                        let dist_sq = (entry.x - x).powi(2) + (entry.y - y).powi(2);
                        if dist_sq <= radius_sq {
                            results.push(*entry);
                        }
                    }
                }
            }
        }

        results.sort_by(|a, b| {
            let dist_a = (a.x - x).powi(2) + (a.y - y).powi(2);
            let dist_b = (b.x - x).powi(2) + (b.y - y).powi(2);
            dist_a
                .partial_cmp(&dist_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.entity.cmp(&b.entity))
        });
        results
    }

    pub fn cell_count(&self, cell: (i32, i32)) -> usize {
        self.cells.get(&cell).map(|v| v.len()).unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.entity_cells.len()
    }
}

/// Rebuilds the spatial grid from every living entity with a position.
pub fn spatial_grid_update_system(
    mut grid: ResMut<SpatialGrid>,
    query: Query<(Entity, &Position, &Health)>,
) {
    grid.clear();
    for (entity, pos, health) in query.iter() {
        if !health.is_alive() {
            continue;
        }
        grid.insert(entity, pos.x, pos.y);
    }
}
