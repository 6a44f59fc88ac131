//! Destruction system - removes entities that ran out of health.

use crate::components::*;
use bevy_ecs::prelude::*;
use log::debug;
use serde::{Deserialize, Serialize};

/// An entity destroyed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DestroyedEntity {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    /// True if it was blocking explosions.
    pub obstruction: bool,
}

/// Resource to track destruction events until the next snapshot.
#[derive(Resource, Debug, Default)]
pub struct DestructionEventBuffer {
    pub destroyed: Vec<DestroyedEntity>,
}

impl DestructionEventBuffer {
    pub fn clear(&mut self) {
        self.destroyed.clear();
    }
}

/// Despawns dead entities. Destroyed obstructions drop out of the obstruction
/// index on the next tick through their removed components.
pub fn destruction_cleanup_system(
    mut commands: Commands,
    mut buffer: ResMut<DestructionEventBuffer>,
    query: Query<(Entity, &Health, &Position, Has<Obstruction>), Changed<Health>>,
) {
    for (entity, health, pos, obstruction) in query.iter() {
        if health.is_alive() {
            continue;
        }
        debug!("entity {entity} destroyed at ({:.1}, {:.1})", pos.x, pos.y);
        buffer.destroyed.push(DestroyedEntity {
            id: entity.index(),
            x: pos.x,
            y: pos.y,
            obstruction,
        });
        commands.entity(entity).despawn();
    }
}
