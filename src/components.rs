//! ECS Components for the explosion simulation.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.

use crate::damage::DamageSpecifier;
use crate::direction::DirectionMask;
use crate::grid::GridId;
use bevy_ecs::prelude::*;
use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// 2D world position.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// 2D velocity vector.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

impl Velocity {
    pub fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy }
    }

    pub fn magnitude(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    /// Add an instantaneous impulse (unit mass).
    pub fn add_impulse(&mut self, impulse: Vec2) {
        self.vx += impulse.x;
        self.vy += impulse.y;
    }
}

/// Anchors an entity to a tile of a grid (walls, windows, doors).
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchored {
    pub grid: GridId,
    pub tile: IVec2,
}

/// Marker for entities inside a container. Explosions skip them.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Contained;

// ============================================================================
// DAMAGE COMPONENTS
// ============================================================================

/// Health of a damageable entity.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn fraction(&self) -> f32 {
        if self.max <= 0.0 {
            0.0
        } else {
            (self.current / self.max).clamp(0.0, 1.0)
        }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }

    /// Apply every damage kind in the specifier.
    pub fn apply(&mut self, damage: &DamageSpecifier) {
        self.damage(damage.total());
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// An airtight occupant that blocks explosion propagation through some sides
/// of its tile until destroyed.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Obstruction {
    /// Sides of the tile this occupant seals.
    pub blocked: DirectionMask,
    /// Indestructible obstructions can never be blown open.
    pub indestructible: bool,
}

impl Obstruction {
    /// A full wall sealing all four sides.
    pub fn wall() -> Self {
        Self {
            blocked: DirectionMask::ALL,
            indestructible: false,
        }
    }

    /// A directional blocker (e.g. a thin window) on the given sides.
    pub fn sides(blocked: DirectionMask) -> Self {
        Self {
            blocked,
            indestructible: false,
        }
    }

    pub fn indestructible(mut self) -> Self {
        self.indestructible = true;
        self
    }
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Bundle for a free damageable entity (crew, items, debris).
#[derive(Bundle, Default)]
pub struct DamageableBundle {
    pub position: Position,
    pub velocity: Velocity,
    pub health: Health,
}

impl DamageableBundle {
    pub fn new(x: f32, y: f32, health: f32) -> Self {
        Self {
            position: Position::new(x, y),
            velocity: Velocity::default(),
            health: Health::new(health),
        }
    }
}

/// Bundle for an obstruction anchored to a grid tile.
#[derive(Bundle)]
pub struct ObstructionBundle {
    pub position: Position,
    pub health: Health,
    pub obstruction: Obstruction,
    pub anchored: Anchored,
}

impl ObstructionBundle {
    /// `position` should be the world-space center of the anchoring tile.
    pub fn new(anchored: Anchored, position: Vec2, obstruction: Obstruction, health: f32) -> Self {
        Self {
            position: Position::new(position.x, position.y),
            health: Health::new(health),
            obstruction,
            anchored,
        }
    }
}
