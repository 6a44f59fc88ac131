//! Movement system - integrates velocity for thrown entities.

use crate::components::*;
use crate::config::SimConfig;
use bevy_ecs::prelude::*;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Below this speed an entity comes to rest.
const REST_SPEED: f32 = 0.01;

/// System that applies velocity to position, then damps it.
///
/// Velocity decays to `velocity_retention` of its value over one second, so
/// a knocked back entity slides a short way and stops.
pub fn movement_system(
    dt: Res<DeltaTime>,
    config: Res<SimConfig>,
    mut query: Query<(&mut Position, &mut Velocity), Without<Anchored>>,
) {
    let delta = dt.0;
    let damping = config.velocity_retention.clamp(0.0, 1.0).powf(delta);
    for (mut pos, mut vel) in query.iter_mut() {
        if vel.vx == 0.0 && vel.vy == 0.0 {
            continue;
        }
        pos.x += vel.vx * delta;
        pos.y += vel.vy * delta;

        vel.vx *= damping;
        vel.vy *= damping;
        if vel.magnitude() < REST_SPEED {
            vel.vx = 0.0;
            vel.vy = 0.0;
        }
    }
}
