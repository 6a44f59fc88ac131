//! Basic demonstration of the explosion core.
//!
//! Run with: RUST_LOG=debug cargo run --example basic_demo

use glam::{IVec2, Vec2};
use tbg_blast::{Anchored, Epicenter, ExplosionRequest, GridId, Obstruction, SimWorld, TileGrid};

fn main() {
    env_logger::init();
    println!("=== This Bitter Ground - Explosion Demo ===\n");

    let mut sim = SimWorld::new();
    let floor = sim.tile_defs().find("steel_floor").unwrap_or(tbg_blast::TileId(0));
    sim.add_grid(TileGrid::new(GridId(1), Vec2::ZERO).with_rect(IVec2::new(-10, -6), IVec2::new(10, 6), floor));

    // A wall splitting the station in two, with a reinforced window.
    for y in -6..=6 {
        let anchored = Anchored { grid: GridId(1), tile: IVec2::new(3, y) };
        let obstruction = if y == 0 {
            Obstruction::wall().indestructible()
        } else {
            Obstruction::wall()
        };
        sim.spawn_obstruction(anchored, obstruction, 200.0);
    }

    let crew: Vec<_> = [(-2.5, 0.5), (1.5, 2.5), (6.5, 0.5), (-8.5, -4.5)]
        .iter()
        .map(|&(x, y)| sim.spawn_entity(x, y, 150.0))
        .collect();
    sim.spawn_contained(-1.5, -0.5, 150.0);

    let request = ExplosionRequest::new(Epicenter::World(Vec2::new(0.5, 0.5)), "default", 250.0, 2.0, 8.0);
    if let Some(preview) = sim.preview_explosion(&request) {
        println!(
            "Preview: {} tiles over {} iterations in {} regions\n",
            preview.total_tiles,
            preview.iteration_intensity.len(),
            preview.regions.len()
        );
    }
    let id = sim.queue_explosion(request);
    println!("Queued explosion {id}\n");

    for _ in 0..60 {
        sim.step(1.0 / 30.0);
        let snapshot = sim.snapshot();
        for finished in &snapshot.finished {
            println!("Explosion {} finished at tick {}", finished.id, finished.tick);
        }
        for destroyed in &snapshot.destroyed {
            println!(
                "  entity {} destroyed at ({:.1}, {:.1}){}",
                destroyed.id,
                destroyed.x,
                destroyed.y,
                if destroyed.obstruction { " [wall]" } else { "" }
            );
        }
    }

    println!("\nCrew after the blast:");
    for entity in crew {
        match sim.world().get::<tbg_blast::Health>(entity) {
            Some(health) => {
                let pos = sim.world().get::<tbg_blast::Position>(entity).copied().unwrap_or_default();
                println!("  {entity}: hp={:.0} pos=({:.1}, {:.1})", health.current, pos.x, pos.y);
            }
            None => println!("  {entity}: destroyed"),
        }
    }

    println!("\n=== Final State (JSON) ===\n");
    match sim.snapshot().to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("snapshot failed: {err}"),
    }
}
