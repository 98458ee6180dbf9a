use pilot_geometry::Point2;
use pilot_navigation::collision::{CollisionConfig, CollisionSystem, Facing};
use pilot_navigation::map::{GridCell, MapConfig, ObjectKind, TerrainFeature, WorldMap};
use pilot_navigation::planner::{PathPlanner, PlannerConfig};
use std::collections::HashSet;
use tracing_subscriber::EnvFilter;

const WIDTH: i32 = 16;
const HEIGHT: i32 = 10;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = MapConfig::default();
    let cell = |x: i32, y: i32| GridCell::new(x, y).center(config.cell_size);
    let mut world = WorldMap::new(config).expect("default map config is valid");

    // Lower floor with a gap at x = 6..7, upper floor reached by a rope.
    for x in (0..6).chain(8..WIDTH) {
        world.mark_explored(cell(x, 8));
    }
    for x in 2..12 {
        world.mark_explored(cell(x, 3));
    }
    world.mark_terrain(cell(3, 3), TerrainFeature::Platform);
    world.mark_terrain(cell(3, 8), TerrainFeature::Platform);
    world.add_object(ObjectKind::Rope, cell(3, 5), None);
    world.mark_terrain(cell(10, 8), TerrainFeature::Obstacle);
    world.add_object(ObjectKind::Portal, cell(11, 3), Some(cell(14, 8)));

    let start = cell(0, 8);
    let goal = cell(15, 8);

    let planner = PathPlanner::new(PlannerConfig::default()).expect("default planner config is valid");
    let result = planner.plan(&world, None, start, goal);
    println!("{}", result);

    let Some(raw) = result.path else {
        println!("\nNo path found.");
        return;
    };

    let on_path: HashSet<GridCell> = raw.iter().map(|w| w.cell).collect();
    println!("\nGrid with path (S start, G goal, * path, # explored, X obstacle, | rope, O portal):");
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let c = GridCell::new(x, y);
            let symbol = if c == world.cell_of(start) {
                'S'
            } else if c == world.cell_of(goal) {
                'G'
            } else if on_path.contains(&c) {
                '*'
            } else if world.portals().contains_key(&c) {
                'O'
            } else if world.rope_spans().iter().any(|s| s.contains(c)) {
                '|'
            } else {
                match world.state(c) {
                    Some(state) if state.is_walkable() => '#',
                    Some(_) => 'X',
                    None => '.',
                }
            };
            print!("{} ", symbol);
        }
        println!();
    }

    let smoothed = planner.smooth_path(&world, None, &raw);
    println!("\nRaw path: {} steps, smoothed: {} actions", raw.len(), smoothed.len());
    for waypoint in &smoothed {
        println!("  {:>10} -> {} (cell {})", waypoint.action.to_string(), waypoint.position, waypoint.cell);
    }

    let collision = CollisionSystem::new(CollisionConfig::default());
    let probe = collision.detect_platform_gap(&world, Point2::new(start.x, start.y - 25.0), Facing::Right, 400.0);
    println!("\nGround probe to the right of the start: {:?}", probe);
}
