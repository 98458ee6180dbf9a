use std::sync::Arc;
use std::time::Duration;

use pilot_geometry::Point2;
use pilot_navigation::collision::GapExtent;
use pilot_navigation::frontier::{find_frontiers, select_closest_frontier, select_largest_frontier, select_random_frontier};
use pilot_navigation::{Action, BoxKind, DetectionClass, Facing, PathPlanner, Waypoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time;
use tracing::{debug, info, warn};

use crate::blackboard::{Blackboard, State, touch_plan};
use crate::bus::{Plan, PlanKind, Shutdown, StuckReport, Topic};
use crate::settings::BehaviorSettings;

/// Decides what the player should do next from the shared state.
pub struct Behavior {
    planner: PathPlanner,
    settings: BehaviorSettings,
    rng: StdRng,
    next_id: u64,
}

impl Behavior {
    pub fn new(planner: PathPlanner, settings: BehaviorSettings) -> Self {
        Self::with_rng(planner, settings, StdRng::from_os_rng())
    }

    pub fn with_rng(planner: PathPlanner, settings: BehaviorSettings, rng: StdRng) -> Self {
        Self {
            planner,
            settings,
            rng,
            next_id: 0,
        }
    }

    /// One decision. `None` when there is no player in the frame or the
    /// player already stands on the configured goal.
    ///
    /// Order of preference: a monster in reach, the configured goal or a
    /// frontier, then a random nudge.
    pub fn decide(&mut self, state: &State) -> Option<Plan> {
        let world = &state.world;
        let frame = &state.frame;
        let Some(player) = frame.player_position() else {
            debug!(frame_id = frame.frame_id, "no player in frame, skipping");
            return None;
        };
        let here = world.cell_of(player);
        self.log_surroundings(state, player);

        if self.settings.combat {
            if let Some(plan) = self.engage(state, player) {
                return Some(plan);
            }
        }

        let goals = match self.settings.goal {
            Some([x, y]) => {
                let goal = Point2::new(x, y);
                if world.cell_of(goal) == here {
                    debug!(%goal, "goal reached");
                    return None;
                }
                vec![goal]
            }
            None => {
                let frontiers = find_frontiers(world);
                let Some(closest) = select_closest_frontier(&frontiers, here) else {
                    debug!("no frontier known");
                    return Some(self.nudge(state, player));
                };
                if closest.cell == here {
                    // Standing on the frontier: step into the unknown.
                    let target = closest.unknown_neighbors[0];
                    let waypoint = Waypoint::new(Action::Move, target, world.cell_size());
                    return Some(self.emit(PlanKind::Explore, waypoint.position, vec![waypoint], None));
                }
                // Fallbacks for when the closest one cannot be reached.
                let mut goals = vec![closest.position];
                let fallbacks = [
                    select_largest_frontier(&frontiers),
                    select_random_frontier(&frontiers, &mut self.rng),
                ];
                for frontier in fallbacks.into_iter().flatten() {
                    if !goals.contains(&frontier.position) {
                        goals.push(frontier.position);
                    }
                }
                goals
            }
        };

        for goal in goals {
            if let Some(waypoints) = self.route(state, player, goal) {
                let gap = self.gap_ahead(state, player, &waypoints);
                let waypoints = self.react(state, player, waypoints, gap);
                return Some(self.emit(PlanKind::Route, goal, waypoints, gap));
            }
            debug!(%goal, "goal unreachable");
        }
        Some(self.nudge(state, player))
    }

    fn route(&self, state: &State, player: Point2, goal: Point2) -> Option<Vec<Waypoint>> {
        let index = Some(&state.frame.index);
        let raw = self.planner.plan(&state.world, index, player, goal).into_path()?;
        Some(self.planner.smooth_path(&state.world, index, &raw))
    }

    /// Nearest monster within the search radius: attacked when in range,
    /// approached otherwise. `None` when there is no monster or no way to it.
    fn engage(&mut self, state: &State, player: Point2) -> Option<Plan> {
        let target = state
            .frame
            .index
            .query_circle(player, self.settings.monster_search_radius)
            .into_iter()
            .filter(|p| p.payload.class == DetectionClass::Monster)
            .map(|p| p.position)
            .min_by(|a, b| a.distance(player).total_cmp(&b.distance(player)))?;

        let distance = target.distance(player);
        if distance <= self.settings.attack_range {
            let facing = Facing::toward(target.x - player.x);
            info!(%target, distance, ?facing, "attacking monster");
            let strike = Waypoint {
                action: Action::Attack,
                position: target,
                cell: state.world.cell_of(target),
            };
            return Some(self.emit(PlanKind::Combat, target, vec![strike], None));
        }

        let Some(waypoints) = self.route(state, player, target) else {
            debug!(%target, distance, "monster out of reach");
            return None;
        };
        debug!(%target, distance, "approaching monster");
        let gap = self.gap_ahead(state, player, &waypoints);
        let waypoints = self.react(state, player, waypoints, gap);
        Some(self.emit(PlanKind::Combat, target, waypoints, gap))
    }

    /// Probes the ground ahead of the first walking move.
    fn gap_ahead(&self, state: &State, player: Point2, waypoints: &[Waypoint]) -> Option<GapExtent> {
        let next = waypoints.iter().find(|w| w.cell != state.world.cell_of(player))?;
        if next.action != Action::Move {
            return None;
        }
        let facing = Facing::toward(next.position.x - player.x);
        let max = self.settings.gap_probe_distance;
        let collision = &state.frame.collision;
        if !collision.detect_platform_gap(&state.world, player, facing, max).is_gap() {
            return None;
        }
        let extent = collision.measure_gap_width(&state.world, player, facing, max)?;
        info!(distance = extent.distance, width = ?extent.width, ?facing, "gap ahead of next move");
        Some(extent)
    }

    /// Turns the first walking move into a jump when an obstacle sits right
    /// ahead or a close gap is narrow enough to clear.
    ///
    /// The jump lands just past the obstacle or gap. If that is at or beyond
    /// the move's own target, the move itself becomes the jump.
    fn react(&self, state: &State, player: Point2, mut waypoints: Vec<Waypoint>, gap: Option<GapExtent>) -> Vec<Waypoint> {
        let world = &state.world;
        let here = world.cell_of(player);
        let Some(i) = waypoints.iter().position(|w| w.cell != here) else {
            return waypoints;
        };
        let next = waypoints[i];
        if next.action != Action::Move {
            return waypoints;
        }
        let facing = Facing::toward(next.position.x - player.x);
        let heading = Point2::new(next.position.x - player.x, next.position.y - player.y);

        let obstacle = state
            .frame
            .collision
            .predict_obstacle(player, heading, self.settings.obstacle_jump_distance);
        let landing_x = if let Some(hit) = obstacle {
            info!(distance = hit.distance, position = %hit.position, "obstacle ahead, jumping");
            match facing {
                Facing::Right => hit.bounds.max.x,
                Facing::Left => hit.bounds.min.x,
            }
        } else {
            match gap {
                Some(GapExtent {
                    distance,
                    width: Some(width),
                }) if distance < self.settings.gap_jump_distance && width < self.settings.jump_distance => {
                    info!(distance, width, "jumping gap");
                    player.x + facing.sign() * (distance + width)
                }
                Some(extent) => {
                    debug!(distance = extent.distance, width = ?extent.width, "gap not jumpable from here");
                    return waypoints;
                }
                None => return waypoints,
            }
        };

        if facing.sign() * (landing_x - next.position.x) >= 0.0 {
            waypoints[i].action = Action::Jump;
        } else {
            let landing = world.cell_of(Point2::new(landing_x, player.y));
            waypoints.insert(i, Waypoint::new(Action::Jump, landing, world.cell_size()));
        }
        waypoints
    }

    /// Logs contacts and nearby connections; read-only.
    fn log_surroundings(&self, state: &State, player: Point2) {
        let collision = &state.frame.collision;
        let mut contacts = collision.check_player_collisions();
        contacts.sort_by_key(|c| c.kind.priority());
        if let Some(first) = contacts.first() {
            debug!(kind = ?first.kind, position = %first.position, contacts = contacts.len(), "player touching");
        }
        if collision.is_player_near(BoxKind::Rope, self.settings.rope_reach) {
            debug!("rope within reach");
        }
        let nearby = state.world.nearby_objects(player, 2);
        if !nearby.is_empty() {
            debug!(count = nearby.len(), "known portals or ropes nearby");
        }
    }

    /// Random horizontal step, the fallback when no route is known.
    fn nudge(&mut self, state: &State, player: Point2) -> Plan {
        let dx = if self.rng.random_bool(0.5) {
            self.settings.nudge_distance
        } else {
            -self.settings.nudge_distance
        };
        let target = player.offset(dx, 0.0);
        let waypoint = Waypoint {
            action: Action::Move,
            position: target,
            cell: state.world.cell_of(target),
        };
        debug!(dx, "no route, nudging");
        self.emit(PlanKind::Nudge, target, vec![waypoint], None)
    }

    fn emit(&mut self, kind: PlanKind, goal: Point2, waypoints: Vec<Waypoint>, gap: Option<GapExtent>) -> Plan {
        self.next_id += 1;
        Plan {
            id: self.next_id,
            kind,
            goal,
            waypoints,
            gap,
        }
    }
}

/// Behavior task: decides on every tick, and immediately after a stuck
/// report.
pub async fn behavior_task(
    bb: Blackboard,
    mut behavior: Behavior,
    plan_tx: Topic<Plan>,
    mut stuck_rx: broadcast::Receiver<Arc<StuckReport>>,
    mut shutdown_rx: broadcast::Receiver<Arc<Shutdown>>,
    period: Duration,
) -> anyhow::Result<()> {
    info!("Behavior task started.");
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            msg = stuck_rx.recv() => match msg {
                Ok(report) => {
                    warn!(position = %report.position, moved = report.moved, "player stuck, replanning");
                    ticker.reset();
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            _ = shutdown_rx.recv() => break,
        }

        let plan = {
            let state = bb.read();
            behavior.decide(&state)
        };
        if let Some(plan) = plan {
            debug!(id = plan.id, kind = ?plan.kind, goal = %plan.goal, steps = plan.waypoints.len(), "plan published");
            plan_tx.publish(plan);
            touch_plan(&bb);
        }
    }

    info!("Behavior task finished.");
    Ok(())
}
