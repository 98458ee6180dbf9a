use parking_lot::RwLock;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use pilot_geometry::Point2;
use pilot_navigation::{FrameSnapshot, WorldMap};

/// Shared state of the pilot.
///
/// The map and the frame snapshot are always replaced together under one
/// write guard, so a reader holding a read guard sees a consistent pair.
pub struct State {
    pub world: WorldMap,
    pub frame: Arc<FrameSnapshot>,
    pub last_plan_ts: Instant,
    pub faults: Vec<String>,
}

impl State {
    pub fn new(world: WorldMap, frame: FrameSnapshot) -> Self {
        State {
            world,
            frame: Arc::new(frame),
            last_plan_ts: Instant::now(),
            faults: Vec::new(),
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn new_blackboard(world: WorldMap, frame: FrameSnapshot) -> Blackboard {
    Arc::new(RwLock::new(State::new(world, frame)))
}

/// Cheap summary of the current state for logging and health checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub frame_id: u64,
    pub player: Option<Point2>,
    pub cells: usize,
    pub faults: usize,
    pub plan_age: Duration,
}

pub fn snapshot(bb: &Blackboard) -> Status {
    let g = bb.read();
    Status {
        frame_id: g.frame.frame_id,
        player: g.frame.player_position(),
        cells: g.world.len(),
        faults: g.faults.len(),
        plan_age: g.last_plan_ts.elapsed(),
    }
}

pub fn player_position(bb: &Blackboard) -> Option<Point2> {
    bb.read().frame.player_position()
}

pub fn touch_plan(bb: &Blackboard) {
    bb.write().last_plan_ts = Instant::now();
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_navigation::{IngestConfig, MapConfig};

    fn blackboard() -> Blackboard {
        let world = WorldMap::new(MapConfig::default()).unwrap();
        let frame = FrameSnapshot::empty(&IngestConfig::default()).unwrap();
        new_blackboard(world, frame)
    }

    #[test]
    fn test_fresh_snapshot() {
        let bb = blackboard();
        let status = snapshot(&bb);
        assert_eq!(status.frame_id, 0);
        assert_eq!(status.player, None);
        assert_eq!(status.cells, 0);
        assert_eq!(status.faults, 0);
    }

    #[test]
    fn test_touch_plan_resets_age() {
        let bb = blackboard();
        bb.write().last_plan_ts = Instant::now() - Duration::from_secs(60);
        assert!(snapshot(&bb).plan_age >= Duration::from_secs(60));
        touch_plan(&bb);
        assert!(snapshot(&bb).plan_age < Duration::from_secs(60));
    }

    #[test]
    fn test_faults_are_deduplicated() {
        let bb = blackboard();
        raise_fault(&bb, "replay ended");
        raise_fault(&bb, "replay ended");
        raise_fault(&bb, "map save failed");
        assert_eq!(bb.read().faults.len(), 2);
    }

    #[tokio::test]
    async fn test_shared_across_tasks() {
        let bb = blackboard();
        let writer = Arc::clone(&bb);
        tokio::spawn(async move {
            writer.write().world.mark_explored(Point2::new(10.0, 10.0));
        })
        .await
        .unwrap();
        assert_eq!(snapshot(&bb).cells, 1);
    }
}
