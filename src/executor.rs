use std::collections::VecDeque;
use std::sync::Arc;

use pilot_geometry::Point2;
use pilot_navigation::Waypoint;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::blackboard::{Blackboard, player_position};
use crate::bus::{Plan, Shutdown, StuckReport, Topic};

/// Boundary to whatever turns actions into input.
pub trait ActionSink {
    fn perform(&mut self, plan_id: u64, waypoint: &Waypoint) -> anyhow::Result<()>;
}

/// Sink that only logs, used when no input device is attached.
#[derive(Debug, Default)]
pub struct LogSink;

impl ActionSink for LogSink {
    fn perform(&mut self, plan_id: u64, waypoint: &Waypoint) -> anyhow::Result<()> {
        info!(plan_id, action = %waypoint.action, target = %waypoint.position, cell = %waypoint.cell, "executing");
        Ok(())
    }
}

/// Flags the player as stuck when it moved less than `min_progress` over
/// the last `window` executions.
#[derive(Debug)]
pub struct StuckTracker {
    window: usize,
    min_progress: f64,
    samples: VecDeque<Point2>,
}

impl StuckTracker {
    pub fn new(window: usize, min_progress: f64) -> Self {
        let window = window.max(2);
        Self {
            window,
            min_progress,
            samples: VecDeque::with_capacity(window),
        }
    }

    /// Adds the position seen after one execution.
    pub fn record(&mut self, position: Point2) -> Option<StuckReport> {
        self.samples.push_back(position);
        if self.samples.len() < self.window {
            return None;
        }
        let first = self.samples.pop_front()?;
        let moved = first.distance(position);
        if moved < self.min_progress {
            self.samples.clear();
            return Some(StuckReport { position, moved });
        }
        None
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

/// Executor task: performs each published plan and watches for lack of
/// progress.
pub async fn executor_task<S: ActionSink>(
    bb: Blackboard,
    mut sink: S,
    mut tracker: StuckTracker,
    mut plan_rx: broadcast::Receiver<Arc<Plan>>,
    stuck_tx: Topic<StuckReport>,
    mut shutdown_rx: broadcast::Receiver<Arc<Shutdown>>,
) -> anyhow::Result<()> {
    info!("Executor task started.");
    loop {
        let plan = tokio::select! {
            msg = plan_rx.recv() => match msg {
                Ok(plan) => plan,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "executor skipped stale plans");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown_rx.recv() => break,
        };

        if let Some(gap) = plan.gap {
            debug!(plan_id = plan.id, distance = gap.distance, width = ?gap.width, "plan crosses a gap");
        }
        // The first waypoint is where the player already is.
        for waypoint in plan.waypoints.iter().skip(usize::from(plan.waypoints.len() > 1)) {
            if let Err(e) = sink.perform(plan.id, waypoint) {
                warn!(plan_id = plan.id, error = %e, "action failed, dropping rest of plan");
                break;
            }
        }

        match player_position(&bb) {
            Some(position) => {
                if let Some(report) = tracker.record(position) {
                    warn!(position = %report.position, moved = report.moved, "no progress over recent executions");
                    stuck_tx.publish(report);
                }
            }
            None => tracker.reset(),
        }
    }
    info!("Executor task finished.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::new_blackboard;
    use crate::bus::PlanKind;
    use pilot_navigation::map::GridCell;
    use pilot_navigation::{Action, FrameSnapshot, IngestConfig, MapConfig, WorldMap};
    use std::sync::Mutex;

    #[test]
    fn test_stuck_after_full_window_without_progress() {
        let mut tracker = StuckTracker::new(5, 5.0);
        for i in 0..4 {
            assert!(tracker.record(Point2::new(100.0 + i as f64, 50.0)).is_none());
        }
        let report = tracker.record(Point2::new(103.0, 50.0)).unwrap();
        assert_eq!(report.moved, 3.0);
        // The window starts over after a report.
        assert!(tracker.record(Point2::new(103.0, 50.0)).is_none());
    }

    #[test]
    fn test_progress_is_not_stuck() {
        let mut tracker = StuckTracker::new(5, 5.0);
        for i in 0..20 {
            assert!(tracker.record(Point2::new(i as f64 * 10.0, 0.0)).is_none());
        }
    }

    #[test]
    fn test_window_slides() {
        let mut tracker = StuckTracker::new(3, 5.0);
        assert!(tracker.record(Point2::new(0.0, 0.0)).is_none());
        assert!(tracker.record(Point2::new(50.0, 0.0)).is_none());
        assert!(tracker.record(Point2::new(50.0, 0.0)).is_none());
        assert!(tracker.record(Point2::new(51.0, 0.0)).is_some());
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(u64, Action)>>>);

    impl ActionSink for Recorder {
        fn perform(&mut self, plan_id: u64, waypoint: &Waypoint) -> anyhow::Result<()> {
            self.0.lock().unwrap().push((plan_id, waypoint.action));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_executes_plans_and_reports_stuck() {
        let world = WorldMap::new(MapConfig::default()).unwrap();
        let bb = new_blackboard(world, FrameSnapshot::empty(&IngestConfig::default()).unwrap());
        // Plant a player that never moves.
        {
            use pilot_navigation::ingest_frame;
            let mut state = bb.write();
            let raw = vec![pilot_navigation::RawDetection {
                class_name: "player".to_string(),
                bbox: [0.0, 0.0, 10.0, 10.0],
                confidence: 1.0,
            }];
            let frame = ingest_frame(
                &mut state.world,
                1,
                raw,
                &pilot_geometry::LinearTransform::identity(),
                &IngestConfig::default(),
            )
            .unwrap();
            state.frame = Arc::new(frame);
        }

        let plans: Topic<Plan> = Topic::new(16);
        let stuck: Topic<StuckReport> = Topic::new(1);
        let shutdown: Topic<Shutdown> = Topic::new(1);
        let mut stuck_rx = stuck.subscribe();
        let recorder = Recorder::default();
        let task = tokio::spawn(executor_task(
            Arc::clone(&bb),
            recorder.clone(),
            StuckTracker::new(2, 5.0),
            plans.subscribe(),
            stuck.clone(),
            shutdown.subscribe(),
        ));

        for id in 1..=2 {
            plans.publish(Plan {
                id,
                kind: PlanKind::Route,
                goal: Point2::new(125.0, 25.0),
                waypoints: vec![
                    Waypoint::new(Action::Move, GridCell::new(0, 0), 50.0),
                    Waypoint::new(Action::Jump, GridCell::new(1, -2), 50.0),
                    Waypoint::new(Action::Move, GridCell::new(2, -2), 50.0),
                ],
                gap: None,
            });
        }

        let report = stuck_rx.recv().await.unwrap();
        assert_eq!(report.position, Point2::new(5.0, 5.0));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(1, Action::Jump), (1, Action::Move), (2, Action::Jump), (2, Action::Move)]
        );

        shutdown.publish(Shutdown);
        task.await.unwrap().unwrap();
    }
}
