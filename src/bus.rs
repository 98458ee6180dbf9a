use std::sync::Arc;
use tokio::sync::broadcast;

use pilot_geometry::Point2;
use pilot_navigation::collision::GapExtent;
use pilot_navigation::{RawDetection, Waypoint};

/// Broadcast topic with bounded capacity.
/// `T` must be `Send + Sync` because we hop across threads.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers that saw the message.
    pub fn publish(&self, msg: T) -> usize {
        self.tx.send(Arc::new(msg)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

/// One detector pass, still in screen space.
#[derive(Debug, Clone)]
pub struct DetectionFrame {
    pub frame_id: u64,
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Planned route to the goal.
    Route,
    /// Single step into unexplored space next to the player.
    Explore,
    /// Random horizontal move used when nothing better is known.
    Nudge,
    /// Attack on, or approach to, the nearest monster.
    Combat,
}

/// Action sequence handed to the executor.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: u64,
    pub kind: PlanKind,
    pub goal: Point2,
    pub waypoints: Vec<Waypoint>,
    /// Gap found ahead of the first move, if any.
    pub gap: Option<GapExtent>,
}

/// The player has not moved over the last few executions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StuckReport {
    pub position: Point2,
    pub moved: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Shutdown;
