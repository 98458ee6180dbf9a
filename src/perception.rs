use std::sync::Arc;
use std::time::Duration;

use pilot_geometry::CoordinateTransform;
use pilot_navigation::{IngestConfig, NavigationError, ingest_frame};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time;
use tracing::{debug, info, warn};

use crate::blackboard::{Blackboard, raise_fault};
use crate::bus::{DetectionFrame, Shutdown};

/// Folds one frame into the map and swaps in its snapshot, both under a
/// single write guard.
pub fn apply_frame(
    bb: &Blackboard,
    frame: &DetectionFrame,
    transform: &dyn CoordinateTransform,
    config: &IngestConfig,
) -> Result<(), NavigationError> {
    let mut state = bb.write();
    let snapshot = ingest_frame(&mut state.world, frame.frame_id, frame.detections.clone(), transform, config)?;
    state.frame = Arc::new(snapshot);
    Ok(())
}

/// Perception task: ingests the newest pending frame on every tick.
///
/// Frames that arrive faster than the tick rate are superseded, never queued.
pub async fn perception_task(
    bb: Blackboard,
    mut frame_rx: broadcast::Receiver<Arc<DetectionFrame>>,
    mut shutdown_rx: broadcast::Receiver<Arc<Shutdown>>,
    transform: Arc<dyn CoordinateTransform + Send + Sync>,
    config: IngestConfig,
    period: Duration,
) -> anyhow::Result<()> {
    info!("Perception task started.");
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let mut pending: Option<Arc<DetectionFrame>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(frame) = pending.take() else { continue };
                match apply_frame(&bb, &frame, transform.as_ref(), &config) {
                    Ok(()) => debug!(frame_id = frame.frame_id, "frame applied"),
                    Err(e) => {
                        warn!(frame_id = frame.frame_id, error = %e, "frame rejected");
                        raise_fault(&bb, "frame ingestion failed");
                    }
                }
            }
            msg = frame_rx.recv() => match msg {
                Ok(frame) => {
                    if let Some(old) = pending.replace(frame) {
                        debug!(frame_id = old.frame_id, "frame superseded before ingestion");
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "perception lagging behind source"),
                Err(RecvError::Closed) => {
                    info!("Detection source closed.");
                    break;
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }

    info!("Perception task finished.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::{new_blackboard, snapshot};
    use crate::bus::Topic;
    use pilot_geometry::{LinearTransform, Point2};
    use pilot_navigation::{FrameSnapshot, MapConfig, RawDetection, WorldMap};

    fn blackboard() -> Blackboard {
        let world = WorldMap::new(MapConfig::default()).unwrap();
        new_blackboard(world, FrameSnapshot::empty(&IngestConfig::default()).unwrap())
    }

    fn player_frame(frame_id: u64, x: f64) -> DetectionFrame {
        DetectionFrame {
            frame_id,
            detections: vec![RawDetection {
                class_name: "player".to_string(),
                bbox: [x, 0.0, x + 10.0, 10.0],
                confidence: 0.9,
            }],
        }
    }

    #[test]
    fn test_apply_frame_updates_map_and_snapshot_together() {
        let bb = blackboard();
        apply_frame(&bb, &player_frame(7, 100.0), &LinearTransform::identity(), &IngestConfig::default()).unwrap();
        let status = snapshot(&bb);
        assert_eq!(status.frame_id, 7);
        assert_eq!(status.player, Some(Point2::new(105.0, 5.0)));
        assert!(bb.read().world.is_explored(Point2::new(105.0, 5.0)));
    }

    #[tokio::test]
    async fn test_task_ingests_and_stops_on_shutdown() {
        let bb = blackboard();
        let frames: Topic<DetectionFrame> = Topic::new(4);
        let shutdown: Topic<Shutdown> = Topic::new(1);
        let task = tokio::spawn(perception_task(
            Arc::clone(&bb),
            frames.subscribe(),
            shutdown.subscribe(),
            Arc::new(LinearTransform::identity()),
            IngestConfig::default(),
            Duration::from_millis(5),
        ));

        frames.publish(player_frame(1, 0.0));
        for _ in 0..100 {
            if snapshot(&bb).frame_id == 1 {
                break;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(snapshot(&bb).frame_id, 1);

        shutdown.publish(Shutdown);
        task.await.unwrap().unwrap();
    }
}
