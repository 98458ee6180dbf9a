mod behavior;
mod blackboard;
mod bus;
mod executor;
mod perception;
mod settings;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use behavior::{Behavior, behavior_task};
use blackboard::{Blackboard, new_blackboard, raise_fault, snapshot};
use bus::{DetectionFrame, Plan, Shutdown, StuckReport, Topic};
use executor::{LogSink, StuckTracker, executor_task};
use perception::perception_task;
use pilot_geometry::CoordinateTransform;
use pilot_navigation::{FrameSnapshot, MapStore, PathPlanner, WorldMap};
use settings::Settings;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Maple pilot starting.");
    let settings = settings::load_settings().context("loading configuration")?;

    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(run(settings)) {
        Ok(()) => {
            info!("Maple pilot stopped.");
            Ok(())
        }
        Err(e) => {
            error!("Pilot failed: {:?}", e);
            Err(e)
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let store = MapStore::new(settings.map.save_dir.clone());
    let world = open_map(&store, &settings)?;

    let ingest = settings.ingest_config();
    let bb: Blackboard = new_blackboard(world, FrameSnapshot::empty(&ingest)?);
    let planner = PathPlanner::new(settings.planner_config())?;
    let transform: Arc<dyn CoordinateTransform + Send + Sync> = Arc::new(settings.transform()?);

    let capacity = settings.runtime.topic_capacity;
    let frame_topic: Topic<DetectionFrame> = Topic::new(capacity);
    let plan_topic: Topic<Plan> = Topic::new(capacity);
    let stuck_topic: Topic<StuckReport> = Topic::new(capacity);
    let shutdown_topic: Topic<Shutdown> = Topic::new(1);
    let running = Arc::new(AtomicBool::new(true));

    // Subscribe everything before any producer starts.
    let frame_rx = frame_topic.subscribe();
    let plan_rx = plan_topic.subscribe();
    let stuck_rx = stuck_topic.subscribe();

    let replay = match &settings.source.replay_path {
        Some(path) => {
            info!("Spawning replay thread...");
            let frames = source::load_replay(path)?;
            Some(source::spawn_replay(
                frames,
                frame_topic.clone(),
                Arc::clone(&running),
                Duration::from_millis(settings.source.frame_interval_ms),
                settings.source.repeat,
            )?)
        }
        None => {
            warn!("No detection source configured, waiting for frames that will not come.");
            None
        }
    };

    let behavior = Behavior::new(planner, settings.behavior.clone());
    let tracker = StuckTracker::new(settings.behavior.stuck_window, settings.behavior.stuck_min_progress);

    info!("Starting async tasks (perception, behavior, executor, autosave)...");
    tokio::try_join!(
        perception_task(
            bb.clone(),
            frame_rx,
            shutdown_topic.subscribe(),
            transform,
            ingest,
            period(settings.runtime.perception_hz),
        ),
        behavior_task(
            bb.clone(),
            behavior,
            plan_topic.clone(),
            stuck_rx,
            shutdown_topic.subscribe(),
            period(settings.runtime.behavior_hz),
        ),
        executor_task(bb.clone(), LogSink, tracker, plan_rx, stuck_topic.clone(), shutdown_topic.subscribe()),
        autosave(
            bb.clone(),
            &store,
            Duration::from_secs(settings.map.autosave_secs.max(1)),
            shutdown_topic.subscribe(),
        ),
        shutdown_signal(Arc::clone(&running), shutdown_topic.clone()),
    )?;

    running.store(false, Ordering::Relaxed);
    if let Some(handle) = replay {
        if handle.join().is_err() {
            warn!("Replay thread panicked.");
        }
    }

    if let Some(path) = save_map(&bb, &store)? {
        info!(path = %path.display(), "final map saved");
    }
    Ok(())
}

/// Loads the configured map. A saved map that cannot be read at the
/// configured cell size stops startup instead of being overwritten later.
fn open_map(store: &MapStore, settings: &Settings) -> anyhow::Result<WorldMap> {
    let world = store
        .load(&settings.map.map_id, settings.map_config())
        .with_context(|| format!("loading map {}", settings.map.map_id))?;
    info!(map_id = %settings.map.map_id, cells = world.len(), "map ready");
    Ok(world)
}

/// Period of a loop running at `hz`, clamped to something sane.
fn period(hz: f64) -> Duration {
    let hz = if hz.is_finite() && hz > 0.0 { hz } else { 1.0 };
    Duration::from_secs_f64(1.0 / hz.min(1000.0))
}

/// Writes the current map to disk. The map is cloned so the write lock is
/// never held across file I/O.
fn save_map(bb: &Blackboard, store: &MapStore) -> anyhow::Result<Option<PathBuf>> {
    let world = bb.read().world.clone();
    let Some(map_id) = world.map_id() else {
        return Ok(None);
    };
    let path = store.save(map_id, &world).with_context(|| format!("saving map {}", map_id))?;
    Ok(Some(path))
}

async fn autosave(
    bb: Blackboard,
    store: &MapStore,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<Arc<Shutdown>>,
) -> anyhow::Result<()> {
    info!("Autosave task started.");
    let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = save_map(&bb, store) {
                    warn!(error = %e, "autosave failed");
                    raise_fault(&bb, "autosave failed");
                } else {
                    let status = snapshot(&bb);
                    info!(
                        frame_id = status.frame_id,
                        cells = status.cells,
                        faults = status.faults,
                        plan_age = ?status.plan_age,
                        "map autosaved"
                    );
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
    Ok(())
}

async fn shutdown_signal(running: Arc<AtomicBool>, shutdown_tx: Topic<Shutdown>) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, initiating graceful shutdown");
    running.store(false, Ordering::Relaxed);
    shutdown_tx.publish(Shutdown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_geometry::Point2;
    use pilot_navigation::{IngestConfig, MapConfig, NavigationError};

    #[test]
    fn test_period_clamps() {
        assert_eq!(period(10.0), Duration::from_millis(100));
        assert_eq!(period(0.0), Duration::from_secs(1));
        assert_eq!(period(f64::NAN), Duration::from_secs(1));
    }

    #[test]
    fn test_save_map_skips_untagged_and_writes_tagged() {
        let dir = tempfile::tempdir().unwrap();
        let store = MapStore::new(dir.path());
        let mut world = WorldMap::new(MapConfig::default()).unwrap();
        world.mark_explored(Point2::new(10.0, 10.0));
        let bb = new_blackboard(world, FrameSnapshot::empty(&IngestConfig::default()).unwrap());

        assert!(save_map(&bb, &store).unwrap().is_none());

        bb.write().world.set_map_id("ellinia");
        let path = save_map(&bb, &store).unwrap().unwrap();
        assert_eq!(path, store.path_for("ellinia"));
        let loaded = store.load("ellinia", MapConfig::default()).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_cell_size_change_refuses_to_open_saved_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.map.save_dir = dir.path().to_path_buf();
        settings.map.map_id = "kerning".to_string();
        let store = MapStore::new(dir.path());

        let mut world = open_map(&store, &settings).unwrap();
        for x in 0..10 {
            world.mark_explored(Point2::new(x as f64 * 50.0 + 25.0, 25.0));
        }
        store.save("kerning", &world).unwrap();

        settings.map.cell_size = 25.0;
        let err = open_map(&store, &settings).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NavigationError>(),
            Some(NavigationError::CellSizeMismatch { .. })
        ));

        settings.map.cell_size = 50.0;
        assert_eq!(open_map(&store, &settings).unwrap().len(), 10);
    }
}
