//! Replay detection source.
//!
//! Reads a JSON-lines capture, one array of detection records per line, and
//! publishes it frame by frame at a fixed pace from a dedicated thread.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use pilot_navigation::RawDetection;
use spin_sleep::SpinSleeper;
use tracing::{info, warn};

use crate::bus::{DetectionFrame, Topic};

/// Parses a capture. Blank lines are skipped, malformed ones are logged and
/// skipped.
pub fn parse_replay(text: &str) -> Vec<Vec<RawDetection>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<Vec<RawDetection>>(line) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping malformed replay line");
                None
            }
        })
        .collect()
}

pub fn load_replay(path: &Path) -> anyhow::Result<Vec<Vec<RawDetection>>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading replay file {}", path.display()))?;
    let frames = parse_replay(&text);
    info!(path = %path.display(), frames = frames.len(), "replay loaded");
    Ok(frames)
}

/// Starts publishing `frames` on a background thread until `running` clears.
/// With `repeat` the capture loops, otherwise the thread ends after the
/// last frame.
pub fn spawn_replay(
    frames: Vec<Vec<RawDetection>>,
    topic: Topic<DetectionFrame>,
    running: Arc<AtomicBool>,
    interval: Duration,
    repeat: bool,
) -> anyhow::Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new().name("replay".into()).spawn(move || {
        info!("Replay thread started.");
        let sleeper = SpinSleeper::new(100_000);
        let mut frame_id = 0u64;
        'outer: loop {
            for detections in &frames {
                if !running.load(Ordering::Relaxed) {
                    break 'outer;
                }
                frame_id += 1;
                topic.publish(DetectionFrame {
                    frame_id,
                    detections: detections.clone(),
                });
                sleeper.sleep(interval);
            }
            if !repeat || frames.is_empty() {
                break;
            }
        }
        info!(frames = frame_id, "Replay thread finished.");
    })?;
    Ok(handle)
}
