use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File, FileFormat};
use pilot_geometry::{LinearTransform, Point2};
use pilot_navigation::{CollisionConfig, IndexConfig, IngestConfig, MapConfig, PlannerConfig};
use serde::Deserialize;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Loop rates and channel sizes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub perception_hz: f64,
    pub behavior_hz: f64,
    pub topic_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            perception_hz: 10.0,
            behavior_hz: 4.0,
            topic_capacity: 16,
        }
    }
}

/// World map resolution and persistence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Shared by the map and the planner.
    pub cell_size: f64,
    pub jitter_threshold: f64,
    pub rope_scan_cells: i32,
    pub save_dir: PathBuf,
    pub map_id: String,
    pub autosave_secs: u64,
}

impl Default for MapSettings {
    fn default() -> Self {
        let map = MapConfig::default();
        Self {
            cell_size: map.cell_size,
            jitter_threshold: map.jitter_threshold,
            rope_scan_cells: map.rope_scan_cells,
            save_dir: PathBuf::from("maps"),
            map_id: "default".to_string(),
            autosave_secs: 30,
        }
    }
}

/// Search tunables. The cell size comes from [`MapSettings`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub heuristic_weight: f64,
    pub max_expansions: usize,
    pub super_cell_size: i32,
    pub hierarchical_threshold: u32,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        let planner = PlannerConfig::default();
        Self {
            heuristic_weight: planner.heuristic_weight,
            max_expansions: planner.max_expansions,
            super_cell_size: planner.super_cell_size,
            hierarchical_threshold: planner.hierarchical_threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BehaviorSettings {
    /// Fixed world goal `[x, y]`. Without one the closest frontier is used.
    pub goal: Option<[f64; 2]>,
    /// How far ahead the ground probe looks before a move.
    pub gap_probe_distance: f64,
    /// Horizontal distance of the random nudge used when no route exists.
    pub nudge_distance: f64,
    /// Executions compared by the stuck check.
    pub stuck_window: usize,
    /// Movement below this over the window counts as stuck.
    pub stuck_min_progress: f64,
    pub min_confidence: f32,
    pub mark_platforms: bool,
    /// Hunt monsters before following the goal or frontiers.
    pub combat: bool,
    /// Monsters farther than this are ignored.
    pub monster_search_radius: f64,
    /// A monster this close is attacked instead of approached.
    pub attack_range: f64,
    /// An obstacle this close ahead of the next move turns it into a jump.
    pub obstacle_jump_distance: f64,
    /// A gap starting this close ahead is jumped when narrow enough.
    pub gap_jump_distance: f64,
    /// Widest gap a jump clears.
    pub jump_distance: f64,
    /// Reach used for the rope proximity check.
    pub rope_reach: f64,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        let ingest = IngestConfig::default();
        Self {
            goal: None,
            gap_probe_distance: 200.0,
            nudge_distance: 100.0,
            stuck_window: 5,
            stuck_min_progress: 5.0,
            min_confidence: ingest.min_confidence,
            mark_platforms: ingest.mark_platforms,
            combat: true,
            monster_search_radius: 400.0,
            attack_range: 150.0,
            obstacle_jump_distance: 30.0,
            gap_jump_distance: 50.0,
            jump_distance: 120.0,
            rope_reach: 50.0,
        }
    }
}

/// Where detections come from and how screen space maps to world space.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// JSON-lines replay file, one array of detections per line.
    pub replay_path: Option<PathBuf>,
    pub frame_interval_ms: u64,
    pub repeat: bool,
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            replay_path: None,
            frame_interval_ms: 100,
            repeat: false,
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub runtime: RuntimeSettings,
    pub map: MapSettings,
    pub index: IndexConfig,
    pub planner: PlannerSettings,
    pub collision: CollisionConfig,
    pub behavior: BehaviorSettings,
    pub source: SourceSettings,
}

impl Settings {
    pub fn map_config(&self) -> MapConfig {
        MapConfig {
            cell_size: self.map.cell_size,
            jitter_threshold: self.map.jitter_threshold,
            rope_scan_cells: self.map.rope_scan_cells,
        }
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            cell_size: self.map.cell_size,
            heuristic_weight: self.planner.heuristic_weight,
            max_expansions: self.planner.max_expansions,
            super_cell_size: self.planner.super_cell_size,
            hierarchical_threshold: self.planner.hierarchical_threshold,
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            min_confidence: self.behavior.min_confidence,
            mark_platforms: self.behavior.mark_platforms,
            ..IngestConfig::new(self.collision, self.index)
        }
    }

    pub fn transform(&self) -> anyhow::Result<LinearTransform> {
        let offset = Point2::new(self.source.offset_x, self.source.offset_y);
        Ok(LinearTransform::new(self.source.scale_x, self.source.scale_y, offset)?)
    }
}

/// Builds the settings from `config/default.toml` (if present) overlaid
/// with `PILOT__SECTION__KEY` environment variables.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(DEFAULT_CONFIG_PATH)
}

pub fn load_settings_from(path: &str) -> Result<Settings, ConfigError> {
    info!("Attempting to load configuration from {}", path);

    let settings = Config::builder()
        .add_source(File::new(path, FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix("PILOT").separator("__").try_parsing(true))
        .build()
        .and_then(|config| config.try_deserialize::<Settings>());

    match settings {
        Ok(settings) => {
            info!(?settings, "Successfully loaded configuration");
            Ok(settings)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e)
        }
    }
}
