use std::fs;
use std::path::{Path, PathBuf};

use pilot_geometry::Point2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::grid::{CellRecord, GridCell};
use super::world::{MapConfig, ObjectRecord, WorldMap};
use crate::error::NavigationError;

/// Artifact format version written by [`MapStore::save`].
pub const MAP_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CellEntry {
    cell: GridCell,
    #[serde(flatten)]
    record: CellRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectEntry {
    cell: GridCell,
    #[serde(flatten)]
    record: ObjectRecord,
}

/// On-disk form of a [`WorldMap`]. JSON object keys must be strings, so the
/// cell-keyed maps are stored as entry lists.
#[derive(Debug, Serialize, Deserialize)]
struct MapArtifact {
    version: u32,
    map_id: String,
    cell_size: f64,
    grid: Vec<CellEntry>,
    player_positions: Vec<Point2>,
    portals: Vec<ObjectEntry>,
    ropes: Vec<ObjectEntry>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Directory of per-map JSON artifacts, one `<map_id>.json` per map.
#[derive(Debug, Clone)]
pub struct MapStore {
    dir: PathBuf,
}

impl MapStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, map_id: &str) -> PathBuf {
        self.dir.join(format!("{map_id}.json"))
    }

    /// Writes `world` under `map_id`, replacing any previous artifact.
    ///
    /// The file is written next to its final name and renamed into place so a
    /// crash mid-write leaves the previous save intact.
    pub fn save(&self, map_id: &str, world: &WorldMap) -> Result<PathBuf, NavigationError> {
        fs::create_dir_all(&self.dir)?;

        let mut grid: Vec<CellEntry> = world
            .grid
            .iter()
            .map(|(cell, record)| CellEntry { cell: *cell, record: *record })
            .collect();
        grid.sort_by_key(|e| e.cell);

        let artifact = MapArtifact {
            version: MAP_FORMAT_VERSION,
            map_id: map_id.to_string(),
            cell_size: world.config.cell_size,
            grid,
            player_positions: world.history.clone(),
            portals: object_entries(&world.portals),
            ropes: object_entries(&world.ropes),
        };

        let path = self.path_for(map_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&artifact)?)?;
        fs::rename(&tmp, &path)?;

        info!(map_id, cells = artifact.grid.len(), path = %path.display(), "map saved");
        Ok(path)
    }

    /// Loads `map_id` into a fresh map built with `config`.
    ///
    /// A missing artifact is not an error: the result is an empty map tagged
    /// with `map_id`. An artifact recorded at a different cell size cannot be
    /// reinterpreted and is rejected with
    /// [`NavigationError::CellSizeMismatch`], leaving it untouched on disk.
    pub fn load(&self, map_id: &str, config: MapConfig) -> Result<WorldMap, NavigationError> {
        let mut world = WorldMap::new(config)?;
        world.set_map_id(map_id);

        let path = self.path_for(map_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(map_id, "no saved map, starting empty");
                return Ok(world);
            }
            Err(e) => return Err(e.into()),
        };

        let probe: VersionProbe = serde_json::from_slice(&bytes)?;
        if probe.version != MAP_FORMAT_VERSION {
            return Err(NavigationError::UnsupportedVersion {
                found: probe.version,
                expected: MAP_FORMAT_VERSION,
            });
        }
        let artifact: MapArtifact = serde_json::from_slice(&bytes)?;

        if artifact.cell_size != config.cell_size {
            warn!(
                map_id,
                saved = artifact.cell_size,
                configured = config.cell_size,
                "saved map uses a different cell size"
            );
            return Err(NavigationError::CellSizeMismatch {
                map_id: map_id.to_string(),
                saved: artifact.cell_size,
                configured: config.cell_size,
            });
        }

        world.grid = artifact.grid.into_iter().map(|e| (e.cell, e.record)).collect();
        world.history = artifact.player_positions;
        world.portals = artifact.portals.into_iter().map(|e| (e.cell, e.record)).collect();
        world.ropes = artifact.ropes.into_iter().map(|e| (e.cell, e.record)).collect();

        info!(map_id, cells = world.len(), "map loaded");
        Ok(world)
    }
}

fn object_entries(objects: &std::collections::HashMap<GridCell, ObjectRecord>) -> Vec<ObjectEntry> {
    let mut entries: Vec<ObjectEntry> = objects
        .iter()
        .map(|(cell, record)| ObjectEntry { cell: *cell, record: record.clone() })
        .collect();
    entries.sort_by_key(|e| e.cell);
    entries
}
