use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::TransferError;
use crate::routing::SearchProfile;

fn default_db_max_size() -> usize {
    // 512 MiB cache budget for the embedded store
    512 * 1024 * 1024
}

fn default_max_matching_dist() -> f64 {
    400.0
}

fn default_max_bus_stop_matching_dist() -> f64 {
    120.0
}

/// defines one transfer precomputation run: input and output paths, the
/// store location, matching radii, and the named pedestrian profiles.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub db_file_path: PathBuf,
    /// in-memory cache budget of the embedded store, in bytes
    #[serde(default = "default_db_max_size")]
    pub db_max_size: usize,

    pub osm_path: PathBuf,
    /// CSV with `name,lat,lng` columns, one row per timetable location
    pub timetable_path: PathBuf,
    pub timetable_dump_path: PathBuf,
    /// street network for router implementations that need one; unused by
    /// the built-in beeline router
    #[serde(default)]
    pub router_graph_path: Option<PathBuf>,

    #[serde(default = "default_max_matching_dist")]
    pub max_matching_dist: f64,
    #[serde(default = "default_max_bus_stop_matching_dist")]
    pub max_bus_stop_matching_dist: f64,

    pub profiles: HashMap<String, SearchProfile>,
}

impl TryFrom<&String> for EngineConfig {
    type Error = TransferError;

    fn try_from(path: &String) -> Result<Self, Self::Error> {
        let extension = Path::new(path).extension().and_then(OsStr::to_str);
        if !matches!(extension, Some("toml") | Some("json")) {
            return Err(TransferError::ConfigurationError(format!(
                "config file {path} must be .toml or .json"
            )));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| TransferError::ConfigurationError(format!("cannot read {path}: {e}")))?;
        if extension == Some("toml") {
            toml::from_str(&contents).map_err(|e| {
                TransferError::ConfigurationError(format!("invalid TOML in {path}: {e}"))
            })
        } else {
            serde_json::from_str(&contents).map_err(|e| {
                TransferError::ConfigurationError(format!("invalid JSON in {path}: {e}"))
            })
        }
    }
}
