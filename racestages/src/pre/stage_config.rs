use helpers::general::parse_or_default;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

pub const NUM_STAGES: usize = 3;

/// Lap counts used if a stage lap count input is missing or invalid. The third stage is skipped by
/// default.
pub const DEFAULT_STAGE_LAP_COUNTS: [u32; NUM_STAGES] = [30, 30, 0];

pub const DEFAULT_NUM_CARS_TO_WAIT_FOR: usize = 10;

/// Inputs are limited to three digits.
pub const MAX_INPUT_VALUE: u32 = 999;

/// * `stage_lap_counts` - Laps of each stage (0 skips the stage)
/// * `num_cars_to_wait_for` - Number of cars that must complete a stage before it is closed
/// * `throw_caution` - Throw a caution flag on stage completion instead of only announcing it
/// * `auto_terminate` - Stop the session once the final stage is done and all messages are sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStageConfig")]
pub struct StageConfig {
    pub stage_lap_counts: [u32; NUM_STAGES],
    pub num_cars_to_wait_for: usize,
    pub throw_caution: bool,
    pub auto_terminate: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            stage_lap_counts: DEFAULT_STAGE_LAP_COUNTS,
            num_cars_to_wait_for: DEFAULT_NUM_CARS_TO_WAIT_FOR,
            throw_caution: true,
            auto_terminate: true,
        }
    }
}

impl StageConfig {
    /// stage_lap_count returns the laps of the given stage (0-based), 0 for unknown stages.
    pub fn stage_lap_count(&self, stage: usize) -> u32 {
        self.stage_lap_counts.get(stage).copied().unwrap_or(0)
    }

    /// target_lap returns the laps-completed count a car needs to finish the given stage, i.e. the
    /// lap counts of all stages up to and including it.
    pub fn target_lap(&self, stage: usize) -> i32 {
        self.stage_lap_counts
            .iter()
            .take(stage + 1)
            .map(|&laps| laps as i32)
            .sum()
    }

    pub fn set_stage_lap_count_text(&mut self, stage: usize, text: &str) {
        if stage < NUM_STAGES {
            self.stage_lap_counts[stage] = parse_lap_count(text, stage);
        }
    }

    pub fn set_num_cars_to_wait_for_text(&mut self, text: &str) {
        self.num_cars_to_wait_for = parse_num_cars_to_wait_for(text);
    }
}

/// parse_lap_count parses a stage lap count input, falling back to the stage default.
pub fn parse_lap_count(text: &str, stage: usize) -> u32 {
    let default = DEFAULT_STAGE_LAP_COUNTS.get(stage).copied().unwrap_or(0);
    parse_or_default(text, default, |&laps| laps <= MAX_INPUT_VALUE)
}

/// parse_num_cars_to_wait_for parses the winner count input, falling back to the default for
/// invalid or zero values.
pub fn parse_num_cars_to_wait_for(text: &str) -> usize {
    parse_or_default(text, DEFAULT_NUM_CARS_TO_WAIT_FOR, |&cars| {
        cars >= 1 && cars <= MAX_INPUT_VALUE as usize
    })
}

/// RawStageConfig accepts numbers as well as free text for the numeric inputs.
#[derive(Debug, Deserialize)]
struct RawStageConfig {
    #[serde(default)]
    stage_lap_counts: Vec<Value>,
    #[serde(default)]
    num_cars_to_wait_for: Value,
    #[serde(default = "default_true")]
    throw_caution: bool,
    #[serde(default = "default_true")]
    auto_terminate: bool,
}

fn default_true() -> bool {
    true
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.to_owned(),
        _ => String::new(),
    }
}

impl From<RawStageConfig> for StageConfig {
    fn from(raw: RawStageConfig) -> Self {
        let mut config = StageConfig {
            throw_caution: raw.throw_caution,
            auto_terminate: raw.auto_terminate,
            ..StageConfig::default()
        };

        for (stage, value) in raw.stage_lap_counts.iter().take(NUM_STAGES).enumerate() {
            config.set_stage_lap_count_text(stage, &value_as_text(value));
        }
        config.set_num_cars_to_wait_for_text(&value_as_text(&raw.num_cars_to_wait_for));

        config
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open stage config file {path:?}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse stage config file {path:?}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// read_stage_config reads the JSON file and decodes it into the stage configuration.
pub fn read_stage_config(filepath: &Path) -> Result<StageConfig, ConfigError> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .map_err(|source| ConfigError::Open {
            path: filepath.to_path_buf(),
            source,
        })?;
    serde_json::from_reader(&fh).map_err(|source| ConfigError::Parse {
        path: filepath.to_path_buf(),
        source,
    })
}

/// ConfigSource delivers the configuration that is valid for the current tick.
pub trait ConfigSource {
    fn current(&mut self) -> StageConfig;
}

impl ConfigSource for StageConfig {
    fn current(&mut self) -> StageConfig {
        self.clone()
    }
}

/// WatchedConfigFile re-reads a stage config file whenever its modification time changes. If the
/// file cannot be read or parsed, the last good configuration stays active.
#[derive(Debug)]
pub struct WatchedConfigFile {
    path: PathBuf,
    modified: Option<SystemTime>,
    config: StageConfig,
}

impl WatchedConfigFile {
    pub fn open(path: &Path) -> Result<WatchedConfigFile, ConfigError> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let config = read_stage_config(path)?;

        Ok(WatchedConfigFile {
            path: path.to_path_buf(),
            modified,
            config,
        })
    }
}

impl ConfigSource for WatchedConfigFile {
    fn current(&mut self) -> StageConfig {
        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();

        if modified.is_some() && modified != self.modified {
            self.modified = modified;

            match read_stage_config(&self.path) {
                Ok(config) => {
                    info!("Reloaded stage config {:?}: {:?}", self.path, config);
                    self.config = config;
                }
                Err(e) => warn!("{}, keeping previous stage config", e),
            }
        }

        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_lap_accumulates_stages() {
        let config = StageConfig {
            stage_lap_counts: [20, 25, 30],
            ..StageConfig::default()
        };
        assert_eq!(config.target_lap(0), 20);
        assert_eq!(config.target_lap(1), 45);
        assert_eq!(config.target_lap(2), 75);
    }

    #[test]
    fn invalid_text_falls_back_to_defaults() {
        assert_eq!(parse_lap_count("abc", 0), 30);
        assert_eq!(parse_lap_count("1234", 1), 30);
        assert_eq!(parse_lap_count("", 2), 0);
        assert_eq!(parse_lap_count("0", 0), 0);
        assert_eq!(parse_lap_count("45", 0), 45);

        assert_eq!(parse_num_cars_to_wait_for("0"), DEFAULT_NUM_CARS_TO_WAIT_FOR);
        assert_eq!(parse_num_cars_to_wait_for("-3"), DEFAULT_NUM_CARS_TO_WAIT_FOR);
        assert_eq!(parse_num_cars_to_wait_for("5"), 5);
    }

    #[test]
    fn json_accepts_numbers_and_text() {
        let config: StageConfig = serde_json::from_str(
            r#"{"stage_lap_counts": [15, "20", "x"], "num_cars_to_wait_for": "3", "throw_caution": false}"#,
        )
        .unwrap();

        assert_eq!(config.stage_lap_counts, [15, 20, 0]);
        assert_eq!(config.num_cars_to_wait_for, 3);
        assert!(!config.throw_caution);
        assert!(config.auto_terminate);
    }

    #[test]
    fn watched_file_reloads_and_keeps_last_good_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stages.json");
        std::fs::write(&path, r#"{"stage_lap_counts": [5, 5, 5]}"#).unwrap();

        let mut source = WatchedConfigFile::open(&path).unwrap();
        assert_eq!(source.current().stage_lap_counts, [5, 5, 5]);

        let touch = |secs: u64| {
            let fh = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            fh.set_modified(SystemTime::now() + std::time::Duration::from_secs(secs))
                .unwrap();
        };

        std::fs::write(&path, r#"{"num_cars_to_wait_for": 4}"#).unwrap();
        touch(10);
        let config = source.current();
        assert_eq!(config.stage_lap_counts, DEFAULT_STAGE_LAP_COUNTS);
        assert_eq!(config.num_cars_to_wait_for, 4);

        std::fs::write(&path, "{ broken").unwrap();
        touch(20);
        assert_eq!(source.current().num_cars_to_wait_for, 4);
    }

    #[test]
    fn missing_config_file_is_an_open_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = read_stage_config(&tmp.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Open { .. })));
    }

    #[test]
    fn empty_json_is_default() {
        let config: StageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StageConfig::default());
    }
}
