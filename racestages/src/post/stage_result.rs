use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

/// Name of the results folder inside the user's documents folder.
pub const RESULTS_FOLDER_NAME: &str = "RaceStages";

/// StageResultEntry is one line of a stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResultEntry {
    pub position: usize,
    pub car_idx: usize,
    pub car_number: String,
    pub driver_name: String,
}

/// StageRecord contains the winners of a completed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: usize,
    pub session_unique_id: i64,
    pub entries: Vec<StageResultEntry>,
}

impl StageRecord {
    /// car_indices returns the winners in finishing-position order.
    pub fn car_indices(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.car_idx).collect()
    }

    /// format_block returns the human-readable block that is appended to the results file.
    pub fn format_block(&self) -> anyhow::Result<String> {
        let mut block = String::new();
        write!(&mut block, "Stage {} winners:\r\n\r\n", self.stage)?;

        for entry in self.entries.iter() {
            write!(
                &mut block,
                "P{}: #{} - {}\r\n",
                entry.position, entry.car_number, entry.driver_name
            )?;
        }

        write!(&mut block, "\r\n\r\n")?;
        Ok(block)
    }
}

/// ResultsRecorder persists stage results. Failures are reported to the caller but must never
/// influence the stage detection.
pub trait ResultsRecorder {
    fn record(&mut self, record: &StageRecord) -> anyhow::Result<PathBuf>;
}

/// FileRecorder appends stage results to one text file per race (`<session_unique_id>.txt`).
#[derive(Debug, Clone)]
pub struct FileRecorder {
    dir: PathBuf,
}

impl FileRecorder {
    pub fn new(dir: &Path) -> FileRecorder {
        FileRecorder {
            dir: dir.to_path_buf(),
        }
    }

    /// default_dir returns the results folder inside the documents folder (home folder if the
    /// platform has no documents folder).
    pub fn default_dir() -> PathBuf {
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(RESULTS_FOLDER_NAME)
    }

    pub fn results_path(&self, session_unique_id: i64) -> PathBuf {
        self.dir.join(format!("{}.txt", session_unique_id))
    }
}

impl ResultsRecorder for FileRecorder {
    fn record(&mut self, record: &StageRecord) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .context(format!("Failed to create results folder {:?}!", self.dir))?;

        let out_path = self.results_path(record.session_unique_id);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&out_path)
            .context(format!("Failed to open results file {:?}!", out_path))?;
        file.write_all(record.format_block()?.as_bytes())?;
        file.flush()?;

        info!("Stage {} winners written to {:?}", record.stage, out_path);
        Ok(out_path)
    }
}
