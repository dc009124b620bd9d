use std::fs;
use std::path::Path;
use chrono::{DateTime, Utc};
use crate::errors::PipelineError;

/// Keeper of the single piece of durable run state: the dataset timestamp
/// of the last successfully processed run, stored as RFC 3339 text.
pub struct StateTracker {
    state_file: String,
}

impl StateTracker {
    pub fn new(state_file: &str) -> StateTracker {
        StateTracker { state_file: state_file.to_string() }
    }

    /// Returns the timestamp of the last successful run.
    ///
    /// A missing state file loads as the Unix epoch so any real dataset
    /// timestamp counts as newer. A present but unparsable file is an
    /// error - the previous commit was broken and silently restarting from
    /// the epoch would re-deliver old data.
    pub fn load_previous(&self) -> Result<DateTime<Utc>, PipelineError> {
        let path = Path::new(&self.state_file);
        if !path.exists() {
            return Ok(DateTime::UNIX_EPOCH);
        }

        let text = fs::read_to_string(path)?;
        text.trim()
            .parse::<DateTime<Utc>>()
            .map_err(|e| PipelineError::Write(format!("corrupt state marker {}: {}", self.state_file, e)))
    }

    /// Durably records the given timestamp as processed.
    ///
    /// Written to a temporary file and renamed into place, so a subsequent
    /// load never observes a partial marker. Called exactly once per
    /// successful run, as its final step.
    ///
    /// # Arguments
    ///
    /// * 'timestamp' - the dataset timestamp the finished run was based on
    pub fn commit(&self, timestamp: DateTime<Utc>) -> Result<(), PipelineError> {
        if let Some(dir) = Path::new(&self.state_file).parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let tmp_path = format!("{}.tmp", self.state_file);
        fs::write(&tmp_path, timestamp.to_rfc3339())?;
        fs::rename(&tmp_path, &self.state_file)?;

        Ok(())
    }
}
