use std::path::Path;
use serde::Deserialize;
use crate::errors::PipelineError;

/// A named point to extract data for, as configured by the operator.
/// The row order in the coordinate file is significant and preserved
/// all the way into the report columns.
#[derive(Deserialize, Clone)]
pub struct TargetLocation {
    #[serde(rename = "Location")]
    pub name: String,
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Lon")]
    pub lon: f64,
}

/// Reads the target location list from a csv file with the columns
/// Location, Lat and Lon.
///
/// An absent or unreadable file is a MissingCoordinateFile error, which is
/// persistent across runs and must be surfaced loudly by the caller.
///
/// # Arguments
///
/// * 'target_file' - path to the coordinate csv file
pub fn load_targets(target_file: &str) -> Result<Vec<TargetLocation>, PipelineError> {
    let missing = |e: String| PipelineError::MissingCoordinateFile(format!("{}: {}", target_file, e));

    if !Path::new(target_file).exists() {
        return Err(missing("file not found".to_string()));
    }

    let mut reader = csv::Reader::from_path(target_file).map_err(|e| missing(e.to_string()))?;

    let mut targets: Vec<TargetLocation> = Vec::new();
    for record in reader.deserialize() {
        targets.push(record.map_err(|e| missing(e.to_string()))?);
    }

    if targets.is_empty() {
        return Err(missing("no target locations listed".to_string()));
    }

    Ok(targets)
}
