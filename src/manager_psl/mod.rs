pub mod errors;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use glob::glob;
use log::{info, warn};
use ureq::Agent;

use crate::errors::PipelineError;
use crate::manager_psl::errors::PslError;
use crate::orchestrator::{DatasetHandle, DatasetSource};

/// Names tried when looking up the coordinate variables
const LAT_NAMES: [&str; 2] = ["lat", "latitude"];
const LON_NAMES: [&str; 2] = ["lon", "longitude"];
const TIME_NAME: &str = "time";

/// A trailing time window cut from the gridded dataset.
///
/// The window is an immutable value: coordinate axes plus the data values
/// in time-major order, so each pipeline stage downstream of the reader can
/// be tested without touching a NetCDF file.
pub struct WindowedDataset {
    pub times: Vec<DateTime<Utc>>,
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
    /// Data values, index = (t * lats.len() + i) * lons.len() + j
    pub values: Vec<f64>,
    pub fill_value: Option<f64>,
}

impl WindowedDataset {
    /// Returns the value for a (time, lat, lon) index triple, or None when
    /// the cell holds the fill value or is not finite
    pub fn value_at(&self, t: usize, i: usize, j: usize) -> Option<f64> {
        let v = *self.values.get((t * self.lats.len() + i) * self.lons.len() + j)?;
        if !v.is_finite() {
            return None;
        }
        if self.fill_value.is_some_and(|f| v == f || (v - f).abs() <= f.abs() * 1e-6) {
            return None;
        }
        Some(v)
    }
}

/// Struct for managing the gridded precipitation datasets published by NOAA PSL
pub struct Psl {
    agent: Agent,
    source: String,
    variable: String,
    work_dir: String,
    retention_hours: i64,
}

impl Psl {
    /// Returns a Psl struct ready for fetching datasets
    ///
    /// # Arguments
    ///
    /// * 'source' - dataset URL or local path, `{year}` resolves to the current UTC year
    /// * 'variable' - name of the gridded data variable, e.g. "precip"
    /// * 'work_dir' - directory where downloaded files are held
    /// * 'timeout_secs' - global timeout for the download request
    /// * 'retention_hours' - age after which downloaded files are removed
    pub fn new(source: &str, variable: &str, work_dir: &str, timeout_secs: u64, retention_hours: i64) -> Psl {
        let config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(timeout_secs)))
            .build();

        let agent = config.into();

        Psl {
            agent,
            source: source.to_string(),
            variable: variable.to_string(),
            work_dir: work_dir.to_string(),
            retention_hours,
        }
    }

    fn resolved_source(&self) -> String {
        self.source.replace("{year}", &Utc::now().year().to_string())
    }

    /// Makes the dataset available as a local NetCDF file.
    ///
    /// Remote sources are downloaded into the work directory, local paths
    /// are used as-is. A failed or timed out download aborts the run.
    fn fetch(&self) -> Result<PathBuf, PslError> {
        let source = self.resolved_source();

        if !source.starts_with("http") {
            let path = PathBuf::from(&source);
            return if path.exists() {
                Ok(path)
            } else {
                Err(PslError::Dataset(format!("dataset file not found: {}", source)))
            };
        }

        if let Err(e) = self.cleanup_downloads() {
            warn!("could not clean up old downloads: {}", e);
        }

        fs::create_dir_all(&self.work_dir)?;

        let file_name = source.rsplit('/').next().unwrap_or("dataset.nc");
        let file_path = Path::new(&self.work_dir)
            .join(format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S"), file_name));

        info!("downloading {}", source);
        let mut res = self.agent.get(source.as_str()).call()?;
        let mut reader = res.body_mut().as_reader();
        let mut file = fs::File::create(&file_path)?;
        io::copy(&mut reader, &mut file)?;

        Ok(file_path)
    }

    /// Removes downloaded dataset files older than the retention period
    fn cleanup_downloads(&self) -> Result<(), PslError> {
        let pattern = format!("{}*.nc", self.work_dir);
        for entry in glob(&pattern)? {
            if let Ok(path) = entry {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.len() < 14 {
                        continue;
                    }
                    if let Ok(dt) = NaiveDateTime::parse_from_str(&name[0..14], "%Y%m%d%H%M%S") {
                        if Utc::now() - dt.and_utc() > TimeDelta::hours(self.retention_hours) {
                            fs::remove_file(&path)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl DatasetSource for Psl {
    fn open(&self) -> Result<Box<dyn DatasetHandle>, PipelineError> {
        let path = self.fetch()?;
        let file = netcdf::open(&path).map_err(PslError::from)?;
        let times = read_time_axis(&file)?;
        let latest = *times
            .last()
            .ok_or_else(|| PslError::Dataset(format!("time axis is empty in {}", path.display())))?;

        info!("dataset {} holds {} timestamps, latest {}", path.display(), times.len(), latest);

        Ok(Box::new(PslDataset {
            file,
            path,
            variable: self.variable.clone(),
            times,
            latest,
        }))
    }
}

/// An opened dataset file with its decoded time axis
pub struct PslDataset {
    file: netcdf::File,
    path: PathBuf,
    variable: String,
    times: Vec<DateTime<Utc>>,
    latest: DateTime<Utc>,
}

impl DatasetHandle for PslDataset {
    fn latest_timestamp(&self) -> DateTime<Utc> {
        self.latest
    }

    fn window(&self, days: usize) -> Result<WindowedDataset, PipelineError> {
        if days == 0 || self.times.is_empty() {
            return Err(PipelineError::EmptyWindow(format!(
                "a {} day window of {} holds no timestamps", days, self.path.display()
            )));
        }

        Ok(self.read_window(days)?)
    }
}

impl PslDataset {
    /// Reads the trailing window of the data variable together with its
    /// coordinate axes
    ///
    /// # Arguments
    ///
    /// * 'days' - number of trailing time steps to read
    fn read_window(&self, days: usize) -> Result<WindowedDataset, PslError> {
        let var = self.file.variable(&self.variable).ok_or_else(|| {
            PslError::Dataset(format!("variable {} missing in {}", self.variable, self.path.display()))
        })?;

        let dims = var.dimensions();
        if dims.len() != 3 || dims[0].name() != TIME_NAME {
            return Err(PslError::Dataset(format!(
                "variable {} is not laid out as (time, lat, lon)", self.variable
            )));
        }

        let lats = coord_values(&self.file, &LAT_NAMES)?;
        let lons = coord_values(&self.file, &LON_NAMES)?;
        if dims[1].len() != lats.len() || dims[2].len() != lons.len() {
            return Err(PslError::Dataset(format!(
                "coordinate axes do not match the shape of {}", self.variable
            )));
        }

        let tlen = self.times.len();
        let n = days.min(tlen);
        let start = tlen - n;

        let values = var.get_values::<f64, _>((start..tlen, 0..lats.len(), 0..lons.len()))?;

        Ok(WindowedDataset {
            times: self.times[start..].to_vec(),
            lats,
            lons,
            values,
            fill_value: fill_value(&var),
        })
    }
}

/// Decodes the CF style time axis ("<unit> since <origin>") to UTC timestamps
fn read_time_axis(file: &netcdf::File) -> Result<Vec<DateTime<Utc>>, PslError> {
    let var = file
        .variable(TIME_NAME)
        .ok_or_else(|| PslError::Dataset("time variable missing".to_string()))?;

    let units = attr_string(&var, "units")
        .ok_or_else(|| PslError::Dataset("time variable has no units attribute".to_string()))?;
    let (unit_secs, origin) = parse_time_units(&units)?;

    let raw = var.get_values::<f64, _>(..)?;
    Ok(raw
        .iter()
        .map(|v| origin + TimeDelta::seconds((v * unit_secs as f64).round() as i64))
        .collect())
}

/// Splits a CF time units string into seconds-per-step and the origin timestamp
///
/// # Arguments
///
/// * 'units' - the units attribute, e.g. "hours since 1800-01-01 00:00:0.0"
fn parse_time_units(units: &str) -> Result<(i64, DateTime<Utc>), PslError> {
    let mut parts = units.splitn(2, " since ");
    let unit = parts.next().unwrap_or("").trim().to_lowercase();
    let origin = parts
        .next()
        .ok_or_else(|| PslError::Dataset(format!("unsupported time units: {}", units)))?
        .trim();

    let unit_secs = match unit.as_str() {
        "days" | "day" => 86_400,
        "hours" | "hour" => 3_600,
        "minutes" | "minute" => 60,
        "seconds" | "second" => 1,
        _ => return Err(PslError::Dataset(format!("unsupported time unit: {}", unit))),
    };

    Ok((unit_secs, parse_origin(origin)?))
}

fn parse_origin(s: &str) -> Result<DateTime<Utc>, PslError> {
    // PSL writes origins like "1800-1-1 00:00:0.0"
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_time(NaiveTime::MIN).and_utc());
    }

    Err(PslError::Dataset(format!("unparsable time origin: {}", s)))
}

/// Returns the values of the first coordinate variable found under the given names
fn coord_values(file: &netcdf::File, names: &[&str]) -> Result<Vec<f64>, PslError> {
    for name in names {
        if let Some(var) = file.variable(name) {
            return Ok(var.get_values::<f64, _>(..)?);
        }
    }

    Err(PslError::Dataset(format!("coordinate variable missing, tried {:?}", names)))
}

fn attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value() {
        Ok(netcdf::AttributeValue::Str(s)) => Some(s),
        Ok(netcdf::AttributeValue::Strs(s)) => s.first().cloned(),
        _ => None,
    }
}

fn fill_value(var: &netcdf::Variable) -> Option<f64> {
    for name in ["missing_value", "_FillValue"] {
        if let Some(attr) = var.attribute(name) {
            let value = match attr.value() {
                Ok(netcdf::AttributeValue::Float(v)) => Some(v as f64),
                Ok(netcdf::AttributeValue::Double(v)) => Some(v),
                Ok(netcdf::AttributeValue::Floats(v)) => v.first().map(|f| *f as f64),
                Ok(netcdf::AttributeValue::Doubles(v)) => v.first().copied(),
                _ => None,
            };
            if value.is_some() {
                return value;
            }
        }
    }

    None
}
