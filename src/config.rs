use std::fs;
use log::LevelFilter;
use serde::Deserialize;
use crate::errors::ConfigError;

#[derive(Deserialize)]
pub struct DatasetParameters {
    /// URL or local path, `{year}` is replaced with the current UTC year
    pub source: String,
    pub variable: String,
    pub extracted_days: usize,
    pub timeout_secs: u64,
    pub retention_hours: i64,
}

#[derive(Deserialize)]
pub struct Files {
    pub target_file: String,
    pub output_file: String,
    pub state_file: String,
    pub work_dir: String,
}

#[derive(Deserialize)]
pub struct MailParameters {
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_endpoint: String,
    pub from: String,
    pub recipients: Vec<String>,
}

#[derive(Deserialize)]
pub struct ScheduleParameters {
    pub interval_minutes: u64,
    pub misfire_grace_secs: u64,
}

#[derive(Deserialize)]
pub struct General {
    pub log_path: String,
    pub log_level: LevelFilter,
    pub log_to_stdout: bool,
}

#[derive(Deserialize)]
pub struct Config {
    pub dataset: DatasetParameters,
    pub files: Files,
    pub mail: MailParameters,
    pub schedule: ScheduleParameters,
    pub general: General,
}

/// Loads the configuration file and returns a struct with all configuration items
///
/// # Arguments
///
/// * 'config_path' - path to the configuration file
pub fn load_config(config_path: &str) -> Result<Config, ConfigError> {

    let toml = fs::read_to_string(config_path)?;
    let config: Config = toml::from_str(&toml)?;

    if config.dataset.extracted_days == 0 {
        return Err(ConfigError::Invalid("extracted_days must be at least 1".to_string()));
    }
    if config.schedule.interval_minutes == 0 {
        return Err(ConfigError::Invalid("interval_minutes must be at least 1".to_string()));
    }
    if config.mail.recipients.is_empty() {
        return Err(ConfigError::Invalid("at least one mail recipient is required".to_string()));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [dataset]
        source = "https://downloads.psl.noaa.gov/Datasets/cpc_global_precip/precip.{year}.nc"
        variable = "precip"
        extracted_days = 30
        timeout_secs = 120
        retention_hours = 48

        [files]
        target_file = "data/target_coords.csv"
        output_file = "data/precip_report.csv"
        state_file = "data/prev_time.txt"
        work_dir = "data/downloads/"

        [mail]
        smtp_user = "user"
        smtp_password = "secret"
        smtp_endpoint = "smtp.example.com"
        from = "pluvio <pluvio@example.com>"
        recipients = ["ops@example.com"]

        [schedule]
        interval_minutes = 360
        misfire_grace_secs = 300

        [general]
        log_path = "log/pluvio.log"
        log_level = "info"
        log_to_stdout = true
    "#;

    #[test]
    fn parses_sample_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pluvio.toml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.dataset.variable, "precip");
        assert_eq!(config.dataset.extracted_days, 30);
        assert_eq!(config.mail.recipients.len(), 1);
        assert_eq!(config.general.log_level, LevelFilter::Info);
    }

    #[test]
    fn rejects_zero_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pluvio.toml");
        fs::write(&path, SAMPLE.replace("extracted_days = 30", "extracted_days = 0")).unwrap();

        assert!(matches!(
            load_config(path.to_str().unwrap()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
