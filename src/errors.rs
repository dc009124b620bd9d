use thiserror::Error;
use crate::manager_mail::errors::MailError;
use crate::manager_psl::errors::PslError;

/// Stage-scoped error kinds for a pipeline run.
///
/// Every stage failure aborts the current run; nothing is retried in place,
/// the next scheduled trigger is the retry.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("DataSourceError: {0}")]
    DataSource(String),

    #[error("MissingCoordinateFileError: {0}")]
    MissingCoordinateFile(String),

    #[error("EmptyWindowError: {0}")]
    EmptyWindow(String),

    #[error("WriteError: {0}")]
    Write(String),

    #[error("NotifyError: {0}")]
    Notify(String),
}

impl From<PslError> for PipelineError {
    fn from(e: PslError) -> Self {
        PipelineError::DataSource(e.to_string())
    }
}
impl From<MailError> for PipelineError {
    fn from(e: MailError) -> Self {
        PipelineError::Notify(e.to_string())
    }
}
impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Write(e.to_string())
    }
}
impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::Write(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ConfigError::Io: {0}")]
    Io(#[from] std::io::Error),

    #[error("ConfigError::Parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("ConfigError::Invalid: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("InitError::Mail: {0}")]
    Mail(String),

    #[error("InitError::Logging: {0}")]
    Logging(String),
}

impl From<MailError> for InitError {
    fn from(e: MailError) -> Self {
        InitError::Mail(e.to_string())
    }
}
