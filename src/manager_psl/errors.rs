use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum PslError {
    Download(String),
    Dataset(String),
    Io(String),
}

impl Display for PslError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PslError::Download(e) => write!(f, "PslError::Download: {}", e),
            PslError::Dataset(e) => write!(f, "PslError::Dataset: {}", e),
            PslError::Io(e) => write!(f, "PslError::Io: {}", e),
        }
    }
}
impl From<ureq::Error> for PslError {
    fn from(e: ureq::Error) -> Self { PslError::Download(e.to_string()) }
}
impl From<netcdf::Error> for PslError {
    fn from(e: netcdf::Error) -> Self { PslError::Dataset(e.to_string()) }
}
impl From<std::io::Error> for PslError {
    fn from(e: std::io::Error) -> Self { PslError::Io(e.to_string()) }
}
impl From<glob::PatternError> for PslError {
    fn from(e: glob::PatternError) -> Self { PslError::Io(e.to_string()) }
}
