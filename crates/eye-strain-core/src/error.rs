use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
    #[error("landmark index {index} out of range for {len} landmarks")]
    LandmarkIndexOutOfRange { index: usize, len: usize },
    #[error("odd number of landmark coordinates: {0}")]
    OddCoordinateCount(usize),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("session already stopped")]
    SessionStopped,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("report is not valid utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("failed to flush csv writer: {0}")]
    Flush(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
