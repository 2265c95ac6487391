use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalanceAnalysisError {
    #[error("Unrecognized period column '{label}': expected '<month> <year>' or 'YYYY-MM'")]
    ColumnFormat { label: String },

    #[error("Ambiguous period: month {month} of {year} appears in several columns ({})", labels.join(", "))]
    AmbiguousPeriod {
        year: i32,
        month: u32,
        labels: Vec<String>,
    },

    #[error("Variation for account {account} ({base} -> {compare}) is not computable")]
    NotComputableVariation {
        account: String,
        base: String,
        compare: String,
    },

    #[error("Duplicate account code {0}: only the first row is analysed")]
    DuplicateAccount(String),

    #[error("External text generator failed: {0}")]
    ExternalGeneratorFailure(String),

    #[error("External text generator timed out after {0:?}")]
    ExternalGeneratorTimeout(Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl BalanceAnalysisError {
    /// Errors the pipeline recovers from locally instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            BalanceAnalysisError::InvalidConfig(_)
                | BalanceAnalysisError::SerializationError(_)
                | BalanceAnalysisError::IoError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BalanceAnalysisError>;
