use thiserror::Error;

/// Structural failures that abort a reconciliation run
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Header line has no column names")]
    EmptyHeader,

    #[error("No <pre> table found in HTML document")]
    NoTableFound,

    #[error("Invalid CSS selector: {0}")]
    Selector(String),

    #[error("No identifier column found in source '{source_label}'")]
    JoinColumnUnresolved { source_label: String },

    #[error("Identifier column '{column}' not present in source '{source_label}'")]
    UnknownIdColumn { source_label: String, column: String },

    #[error("No text supplied for source '{source_label}'")]
    MissingSourceText { source_label: String },

    #[error("Pipeline '{pipeline}' needs an API key for per-object TLE requests")]
    MissingApiKey { pipeline: String },

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Failure of the transport collaborator
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A raw identifier that cannot be turned into a catalog number.
/// Recoverable: the record is kept with status UNKNOWN.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("identifier is empty")]
    Empty,

    #[error("no digits in identifier '{0}'")]
    NoDigits(String),

    #[error("identifier '{0}' does not fit a catalog number")]
    OutOfRange(String),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
