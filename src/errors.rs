use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for organoid analysis
#[derive(Error, Debug)]
pub enum OrganoidError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Missing required config keys: {0:?}")]
    MissingConfigKeys(Vec<String>),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Unsupported model type: {0}")]
    UnsupportedModelType(String),

    #[error("No checkpoints found in {0}")]
    NoCheckpointFound(PathBuf),

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("No labeled region found in mask")]
    NoRegionFound,

    #[error("Invalid mask dimensionality: expected 2 or 3, got {0}")]
    InvalidDimensionality(usize),

    #[error("Insufficient data points: need at least {required}, got {actual}")]
    InsufficientDataPoints { required: usize, actual: usize },

    #[error("Segmentation error: {0}")]
    Segmentation(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, OrganoidError>;
