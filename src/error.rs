use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, FiberMeshError>;

#[derive(Debug, Error)]
pub enum FiberMeshError {
    /// Non-physical specimen shape parameters
    #[error("Geometry error: {0}")]
    Geometry(String),
    /// Invalid fiber or material generation parameters
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Target points the interpolation strategy cannot resolve
    #[error("Interpolation error: {0}")]
    Interpolation(String),
    /// Malformed input file
    #[error("Input error: {0}")]
    Input(String),
    #[error("Post Processor error: {0}")]
    PostProcessor(String),
}
