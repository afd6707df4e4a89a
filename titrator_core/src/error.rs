use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TitratorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for probe")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing wave device")]
    MissingWaveDevice,
    #[error("missing axis pins")]
    MissingPins,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
