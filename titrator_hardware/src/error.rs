use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("probe timeout")]
    Timeout,
    #[error("wave buffer full ({0} pulses pending)")]
    WaveBufferFull(usize),
    #[error("no wave under construction")]
    NoWave,
    #[error("unknown wave id {0}")]
    UnknownWave(u32),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
