/// Result alias that carries the custom [`DmxError`] type.
pub type Result<T> = std::result::Result<T, DmxError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum DmxError {
    /// Free-form failure reported by a subsystem.
    #[error("{0}")]
    Message(String),
    /// Input rejected before it reached any device or buffer.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed scene, sequence or configuration file.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// The serial link could not be opened or configured.
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
    /// The audio input device failed or is unavailable.
    #[error("audio device: {0}")]
    Audio(String),
}

impl DmxError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn audio<T: Into<String>>(msg: T) -> Self {
        Self::Audio(msg.into())
    }
}

impl From<&str> for DmxError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for DmxError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
