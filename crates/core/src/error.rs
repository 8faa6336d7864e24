/// Result alias that carries the custom [`PulseError`] type.
pub type Result<T> = std::result::Result<T, PulseError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// A playback operation was requested while no buffer is loaded.
    #[error("no audio buffer is loaded")]
    NoBufferLoaded,
    /// The decoder rejected the supplied bytes.
    #[error("failed to decode audio: {0}")]
    Decode(String),
    /// The output primitive refused a request, e.g. the device failed to start.
    #[error("output device error: {0}")]
    Device(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Free-form message for errors that do not fit another variant.
    #[error("{0}")]
    Message(String),
}

impl PulseError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn device<T: Into<String>>(msg: T) -> Self {
        Self::Device(msg.into())
    }
}

impl From<&str> for PulseError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PulseError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<hound::Error> for PulseError {
    fn from(value: hound::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
