use thiserror::Error;

/// Result type for shade operations
pub type Result<T> = std::result::Result<T, ShadeError>;

/// Errors that can occur when talking to a Lutron processor
#[derive(Error, Debug)]
pub enum ShadeError {
    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed inbound protocol line
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Target position outside the 0-100 range
    #[error("Invalid position: {0}")]
    InvalidPosition(i64),

    /// Target tilt angle outside the -90..90 degree range
    #[error("Invalid tilt angle: {0}")]
    InvalidTiltAngle(i64),

    /// Tilt command issued against a shade kind without tilt support
    #[error("Shade does not support tilt")]
    TiltNotSupported,

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
