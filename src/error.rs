//! Error types for the simulator.
//!
//! Errors fall into the categories the protocol dictates: transport
//! failures close a connection, out-of-range store accesses become
//! exception responses, and configuration problems are reported before
//! the server starts.

use thiserror::Error;

/// Result type alias for simulator operations
pub type ModsimResult<T> = Result<T, ModsimError>;

/// Error type covering transport, framing, store and configuration failures
#[derive(Error, Debug, Clone)]
pub enum ModsimError {
    /// I/O related errors (socket read/write, file access)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Connection establishment and lifecycle errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Message frame format violations
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// A register access outside the configured bank bounds
    ///
    /// Maps to Modbus exception 0x02 (Illegal Data Address) when the
    /// access originates from a client request.
    #[error("Out of range access: start={start}, count={count}")]
    OutOfRange { start: u16, count: u16 },

    /// A request field outside its legal range
    ///
    /// Maps to Modbus exception 0x03 (Illegal Data Value).
    #[error("Illegal value: {message}")]
    IllegalValue { message: String },

    /// Configuration errors, rejected before the server starts
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModsimError {
    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame { message: message.into() }
    }

    /// Create an out-of-range error for the span `[start, start+count)`
    pub fn out_of_range(start: u16, count: u16) -> Self {
        Self::OutOfRange { start, count }
    }

    /// Create an illegal value error
    pub fn illegal_value<S: Into<String>>(message: S) -> Self {
        Self::IllegalValue { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Check if the error is a network/transport issue
    ///
    /// Transport errors close the offending connection and are never
    /// reported to the peer.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Connection { .. })
    }
}

impl From<std::io::Error> for ModsimError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for ModsimError {
    fn from(err: serde_json::Error) -> Self {
        Self::configuration(format!("JSON error: {}", err))
    }
}
