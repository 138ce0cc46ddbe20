//! Core error types and result handling
//!
//! A single crate-wide error enum covering transport, framing and protocol
//! failures. Framing errors are connection-fatal; protocol errors are
//! answered on the wire with an exception PDU and never surface here.

use thiserror::Error;

/// Result type used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Modbus server error
#[derive(Error, Debug)]
pub enum ModbusError {
    /// Connection-level failure (bind, accept, read, write)
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Malformed MBAP frame; terminates the connection
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Protocol-level violation (PDU construction, state errors)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Data failed validation
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Unsupported or unknown function code
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Bad server configuration (addresses, block layout)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Underlying socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModbusError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an invalid function error
    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error should terminate the connection it occurred on
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Frame { .. } | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModbusError::invalid_function(0x2B);
        assert_eq!(err.to_string(), "Invalid function code: 0x2B");

        let err = ModbusError::frame("declared length 0");
        assert_eq!(err.to_string(), "Frame error: declared length 0");
    }

    #[test]
    fn test_connection_fatal_classification() {
        assert!(ModbusError::frame("bad protocol id").is_connection_fatal());
        assert!(ModbusError::connection("reset by peer").is_connection_fatal());
        assert!(!ModbusError::invalid_function(0x2B).is_connection_fatal());
        assert!(!ModbusError::invalid_data("quantity 0").is_connection_fatal());
    }
}
