//! Error types for polling, decoding and logging.

use std::io;
use thiserror::Error;

use crate::descriptor::ElementType;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that can occur while talking to a device or logging its data.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The device could not be reached.
    #[error("Connection to {target} failed: {reason}")]
    Connection {
        /// Address that was dialled.
        target: String,
        /// Why the connection attempt failed.
        reason: String,
    },

    /// A read was attempted without an open connection.
    #[error("Not connected")]
    NotConnected,

    /// The device answered with a Modbus exception.
    #[error("Modbus exception 0x{code:02X} for function 0x{function:02X}: {}", exception_description(*code))]
    Exception {
        /// Function code of the request.
        function: u8,
        /// Exception code returned by the device.
        code: u8,
    },

    /// Invalid parameter provided.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// Invalid response received from the device.
    #[error("Invalid response: {reason}")]
    InvalidResponse {
        /// Description of the response error.
        reason: String,
    },

    /// The frame boundary could not be determined; the rest of the stream is
    /// unreadable.
    #[error("Framing error: {reason}")]
    Framing {
        /// Description of the framing error.
        reason: String,
    },

    /// Communication timeout.
    #[error("Communication timeout")]
    Timeout,

    /// I/O error during communication or logging.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transaction ID mismatch between request and response.
    #[error("Transaction ID mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    TransactionMismatch {
        /// Expected transaction ID.
        expected: u16,
        /// Received transaction ID.
        received: u16,
    },

    /// A register block does not have the length its element type requires.
    #[error("Cannot decode {element_type}: expected {expected} words, got {actual}")]
    WordCount {
        /// Declared element type.
        element_type: ElementType,
        /// Words the element type consumes.
        expected: usize,
        /// Words actually supplied.
        actual: usize,
    },

    /// Invalid descriptor table or poller configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// The output sink rejected a batch.
    #[error("Write to {target} failed: {reason}")]
    Write {
        /// Sink destination, e.g. the log file path.
        target: String,
        /// Why the write failed.
        reason: String,
    },

    /// The output sink stored the first `written` samples of a batch, then
    /// failed.
    #[error("{source} after {written} samples were written")]
    PartialWrite {
        /// Samples at the front of the batch that were stored.
        written: usize,
        /// The failure that stopped the write.
        source: Box<MonitorError>,
    },

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Coarse classification used by the poller to decide how to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Device unreachable; the current start attempt or tick is abandoned.
    Connection,
    /// A single register read failed; the value is recorded as null.
    Read,
    /// A register block could not be decoded; the value is recorded as null.
    Decode,
    /// The output sink failed; the batch is kept for the next flush.
    Write,
    /// Rejected configuration.
    Config,
}

impl MonitorError {
    /// Creates a new `Connection` error.
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::MonitorError;
    ///
    /// let err = MonitorError::connection("10.0.0.42:502", "connection refused");
    /// ```
    pub fn connection(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `Exception` error.
    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception { function, code }
    }

    /// Creates a new `InvalidParameter` error.
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::MonitorError;
    ///
    /// let err = MonitorError::invalid_parameter("count", "must be greater than 0");
    /// ```
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidResponse` error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Creates a new `Framing` error.
    pub fn framing(reason: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
        }
    }

    /// Creates a new `TransactionMismatch` error.
    pub fn transaction_mismatch(expected: u16, received: u16) -> Self {
        Self::TransactionMismatch { expected, received }
    }

    /// Creates a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Creates a new `Write` error.
    pub fn write(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a sink failure that happened after `written` samples of the
    /// batch were stored. With nothing written the error is returned as is.
    pub fn partial_write(written: usize, source: MonitorError) -> Self {
        if written == 0 {
            return source;
        }
        Self::PartialWrite {
            written,
            source: Box::new(source),
        }
    }

    /// Returns how many samples at the front of a batch were stored before
    /// this sink error.
    pub fn written(&self) -> usize {
        match self {
            Self::PartialWrite { written, .. } => *written,
            _ => 0,
        }
    }

    /// Classifies the error for recovery decisions.
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::{ErrorClass, MonitorError};
    ///
    /// assert_eq!(MonitorError::Timeout.class(), ErrorClass::Read);
    /// assert_eq!(MonitorError::connection("dev", "refused").class(), ErrorClass::Connection);
    /// ```
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connection { .. } => ErrorClass::Connection,
            Self::NotConnected
            | Self::Exception { .. }
            | Self::InvalidResponse { .. }
            | Self::Framing { .. }
            | Self::Timeout
            | Self::Io(_)
            | Self::TransactionMismatch { .. } => ErrorClass::Read,
            Self::WordCount { .. } => ErrorClass::Decode,
            Self::Write { .. } | Self::PartialWrite { .. } | Self::Csv(_) => ErrorClass::Write,
            Self::InvalidParameter { .. } | Self::InvalidConfig { .. } => ErrorClass::Config,
        }
    }

    /// Returns whether the connection should be dropped after this error.
    ///
    /// A timed-out, broken or desynchronised stream may still deliver stale
    /// bytes, so the next request would read out of sync.
    pub(crate) fn breaks_connection(&self) -> bool {
        matches!(self, Self::Timeout | Self::Io(_) | Self::Framing { .. })
    }
}

/// Returns the standard description of a Modbus exception code.
///
/// # Example
///
/// ```
/// use modbus_monitor::exception_description;
///
/// assert_eq!(exception_description(0x02), "illegal data address");
/// ```
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "server device failure",
        0x05 => "acknowledge",
        0x06 => "server device busy",
        0x08 => "memory parity error",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target device failed to respond",
        _ => "unknown exception",
    }
}
