//! Modbus response parsing and validation.
//!
//! # Response Structure
//!
//! | Component | Size | Description |
//! |-----------|------|-------------|
//! | Header | 7 bytes | MBAP header |
//! | Function | 1 byte | Echoed function code, bit 7 set on exception |
//! | Byte count / exception code | 1 byte | Data length, or exception code |
//! | Data | Variable | Register values, big-endian |
//!
//! # Example
//!
//! ```
//! use modbus_monitor::ModbusResponse;
//!
//! let bytes = [
//!     0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x03, // header
//!     0x04, 0x04,                               // function, byte count
//!     0x12, 0x34, 0x56, 0x78,                   // data: 0x1234, 0x5678
//! ];
//!
//! let response = ModbusResponse::from_bytes(&bytes).unwrap();
//! assert!(response.is_success());
//!
//! let words = response.to_words().unwrap();
//! assert_eq!(words, vec![0x1234, 0x5678]);
//! ```

use crate::error::{MonitorError, Result};
use crate::header::{MbapHeader, MBAP_HEADER_SIZE};

/// Minimum response size: header (7) + function (1) + byte count or exception code (1).
pub const MIN_RESPONSE_SIZE: usize = MBAP_HEADER_SIZE + 2;

/// Bit set in the function code of an exception response.
const EXCEPTION_FLAG: u8 = 0x80;

/// Parsed Modbus response.
#[derive(Debug, Clone)]
pub struct ModbusResponse {
    /// Response header.
    pub header: MbapHeader,
    /// Function code as returned by the device.
    pub function: u8,
    /// Exception code, if the device rejected the request.
    pub exception: Option<u8>,
    /// Register data (empty for exceptions).
    pub data: Vec<u8>,
}

impl ModbusResponse {
    /// Parses a Modbus response from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The response is too short
    /// - The header is invalid or its length disagrees with the frame
    /// - The byte count disagrees with the data present
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_RESPONSE_SIZE {
            return Err(MonitorError::invalid_response(format!(
                "response too short: expected at least {} bytes, got {}",
                MIN_RESPONSE_SIZE,
                data.len()
            )));
        }

        let header = MbapHeader::from_bytes(&data[..MBAP_HEADER_SIZE])?;
        let pdu = &data[MBAP_HEADER_SIZE..];
        if header.pdu_len() != pdu.len() {
            return Err(MonitorError::invalid_response(format!(
                "length field announces {} PDU bytes, frame carries {}",
                header.pdu_len(),
                pdu.len()
            )));
        }

        let function = pdu[0];
        if function & EXCEPTION_FLAG != 0 {
            return Ok(Self {
                header,
                function: function & !EXCEPTION_FLAG,
                exception: Some(pdu[1]),
                data: Vec::new(),
            });
        }

        let byte_count = usize::from(pdu[1]);
        let payload = &pdu[2..];
        if payload.len() != byte_count {
            return Err(MonitorError::invalid_response(format!(
                "byte count {} does not match {} data bytes",
                byte_count,
                payload.len()
            )));
        }

        Ok(Self {
            header,
            function,
            exception: None,
            data: payload.to_vec(),
        })
    }

    /// Returns whether the device accepted the request.
    pub fn is_success(&self) -> bool {
        self.exception.is_none()
    }

    /// Validates the response and returns an error if it is an exception.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Exception` carrying the exception code.
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::ModbusResponse;
    ///
    /// let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x03, 0x84, 0x02];
    /// let response = ModbusResponse::from_bytes(&bytes).unwrap();
    /// assert!(response.check_exception().is_err());
    /// ```
    pub fn check_exception(&self) -> Result<()> {
        match self.exception {
            None => Ok(()),
            Some(code) => Err(MonitorError::exception(self.function, code)),
        }
    }

    /// Validates the transaction ID matches the expected value.
    pub fn check_transaction(&self, expected: u16) -> Result<()> {
        if self.header.transaction_id == expected {
            Ok(())
        } else {
            Err(MonitorError::transaction_mismatch(
                expected,
                self.header.transaction_id,
            ))
        }
    }

    /// Validates the function code echoes the request.
    pub fn check_function(&self, expected: u8) -> Result<()> {
        if self.function == expected {
            Ok(())
        } else {
            Err(MonitorError::invalid_response(format!(
                "function 0x{:02X} answered with 0x{:02X}",
                expected, self.function
            )))
        }
    }

    /// Converts response data to words (big-endian u16 values).
    ///
    /// # Errors
    ///
    /// Returns an error if the data length is not even.
    pub fn to_words(&self) -> Result<Vec<u16>> {
        if self.data.len() % 2 != 0 {
            return Err(MonitorError::invalid_response(
                "data length must be even for word conversion",
            ));
        }

        Ok(self
            .data
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect())
    }
}
