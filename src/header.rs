//! Modbus TCP application header (MBAP).
//!
//! Every Modbus TCP frame starts with a 7-byte MBAP header:
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0-1 | Transaction ID | Echoed by the device, used to match replies |
//! | 2-3 | Protocol ID | Always 0x0000 for Modbus |
//! | 4-5 | Length | Bytes that follow: unit ID + PDU |
//! | 6 | Unit ID | Addressed device behind a gateway |
//!
//! # Example
//!
//! ```
//! use modbus_monitor::MbapHeader;
//!
//! // Header for a 5-byte PDU sent to unit 3
//! let header = MbapHeader::new(0x0001, 3, 5);
//! let bytes = header.to_bytes();
//! assert_eq!(bytes, [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x03]);
//! ```

use crate::error::{MonitorError, Result};

/// MBAP header size in bytes.
pub const MBAP_HEADER_SIZE: usize = 7;

/// Protocol identifier for Modbus.
pub const MODBUS_PROTOCOL_ID: u16 = 0x0000;

/// Modbus TCP application header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Transaction identifier, echoed by the device.
    pub transaction_id: u16,
    /// Protocol identifier (0 for Modbus).
    pub protocol_id: u16,
    /// Number of following bytes, including the unit ID.
    pub length: u16,
    /// Unit identifier.
    pub unit_id: u8,
}

impl MbapHeader {
    /// Creates a request header for a PDU of `pdu_len` bytes.
    pub fn new(transaction_id: u16, unit_id: u8, pdu_len: u16) -> Self {
        Self {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
            length: pdu_len + 1,
            unit_id,
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(self) -> [u8; MBAP_HEADER_SIZE] {
        let [tid_hi, tid_lo] = self.transaction_id.to_be_bytes();
        let [pid_hi, pid_lo] = self.protocol_id.to_be_bytes();
        let [len_hi, len_lo] = self.length.to_be_bytes();
        [tid_hi, tid_lo, pid_hi, pid_lo, len_hi, len_lo, self.unit_id]
    }

    /// Parses a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::InvalidResponse` if the slice is too short, the
    /// protocol ID is not Modbus, or the length field cannot hold a unit ID.
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::MbapHeader;
    ///
    /// let bytes = [0x00, 0x2A, 0x00, 0x00, 0x00, 0x07, 0x03];
    /// let header = MbapHeader::from_bytes(&bytes).unwrap();
    /// assert_eq!(header.transaction_id, 42);
    /// assert_eq!(header.pdu_len(), 6);
    /// ```
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MBAP_HEADER_SIZE {
            return Err(MonitorError::invalid_response(format!(
                "header too short: expected {} bytes, got {}",
                MBAP_HEADER_SIZE,
                data.len()
            )));
        }

        let header = Self {
            transaction_id: u16::from_be_bytes([data[0], data[1]]),
            protocol_id: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            unit_id: data[6],
        };

        if header.protocol_id != MODBUS_PROTOCOL_ID {
            return Err(MonitorError::invalid_response(format!(
                "unexpected protocol ID 0x{:04X}",
                header.protocol_id
            )));
        }
        if header.length == 0 {
            return Err(MonitorError::invalid_response("length field is zero"));
        }

        Ok(header)
    }

    /// Returns the number of PDU bytes that follow the header.
    pub fn pdu_len(self) -> usize {
        usize::from(self.length).saturating_sub(1)
    }
}
