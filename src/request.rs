//! Modbus request frames.
//!
//! The monitor only ever reads, so a single request type covers both
//! register banks: [`ReadRegistersRequest`] carries the MBAP header, the
//! bank's function code, the start address and the register quantity.
//!
//! # Example
//!
//! ```
//! use modbus_monitor::{ReadRegistersRequest, RegisterBank};
//!
//! let req = ReadRegistersRequest::new(1, 3, RegisterBank::Input, 30775, 2).unwrap();
//! let bytes = req.to_bytes();
//! assert_eq!(bytes.len(), 12);
//! ```

use crate::bank::RegisterBank;
use crate::error::{MonitorError, Result};
use crate::header::{MbapHeader, MBAP_HEADER_SIZE};

/// PDU size of a read request: function (1) + address (2) + quantity (2).
const READ_PDU_SIZE: u16 = 5;

/// Maximum number of registers a single read request may ask for.
pub const MAX_REGISTERS_PER_READ: u16 = 125;

/// Request for a contiguous block of registers.
#[derive(Debug, Clone)]
pub struct ReadRegistersRequest {
    header: MbapHeader,
    bank: RegisterBank,
    address: u16,
    count: u16,
}

impl ReadRegistersRequest {
    /// Creates a new read request.
    ///
    /// # Arguments
    ///
    /// * `transaction_id` - ID echoed back by the device
    /// * `unit_id` - Addressed unit
    /// * `bank` - Register bank to read
    /// * `address` - Start register
    /// * `count` - Number of registers (1-125)
    ///
    /// # Errors
    ///
    /// Returns an error if count is 0, exceeds [`MAX_REGISTERS_PER_READ`], or
    /// the block would run past register 0xFFFF.
    pub fn new(
        transaction_id: u16,
        unit_id: u8,
        bank: RegisterBank,
        address: u16,
        count: u16,
    ) -> Result<Self> {
        if count == 0 {
            return Err(MonitorError::invalid_parameter(
                "count",
                "must be greater than 0",
            ));
        }
        if count > MAX_REGISTERS_PER_READ {
            return Err(MonitorError::invalid_parameter(
                "count",
                format!("must not exceed {}", MAX_REGISTERS_PER_READ),
            ));
        }
        if u32::from(address) + u32::from(count) > 0x1_0000 {
            return Err(MonitorError::invalid_parameter(
                "address",
                format!("block {}+{} exceeds the register space", address, count),
            ));
        }

        Ok(Self {
            header: MbapHeader::new(transaction_id, unit_id, READ_PDU_SIZE),
            bank,
            address,
            count,
        })
    }

    /// Returns the transaction ID.
    pub fn transaction_id(&self) -> u16 {
        self.header.transaction_id
    }

    /// Returns the function code of the request.
    pub fn function(&self) -> u8 {
        self.bank.read_function()
    }

    /// Returns the number of registers requested.
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Serializes the request to bytes for transmission.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MBAP_HEADER_SIZE + READ_PDU_SIZE as usize);
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.push(self.function());
        bytes.extend_from_slice(&self.address.to_be_bytes());
        bytes.extend_from_slice(&self.count.to_be_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_input_request_bytes() {
        let req = ReadRegistersRequest::new(0x0001, 3, RegisterBank::Input, 30775, 2).unwrap();
        // 30775 = 0x7837
        assert_eq!(hex::encode(req.to_bytes()), "000100000006030478370002");
    }

    #[test]
    fn test_read_holding_request_bytes() {
        let req = ReadRegistersRequest::new(0x00FF, 1, RegisterBank::Holding, 0, 16).unwrap();
        assert_eq!(hex::encode(req.to_bytes()), "00ff00000006010300000010");
        assert_eq!(req.function(), 0x03);
        assert_eq!(req.transaction_id(), 0x00FF);
        assert_eq!(req.count(), 16);
    }

    #[test]
    fn test_zero_count_rejected() {
        let result = ReadRegistersRequest::new(1, 1, RegisterBank::Input, 0, 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_count_limit() {
        assert!(ReadRegistersRequest::new(1, 1, RegisterBank::Input, 0, 125).is_ok());
        assert!(ReadRegistersRequest::new(1, 1, RegisterBank::Input, 0, 126).is_err());
    }

    #[test]
    fn test_block_past_end_rejected() {
        assert!(ReadRegistersRequest::new(1, 1, RegisterBank::Input, 0xFFFF, 1).is_ok());
        assert!(ReadRegistersRequest::new(1, 1, RegisterBank::Input, 0xFFFF, 2).is_err());
    }
}
