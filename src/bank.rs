//! Register bank definitions.
//!
//! Modbus devices expose 16-bit registers in two banks, each read with its
//! own function code:
//!
//! | Bank | Function | Access |
//! |------|:--------:|--------|
//! | Input | 0x04 | read-only measurements |
//! | Holding | 0x03 | read/write settings and values |
//!
//! Inverters and meters usually publish their measurements as input
//! registers, which is why [`RegisterBank::Input`] is the default.
//!
//! # Example
//!
//! ```
//! use modbus_monitor::RegisterBank;
//!
//! assert_eq!(RegisterBank::default(), RegisterBank::Input);
//! assert_eq!(RegisterBank::Holding.to_string(), "holding");
//! ```

/// Register bank polled by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RegisterBank {
    /// Input registers (function 0x04).
    #[default]
    Input,
    /// Holding registers (function 0x03).
    Holding,
}

impl RegisterBank {
    /// Returns the Modbus function code that reads this bank.
    pub(crate) fn read_function(self) -> u8 {
        match self {
            RegisterBank::Input => 0x04,
            RegisterBank::Holding => 0x03,
        }
    }
}

impl std::fmt::Display for RegisterBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterBank::Input => write!(f, "input"),
            RegisterBank::Holding => write!(f, "holding"),
        }
    }
}
