//! Value formatting.
//!
//! [`format_value`] applies a [`FormatKind`] to a [`DecodedValue`]. The
//! "no data" tag always wins: a sentinel becomes [`FormattedValue::Null`]
//! whatever the format, so a missing measurement is never logged as zero or
//! as a scaled sentinel.
//!
//! # Example
//!
//! ```
//! use modbus_monitor::{decode, format_value, ElementType, FormatKind, FormattedValue};
//!
//! let value = decode(&[0x0000, 0x0001], ElementType::U32)?;
//! assert_eq!(format_value(&value, FormatKind::Fix2), FormattedValue::Decimal(0.01));
//!
//! let night = decode(&[0x8000, 0x0000], ElementType::S32)?;
//! assert_eq!(format_value(&night, FormatKind::Fix2), FormattedValue::Null);
//! # Ok::<(), modbus_monitor::MonitorError>(())
//! ```

use std::fmt;

use crate::decode::{DecodedValue, Scalar};
use crate::descriptor::FormatKind;

/// A value ready for logging.
#[derive(Debug, Clone, PartialEq)]
pub enum FormattedValue {
    /// No data: sentinel, failed read or failed decode.
    Null,
    /// Signed integer passthrough.
    Integer(i64),
    /// Unsigned integer passthrough.
    Unsigned(u64),
    /// Fixed-point value after scaling.
    Decimal(f64),
    /// Text passthrough.
    Text(String),
}

impl FormattedValue {
    /// Returns whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, FormattedValue::Null)
    }

    /// Returns the value as a float, if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FormattedValue::Integer(v) => Some(v as f64),
            FormattedValue::Unsigned(v) => Some(v as f64),
            FormattedValue::Decimal(v) => Some(v),
            FormattedValue::Null | FormattedValue::Text(_) => None,
        }
    }
}

/// Null renders as an empty string.
impl fmt::Display for FormattedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormattedValue::Null => Ok(()),
            FormattedValue::Integer(v) => write!(f, "{}", v),
            FormattedValue::Unsigned(v) => write!(f, "{}", v),
            FormattedValue::Decimal(v) => write!(f, "{}", v),
            FormattedValue::Text(s) => f.write_str(s),
        }
    }
}

/// Formats a decoded value for logging.
///
/// Fixed-point formats divide integers by 10, 100 or 1000. Every other format
/// passes the scalar through unchanged, keeping full 64-bit precision. Text
/// passes through under any format.
pub fn format_value(value: &DecodedValue, kind: FormatKind) -> FormattedValue {
    if value.is_no_data() {
        return FormattedValue::Null;
    }

    match (value.scalar(), kind.divisor()) {
        (Scalar::Text(s), _) => FormattedValue::Text(s.clone()),
        (Scalar::Signed(v), Some(divisor)) => FormattedValue::Decimal(*v as f64 / divisor),
        (Scalar::Unsigned(v), Some(divisor)) => FormattedValue::Decimal(*v as f64 / divisor),
        (Scalar::Signed(v), None) => FormattedValue::Integer(*v),
        (Scalar::Unsigned(v), None) => FormattedValue::Unsigned(*v),
    }
}
