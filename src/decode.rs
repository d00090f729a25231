//! Register decoding.
//!
//! [`decode`] turns the words read for one descriptor into a
//! [`DecodedValue`]. Multi-word values are big-endian: the first register
//! holds the most significant 16 bits.
//!
//! # Sentinels
//!
//! Devices report a missing measurement (no DC input at night, sensor not
//! fitted) by returning the smallest signed or largest unsigned 32-bit value.
//! A decoded value equal to [`NO_DATA_SIGNED`] or [`NO_DATA_UNSIGNED`] is
//! tagged as "no data" whatever element type produced it. The raw scalar is
//! kept so the value can still be inspected.
//!
//! # Example
//!
//! ```
//! use modbus_monitor::{decode, ElementType, Scalar};
//!
//! let value = decode(&[0x0000, 0x0001], ElementType::U32)?;
//! assert_eq!(value.scalar(), &Scalar::Unsigned(1));
//! assert!(!value.is_no_data());
//!
//! let night = decode(&[0x8000, 0x0000], ElementType::S32)?;
//! assert_eq!(night.scalar(), &Scalar::Signed(-2147483648));
//! assert!(night.is_no_data());
//! # Ok::<(), modbus_monitor::MonitorError>(())
//! ```

use crate::descriptor::ElementType;
use crate::error::{MonitorError, Result};

/// Signed sentinel meaning "no data".
pub const NO_DATA_SIGNED: i64 = i32::MIN as i64;

/// Unsigned sentinel meaning "no data".
pub const NO_DATA_UNSIGNED: u64 = u32::MAX as u64;

/// Scalar read from a register block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    /// Value of a signed type.
    Signed(i64),
    /// Value of an unsigned type.
    Unsigned(u64),
    /// Text with NUL padding removed.
    Text(String),
}

impl Scalar {
    /// Returns whether the scalar equals one of the sentinels.
    fn is_sentinel(&self) -> bool {
        match *self {
            Scalar::Signed(v) => v == NO_DATA_SIGNED,
            Scalar::Unsigned(v) => v == NO_DATA_UNSIGNED,
            Scalar::Text(_) => false,
        }
    }
}

/// A decoded scalar, tagged with whether it is the "no data" sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedValue {
    scalar: Scalar,
    no_data: bool,
}

impl DecodedValue {
    /// Wraps a scalar, evaluating the sentinel rule.
    pub fn new(scalar: Scalar) -> Self {
        let no_data = scalar.is_sentinel();
        Self { scalar, no_data }
    }

    /// Returns the raw scalar.
    pub fn scalar(&self) -> &Scalar {
        &self.scalar
    }

    /// Returns whether the device reported "no data".
    pub fn is_no_data(&self) -> bool {
        self.no_data
    }

    /// Consumes the value, returning the scalar unless it is "no data".
    pub fn into_option(self) -> Option<Scalar> {
        if self.no_data {
            None
        } else {
            Some(self.scalar)
        }
    }
}

/// Decodes a register block according to its element type.
///
/// # Errors
///
/// Returns `MonitorError::WordCount` if `words.len()` differs from
/// [`ElementType::word_count`].
pub fn decode(words: &[u16], element_type: ElementType) -> Result<DecodedValue> {
    let expected = usize::from(element_type.word_count());
    if words.len() != expected {
        return Err(MonitorError::WordCount {
            element_type,
            expected,
            actual: words.len(),
        });
    }

    let scalar = match element_type {
        ElementType::S16 => Scalar::Signed(i64::from(words[0] as i16)),
        ElementType::U16 => Scalar::Unsigned(u64::from(words[0])),
        ElementType::S32 => Scalar::Signed(i64::from(compose(words) as u32 as i32)),
        ElementType::U32 => Scalar::Unsigned(compose(words)),
        ElementType::U64 => Scalar::Unsigned(compose(words)),
        ElementType::Str32 => Scalar::Text(words_to_text(words)),
    };

    Ok(DecodedValue::new(scalar))
}

/// Composes up to four words most-significant first.
fn compose(words: &[u16]) -> u64 {
    words
        .iter()
        .fold(0u64, |acc, &word| (acc << 16) | u64::from(word))
}

/// Splits words high byte first and decodes the bytes as text, dropping the
/// trailing NUL padding.
fn words_to_text(words: &[u16]) -> String {
    let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [ElementType; 6] = [
        ElementType::S16,
        ElementType::U16,
        ElementType::S32,
        ElementType::U32,
        ElementType::U64,
        ElementType::Str32,
    ];

    #[test]
    fn test_decode_requires_exact_word_count() {
        for element_type in ALL_TYPES {
            let required = usize::from(element_type.word_count());
            for len in 0..=17 {
                let words = vec![0x0041u16; len];
                let result = decode(&words, element_type);
                assert_eq!(
                    result.is_ok(),
                    len == required,
                    "{} with {} words",
                    element_type,
                    len
                );
            }
        }
    }

    #[test]
    fn test_word_count_error_fields() {
        match decode(&[1], ElementType::U32).unwrap_err() {
            MonitorError::WordCount {
                element_type,
                expected,
                actual,
            } => {
                assert_eq!(element_type, ElementType::U32);
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("Expected WordCount, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_s16() {
        assert_eq!(decode(&[0xFFFF], ElementType::S16).unwrap().scalar(), &Scalar::Signed(-1));
        assert_eq!(decode(&[0x7FFF], ElementType::S16).unwrap().scalar(), &Scalar::Signed(32767));
        assert_eq!(
            decode(&[0x8000], ElementType::S16).unwrap().scalar(),
            &Scalar::Signed(-32768)
        );
    }

    #[test]
    fn test_decode_u16() {
        let value = decode(&[1234], ElementType::U16).unwrap();
        assert_eq!(value.scalar(), &Scalar::Unsigned(1234));
        assert_eq!(
            decode(&[0xFFFF], ElementType::U16).unwrap().scalar(),
            &Scalar::Unsigned(65535)
        );
    }

    #[test]
    fn test_decode_s32_big_endian() {
        let value = decode(&[0xFFFF, 0xFFFE], ElementType::S32).unwrap();
        assert_eq!(value.scalar(), &Scalar::Signed(-2));
        let value = decode(&[0x0001, 0x0000], ElementType::S32).unwrap();
        assert_eq!(value.scalar(), &Scalar::Signed(65536));
    }

    #[test]
    fn test_decode_s32_sentinel() {
        let value = decode(&[0x8000, 0x0000], ElementType::S32).unwrap();
        assert_eq!(value.scalar(), &Scalar::Signed(-2147483648));
        assert!(value.is_no_data());
        assert_eq!(value.into_option(), None);
    }

    #[test]
    fn test_decode_u32() {
        let value = decode(&[0x0000, 0x0001], ElementType::U32).unwrap();
        assert_eq!(value.scalar(), &Scalar::Unsigned(1));
        assert!(!value.is_no_data());
    }

    #[test]
    fn test_decode_u32_sentinel() {
        let value = decode(&[0xFFFF, 0xFFFF], ElementType::U32).unwrap();
        assert_eq!(value.scalar(), &Scalar::Unsigned(4294967295));
        assert!(value.is_no_data());
    }

    #[test]
    fn test_decode_u64() {
        let value = decode(&[0x0123, 0x4567, 0x89AB, 0xCDEF], ElementType::U64).unwrap();
        assert_eq!(value.scalar(), &Scalar::Unsigned(0x0123_4567_89AB_CDEF));
        assert!(!value.is_no_data());
    }

    #[test]
    fn test_decode_u64_sentinel_regardless_of_type() {
        let value = decode(&[0x0000, 0x0000, 0xFFFF, 0xFFFF], ElementType::U64).unwrap();
        assert!(value.is_no_data());

        let max = decode(&[0xFFFF; 4], ElementType::U64).unwrap();
        assert!(!max.is_no_data());
    }

    #[test]
    fn test_narrow_types_never_sentinel() {
        assert!(!decode(&[0xFFFF], ElementType::U16).unwrap().is_no_data());
        assert!(!decode(&[0x8000], ElementType::S16).unwrap().is_no_data());
    }

    #[test]
    fn test_decode_str32() {
        let mut words = vec![0u16; 16];
        words[0] = u16::from_be_bytes(*b"SN");
        words[1] = u16::from_be_bytes(*b": ");
        words[2] = u16::from_be_bytes(*b"19");
        words[3] = u16::from_be_bytes([b'3', 0]);
        let value = decode(&words, ElementType::Str32).unwrap();
        assert_eq!(value.scalar(), &Scalar::Text("SN: 193".to_string()));
        assert!(!value.is_no_data());
    }

    #[test]
    fn test_decode_str32_empty() {
        let value = decode(&[0u16; 16], ElementType::Str32).unwrap();
        assert_eq!(value.scalar(), &Scalar::Text(String::new()));
    }

    #[test]
    fn test_decode_str32_keeps_interior_nul() {
        let mut words = vec![0u16; 16];
        words[0] = u16::from_be_bytes([b'A', 0]);
        words[1] = u16::from_be_bytes([b'B', 0]);
        let value = decode(&words, ElementType::Str32).unwrap();
        assert_eq!(value.scalar(), &Scalar::Text("A\0B".to_string()));
    }
}
