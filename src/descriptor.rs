//! Dataset descriptors: what to poll and how to interpret it.
//!
//! A [`DatasetDescriptor`] names a register address, the element type stored
//! there and the format applied before logging. A [`DescriptorTable`] is the
//! ordered list the poller walks every tick; its order is the column order of
//! every sample.
//!
//! | Type | Words | Interpretation |
//! |------|:-----:|----------------|
//! | S16 | 1 | signed 16-bit |
//! | U16 | 1 | unsigned 16-bit |
//! | S32 | 2 | signed 32-bit |
//! | U32 | 2 | unsigned 32-bit |
//! | U64 | 4 | unsigned 64-bit |
//! | STR32 | 16 | 32-byte text, NUL padded |
//!
//! # Example
//!
//! ```
//! use modbus_monitor::{DatasetDescriptor, DescriptorTable, ElementType, FormatKind};
//!
//! let table = DescriptorTable::new(vec![
//!     DatasetDescriptor::new(30775, ElementType::S32, FormatKind::Fix0)
//!         .with_description("AC power")
//!         .with_unit("W"),
//!     DatasetDescriptor::new(30529, ElementType::U32, FormatKind::Fix3)
//!         .with_description("total yield")
//!         .with_unit("kWh"),
//! ])?;
//!
//! assert_eq!(table.len(), 2);
//! assert_eq!(table.column_headers(), vec!["AC power (W)", "total yield (kWh)"]);
//! # Ok::<(), modbus_monitor::MonitorError>(())
//! ```

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::{MonitorError, Result};

/// Number of addressable registers.
const REGISTER_SPACE: u32 = 0x1_0000;

/// Element type stored at a register address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum ElementType {
    /// Signed 16-bit integer.
    S16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    S32,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-byte string.
    Str32,
}

impl ElementType {
    /// Returns the number of registers this type occupies.
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::ElementType;
    ///
    /// assert_eq!(ElementType::U16.word_count(), 1);
    /// assert_eq!(ElementType::U64.word_count(), 4);
    /// assert_eq!(ElementType::Str32.word_count(), 16);
    /// ```
    pub fn word_count(self) -> u16 {
        match self {
            ElementType::S16 | ElementType::U16 => 1,
            ElementType::S32 | ElementType::U32 => 2,
            ElementType::U64 => 4,
            ElementType::Str32 => 16,
        }
    }

    /// Returns the canonical name of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::S16 => "S16",
            ElementType::U16 => "U16",
            ElementType::S32 => "S32",
            ElementType::U32 => "U32",
            ElementType::U64 => "U64",
            ElementType::Str32 => "STR32",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S16" => Ok(ElementType::S16),
            "U16" => Ok(ElementType::U16),
            "S32" => Ok(ElementType::S32),
            "U32" => Ok(ElementType::U32),
            "U64" => Ok(ElementType::U64),
            "STR32" => Ok(ElementType::Str32),
            other => Err(MonitorError::invalid_config(format!(
                "unknown element type '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ElementType {
    type Error = MonitorError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ElementType> for String {
    fn from(t: ElementType) -> Self {
        t.as_str().to_string()
    }
}

/// Display and storage format applied to a decoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "String", into = "String")
)]
pub enum FormatKind {
    /// Value as read.
    #[default]
    Raw,
    /// Integer with no decimal places.
    Fix0,
    /// One implied decimal place (value / 10).
    Fix1,
    /// Two implied decimal places (value / 100).
    Fix2,
    /// Three implied decimal places (value / 1000).
    Fix3,
    /// Text.
    Utf8,
    /// Enumeration code, logged as its number.
    Enum,
}

impl FormatKind {
    /// Returns the divisor for fixed-point formats.
    pub fn divisor(self) -> Option<f64> {
        match self {
            FormatKind::Fix1 => Some(10.0),
            FormatKind::Fix2 => Some(100.0),
            FormatKind::Fix3 => Some(1000.0),
            _ => None,
        }
    }

    /// Returns the canonical name of the format.
    pub fn as_str(self) -> &'static str {
        match self {
            FormatKind::Raw => "RAW",
            FormatKind::Fix0 => "FIX0",
            FormatKind::Fix1 => "FIX1",
            FormatKind::Fix2 => "FIX2",
            FormatKind::Fix3 => "FIX3",
            FormatKind::Utf8 => "UTF8",
            FormatKind::Enum => "ENUM",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsing never fails: an unrecognised name falls back to [`FormatKind::Raw`].
///
/// # Example
///
/// ```
/// use modbus_monitor::FormatKind;
///
/// assert_eq!("fix2".parse::<FormatKind>().unwrap(), FormatKind::Fix2);
/// assert_eq!("TEMP".parse::<FormatKind>().unwrap(), FormatKind::Raw);
/// ```
impl FromStr for FormatKind {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Infallible> {
        let kind = match s.trim().to_ascii_uppercase().as_str() {
            "RAW" => FormatKind::Raw,
            "FIX0" => FormatKind::Fix0,
            "FIX1" => FormatKind::Fix1,
            "FIX2" => FormatKind::Fix2,
            "FIX3" => FormatKind::Fix3,
            "UTF8" => FormatKind::Utf8,
            "ENUM" => FormatKind::Enum,
            other => {
                warn!(format = other, "unknown format, using RAW");
                FormatKind::Raw
            }
        };
        Ok(kind)
    }
}

impl From<String> for FormatKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<FormatKind> for String {
    fn from(k: FormatKind) -> Self {
        k.as_str().to_string()
    }
}

/// One entry of the descriptor table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DatasetDescriptor {
    /// Start register.
    pub address: u16,
    /// Element type stored at the address.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub element_type: ElementType,
    /// Format applied before logging.
    #[cfg_attr(feature = "serde", serde(default))]
    pub format: FormatKind,
    /// Free-text description used as column header.
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    /// Unit appended to the column header.
    #[cfg_attr(feature = "serde", serde(default))]
    pub unit: String,
}

impl DatasetDescriptor {
    /// Creates a descriptor without description or unit.
    pub fn new(address: u16, element_type: ElementType, format: FormatKind) -> Self {
        Self {
            address,
            element_type,
            format,
            description: String::new(),
            unit: String::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Returns the number of registers to read.
    pub fn word_count(&self) -> u16 {
        self.element_type.word_count()
    }

    /// Returns the column header: `description (unit)`, or the address when
    /// no description is set.
    pub fn column_header(&self) -> String {
        if self.description.is_empty() {
            return self.address.to_string();
        }
        if self.unit.is_empty() {
            self.description.clone()
        } else {
            format!("{} ({})", self.description, self.unit)
        }
    }

    /// Checks that the register block fits the register space.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::InvalidConfig` if `address + word_count` runs
    /// past register 0xFFFF.
    pub fn validate(&self) -> Result<()> {
        if u32::from(self.address) + u32::from(self.word_count()) > REGISTER_SPACE {
            return Err(MonitorError::invalid_config(format!(
                "{} at address {} runs past the last register",
                self.element_type, self.address
            )));
        }
        Ok(())
    }
}

/// Ordered, validated list of descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorTable {
    descriptors: Vec<DatasetDescriptor>,
}

impl DescriptorTable {
    /// Creates a table, validating every descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first descriptor validation error.
    pub fn new(descriptors: Vec<DatasetDescriptor>) -> Result<Self> {
        for descriptor in &descriptors {
            descriptor.validate()?;
        }
        Ok(Self { descriptors })
    }

    /// Creates a table holding a single descriptor.
    pub fn single(descriptor: DatasetDescriptor) -> Result<Self> {
        Self::new(vec![descriptor])
    }

    /// Appends a descriptor at the end of the table.
    pub fn push(&mut self, descriptor: DatasetDescriptor) -> Result<()> {
        descriptor.validate()?;
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Loads a table from a JSON array of descriptors.
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::{DescriptorTable, ElementType, FormatKind};
    ///
    /// let table = DescriptorTable::from_json(r#"[
    ///     {"address": 30775, "type": "S32", "format": "FIX0", "description": "AC power", "unit": "W"},
    ///     {"address": 30057, "type": "U32"}
    /// ]"#)?;
    ///
    /// assert_eq!(table.get(1).unwrap().element_type, ElementType::U32);
    /// assert_eq!(table.get(1).unwrap().format, FormatKind::Raw);
    /// # Ok::<(), modbus_monitor::MonitorError>(())
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptors: Vec<DatasetDescriptor> = serde_json::from_str(json)
            .map_err(|e| MonitorError::invalid_config(e.to_string()))?;
        Self::new(descriptors)
    }

    /// Returns the number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Returns the descriptor at `index`.
    pub fn get(&self, index: usize) -> Option<&DatasetDescriptor> {
        self.descriptors.get(index)
    }

    /// Iterates descriptors in table order.
    pub fn iter(&self) -> std::slice::Iter<'_, DatasetDescriptor> {
        self.descriptors.iter()
    }

    /// Returns the column headers in table order.
    pub fn column_headers(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .map(DatasetDescriptor::column_header)
            .collect()
    }
}

impl<'a> IntoIterator for &'a DescriptorTable {
    type Item = &'a DatasetDescriptor;
    type IntoIter = std::slice::Iter<'a, DatasetDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}
