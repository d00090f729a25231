//! Time-stamped sample vectors.

use chrono::{Local, NaiveDateTime, SubsecRound};

use crate::format::FormattedValue;

/// Timestamp format used in logs: local time, whole seconds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Values of one poll cycle, in descriptor table order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleVector {
    timestamp: NaiveDateTime,
    values: Vec<FormattedValue>,
}

impl SampleVector {
    /// Creates a sample, dropping sub-second precision from `timestamp`.
    pub fn new(timestamp: NaiveDateTime, values: Vec<FormattedValue>) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            values,
        }
    }

    /// Creates a sample stamped with the current local time.
    pub fn now(values: Vec<FormattedValue>) -> Self {
        Self::new(Local::now().naive_local(), values)
    }

    /// Returns the sample time.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Returns the timestamp formatted as `YYYY-MM-DD HH:MM:SS`.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Returns the values in table order.
    pub fn values(&self) -> &[FormattedValue] {
        &self.values
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the sample holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the timestamp followed by every value, as logged.
    pub fn to_record(&self) -> Vec<String> {
        std::iter::once(self.timestamp_string())
            .chain(self.values.iter().map(ToString::to_string))
            .collect()
    }
}
