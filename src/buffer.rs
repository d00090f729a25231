//! Sample buffering between poll cycles and the output sink.
//!
//! Writing every sample straight to an SD card wears it out, so samples are
//! collected in memory and handed to the sink in batches. The hand-off swaps
//! the whole active list out under the lock: a sample is either still in the
//! buffer or in exactly one returned batch, never both and never neither.
//!
//! # Example
//!
//! ```
//! use modbus_monitor::{SampleBuffer, SampleVector};
//!
//! let buffer = SampleBuffer::new(2);
//! buffer.append(SampleVector::now(vec![]));
//! assert!(buffer.flush_if_threshold().is_none());
//!
//! buffer.append(SampleVector::now(vec![]));
//! let batch = buffer.flush_if_threshold().unwrap();
//! assert_eq!(batch.len(), 2);
//! assert!(buffer.is_empty());
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::sample::SampleVector;

/// Default number of samples collected before a flush.
pub const DEFAULT_BUFFER_THRESHOLD: usize = 50;

/// Thread-safe accumulator of samples awaiting output.
#[derive(Debug)]
pub struct SampleBuffer {
    active: Mutex<Vec<SampleVector>>,
    threshold: usize,
}

impl SampleBuffer {
    /// Creates a buffer that flushes once it holds `threshold` samples.
    ///
    /// A threshold of 0 behaves like 1.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            active: Mutex::new(Vec::with_capacity(threshold)),
            threshold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SampleVector>> {
        // A panic while holding the lock cannot leave the list half-swapped.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the configured flush threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Appends a sample to the active list.
    pub fn append(&self, sample: SampleVector) {
        self.lock().push(sample);
    }

    /// Takes the whole active list if it reached the threshold.
    pub fn flush_if_threshold(&self) -> Option<Vec<SampleVector>> {
        let mut active = self.lock();
        if active.len() >= self.threshold {
            Some(std::mem::replace(
                &mut *active,
                Vec::with_capacity(self.threshold),
            ))
        } else {
            None
        }
    }

    /// Takes the whole active list, whatever its size.
    pub fn flush_now(&self) -> Vec<SampleVector> {
        std::mem::take(&mut *self.lock())
    }

    /// Puts back a batch whose write failed.
    ///
    /// The batch goes in front of samples appended since it was taken, so the
    /// next flush writes everything in time order.
    pub fn requeue(&self, mut batch: Vec<SampleVector>) {
        let mut active = self.lock();
        batch.append(&mut active);
        *active = batch;
    }

    /// Returns the number of buffered samples.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether no samples are buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a copy of the most recent sample.
    pub fn latest(&self) -> Option<SampleVector> {
        self.lock().last().cloned()
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_THRESHOLD)
    }
}
