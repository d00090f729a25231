//! Poll scheduler.
//!
//! A [`Poller`] owns a [`Transport`], an [`OutputSink`] and the
//! [`DescriptorTable`] it walks. Every tick it reads each descriptor in table
//! order, decodes and formats the value, and appends one [`SampleVector`] to
//! its [`SampleBuffer`]. Full buffers are handed to the sink; stopping the
//! poller flushes whatever is left.
//!
//! ```text
//!            start()            stop()
//!   Idle ─────────────► Polling ────────► Stopped
//!     ▲  connect failed     │ poll_cycle()
//!     └─────────────────────┘ every interval
//! ```
//!
//! Faults never stop the scheduler: a failed read records a null value, a
//! failed reconnect skips the tick, a failed write keeps the samples the sink
//! did not store for the next flush. Each fault is logged once with `warn!`, sent once as a
//! [`PollEvent::Fault`] and listed in the cycle's [`CycleReport`].
//!
//! # Example
//!
//! ```no_run
//! use modbus_monitor::{
//!     Client, ClientConfig, ConsoleSink, DatasetDescriptor, DescriptorTable, ElementType,
//!     FormatKind, Poller, PollerConfig,
//! };
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! fn main() -> modbus_monitor::Result<()> {
//!     let table = DescriptorTable::single(
//!         DatasetDescriptor::new(30775, ElementType::S32, FormatKind::Fix0)
//!             .with_description("AC power")
//!             .with_unit("W"),
//!     )?;
//!     let client = Client::new(ClientConfig::new(Ipv4Addr::new(192, 168, 1, 50)));
//!     let sink = ConsoleSink::stdout(&table);
//!     let config = PollerConfig::default().with_interval(Duration::from_secs(10));
//!
//!     let handle = Poller::new(client, sink, table, config)?.spawn()?;
//!     std::thread::sleep(Duration::from_secs(60));
//!     let (_poller, result) = handle.stop();
//!     result
//! }
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::buffer::{SampleBuffer, DEFAULT_BUFFER_THRESHOLD};
use crate::decode::decode;
use crate::descriptor::{DatasetDescriptor, DescriptorTable};
use crate::error::{ErrorClass, MonitorError, Result};
use crate::format::{format_value, FormattedValue};
use crate::sample::SampleVector;
use crate::sink::OutputSink;
use crate::transport::Transport;

/// Shortest accepted poll interval.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default poll interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Whether the poller keeps ticking or stops after the first cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollMode {
    /// Poll every interval until stopped.
    #[default]
    Continuous,
    /// Poll once, flush and stop.
    SingleShot,
}

/// Scheduler settings.
///
/// # Example
///
/// ```
/// use modbus_monitor::{PollMode, PollerConfig};
/// use std::time::Duration;
///
/// let config = PollerConfig::default()
///     .with_interval(Duration::from_secs(30))
///     .with_buffer_threshold(10);
/// assert_eq!(config.mode, PollMode::Continuous);
/// assert!(config.validate().is_ok());
///
/// let once = PollerConfig::default().single_shot();
/// assert_eq!(once.mode, PollMode::SingleShot);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between tick starts.
    pub interval: Duration,
    /// Samples collected before a flush.
    pub buffer_threshold: usize,
    /// Continuous or single-shot operation.
    pub mode: PollMode,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
            mode: PollMode::Continuous,
        }
    }
}

impl PollerConfig {
    /// Sets the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the flush threshold.
    pub fn with_buffer_threshold(mut self, threshold: usize) -> Self {
        self.buffer_threshold = threshold;
        self
    }

    /// Polls once, flushes and stops.
    pub fn single_shot(mut self) -> Self {
        self.mode = PollMode::SingleShot;
        self
    }

    /// Checks the interval and threshold.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::InvalidConfig` if the interval is shorter than
    /// [`MIN_INTERVAL`] or the threshold is 0.
    pub fn validate(&self) -> Result<()> {
        if self.interval < MIN_INTERVAL {
            return Err(MonitorError::invalid_config(format!(
                "poll interval {:?} is shorter than {:?}",
                self.interval, MIN_INTERVAL
            )));
        }
        if self.buffer_threshold == 0 {
            return Err(MonitorError::invalid_config(
                "buffer threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Not started, or the last start attempt failed.
    Idle,
    /// Connected and ticking.
    Polling,
    /// Stopped after a final flush.
    Stopped,
}

/// A fault reported during a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Error classification.
    pub class: ErrorClass,
    /// Table index of the affected descriptor, if any.
    pub index: Option<usize>,
    /// Register address of the affected descriptor, if any.
    pub address: Option<u16>,
    /// Error message.
    pub message: String,
}

/// Notification sent to an optional event consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// A cycle produced a sample.
    Sample(SampleVector),
    /// A fault was reported.
    Fault(Fault),
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Sample appended to the buffer, or `None` if the tick was skipped.
    pub sample: Option<SampleVector>,
    /// Faults reported during the cycle.
    pub faults: Vec<Fault>,
    /// Samples handed to the sink during the cycle.
    pub flushed: usize,
}

/// Periodic poller for one device.
pub struct Poller<T, S> {
    transport: T,
    sink: S,
    table: DescriptorTable,
    config: PollerConfig,
    buffer: Arc<SampleBuffer>,
    events: Option<Sender<PollEvent>>,
    dropped_events: u64,
    state: PollState,
}

impl<T: Transport, S: OutputSink> Poller<T, S> {
    /// Creates an idle poller.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::InvalidConfig` if `config` fails validation.
    pub fn new(
        transport: T,
        sink: S,
        table: DescriptorTable,
        config: PollerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            sink,
            table,
            config,
            buffer: Arc::new(SampleBuffer::new(config.buffer_threshold)),
            events: None,
            dropped_events: 0,
            state: PollState::Idle,
        })
    }

    /// Sends samples and faults to `events`.
    ///
    /// Sending never blocks: events that do not fit are dropped and counted.
    pub fn with_events(mut self, events: Sender<PollEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Returns the scheduler settings.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Returns the descriptor table.
    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    /// Returns a handle to the sample buffer, for display consumers.
    pub fn buffer(&self) -> Arc<SampleBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Returns the number of events dropped because the consumer lagged.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Consumes the poller, returning the transport and sink.
    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.sink)
    }

    /// Connects to the device and enters the polling state.
    ///
    /// Starting a running poller is a no-op.
    ///
    /// # Errors
    ///
    /// - `MonitorError::InvalidConfig` if the table is empty
    /// - the transport's connect error; the poller stays idle
    pub fn start(&mut self) -> Result<()> {
        if self.state == PollState::Polling {
            return Ok(());
        }
        if self.table.is_empty() {
            return Err(MonitorError::invalid_config("descriptor table is empty"));
        }

        self.transport.connect()?;
        self.state = PollState::Polling;
        info!(
            descriptors = self.table.len(),
            interval = ?self.config.interval,
            threshold = self.buffer.threshold(),
            "polling started"
        );
        Ok(())
    }

    /// Runs one poll cycle.
    ///
    /// A lost connection is re-established first; if that fails the tick is
    /// skipped and no sample is produced.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::InvalidConfig` if the poller is not started.
    /// Device and sink faults are reported in the [`CycleReport`] instead.
    pub fn poll_cycle(&mut self) -> Result<CycleReport> {
        if self.state != PollState::Polling {
            return Err(MonitorError::invalid_config("poller is not started"));
        }

        let tick = Local::now().naive_local();
        let mut report = CycleReport::default();

        if !self.transport.is_connected() {
            if let Err(e) = self.transport.connect() {
                self.report(&mut report, None, e);
                return Ok(report);
            }
            info!("reconnected");
        }

        let mut failures = Vec::new();
        let mut values = Vec::with_capacity(self.table.len());
        for (index, descriptor) in self.table.iter().enumerate() {
            // After a dropped connection the remaining reads cannot succeed.
            if !self.transport.is_connected() {
                values.push(FormattedValue::Null);
                continue;
            }
            match read_value(&mut self.transport, descriptor) {
                Ok(value) => values.push(value),
                Err(e) => {
                    values.push(FormattedValue::Null);
                    failures.push((index, e));
                }
            }
        }
        for (index, e) in failures {
            self.report(&mut report, Some(index), e);
        }

        let sample = SampleVector::new(tick, values);
        debug!(time = %sample.timestamp_string(), faults = report.faults.len(), "cycle complete");
        self.buffer.append(sample.clone());
        self.emit(PollEvent::Sample(sample.clone()));
        report.sample = Some(sample);

        if let Some(batch) = self.buffer.flush_if_threshold() {
            match self.write_batch(batch) {
                Ok(count) => report.flushed = count,
                Err(e) => {
                    report.flushed = e.written();
                    self.report(&mut report, None, e);
                }
            }
        }
        Ok(report)
    }

    /// Flushes the buffer, closes the transport and enters the stopped
    /// state. Returns the number of samples flushed.
    ///
    /// # Errors
    ///
    /// Returns the sink error if the final flush failed; the samples the sink
    /// did not store stay in the buffer.
    pub fn stop(&mut self) -> Result<usize> {
        if self.state == PollState::Stopped {
            return Ok(0);
        }
        self.state = PollState::Stopped;

        let batch = self.buffer.flush_now();
        let flushed = if batch.is_empty() {
            Ok(0)
        } else {
            self.write_batch(batch)
        };
        self.transport.close();

        if self.dropped_events > 0 {
            warn!(dropped = self.dropped_events, "poll events dropped");
        }
        match &flushed {
            Ok(count) => info!(flushed = count, "polling stopped"),
            Err(e) => warn!(error = %e, "final flush failed"),
        }
        flushed
    }

    /// Starts, polls once and stops.
    ///
    /// The report's `flushed` count includes the final flush.
    pub fn run_single_shot(&mut self) -> Result<CycleReport> {
        self.start()?;
        let cycle = self.poll_cycle();
        let stopped = self.stop();
        let mut report = cycle?;
        report.flushed += stopped?;
        Ok(report)
    }

    /// Polls every interval until `stop` receives a message or disconnects,
    /// then stops the poller.
    ///
    /// Starts the poller first if needed. A cycle that overruns the interval
    /// skips the missed ticks; cycles never overlap. In single-shot mode the
    /// loop ends after the first cycle.
    pub fn run(&mut self, stop: &Receiver<()>) -> Result<()> {
        self.start()?;

        let interval = self.config.interval;
        let mut next_tick = Instant::now();
        loop {
            self.poll_cycle()?;
            if self.config.mode == PollMode::SingleShot {
                break;
            }

            next_tick += interval;
            let now = Instant::now();
            if next_tick <= now {
                let mut skipped = 0u32;
                while next_tick <= now {
                    next_tick += interval;
                    skipped += 1;
                }
                warn!(skipped, "poll cycle overran the interval");
            }

            match stop.recv_timeout(next_tick - now) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.stop().map(|_| ())
    }

    /// Hands `batch` to the sink. Whatever the sink did not store goes back
    /// to the front of the buffer.
    fn write_batch(&mut self, mut batch: Vec<SampleVector>) -> Result<usize> {
        match self.sink.write(&batch) {
            Ok(()) => {
                info!(samples = batch.len(), "flushed");
                Ok(batch.len())
            }
            Err(e) => {
                let written = e.written().min(batch.len());
                if written > 0 {
                    info!(
                        samples = written,
                        pending = batch.len() - written,
                        "flushed part of batch"
                    );
                }
                self.buffer.requeue(batch.split_off(written));
                Err(e)
            }
        }
    }

    fn report(&mut self, report: &mut CycleReport, index: Option<usize>, error: MonitorError) {
        let address = index.and_then(|i| self.table.get(i)).map(|d| d.address);
        let class = error.class();
        warn!(?class, ?address, error = %error, "poll fault");

        let fault = Fault {
            class,
            index,
            address,
            message: error.to_string(),
        };
        self.emit(PollEvent::Fault(fault.clone()));
        report.faults.push(fault);
    }

    fn emit(&mut self, event: PollEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped_events += 1,
            Err(TrySendError::Disconnected(_)) => {
                debug!("event consumer gone");
                self.events = None;
            }
        }
    }
}

impl<T, S> Poller<T, S>
where
    T: Transport + Send + 'static,
    S: OutputSink + Send + 'static,
{
    /// Starts the poller and runs it on a background thread.
    ///
    /// # Errors
    ///
    /// Returns the start error; no thread is spawned in that case.
    pub fn spawn(mut self) -> Result<PollHandle<T, S>> {
        self.start()?;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let thread = thread::Builder::new()
            .name("modbus-poller".to_string())
            .spawn(move || {
                let result = self.run(&stop_rx);
                (self, result)
            })?;
        Ok(PollHandle { stop_tx, thread })
    }
}

impl<T, S> std::fmt::Debug for Poller<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("descriptors", &self.table.len())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

/// Handle to a poller running on a background thread.
pub struct PollHandle<T, S> {
    stop_tx: Sender<()>,
    thread: JoinHandle<(Poller<T, S>, Result<()>)>,
}

impl<T, S> PollHandle<T, S> {
    /// Returns whether the polling thread has ended.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Signals the poller to stop, waits for the final flush and returns the
    /// stopped poller together with the outcome of the polling loop.
    ///
    /// The poller comes back even when the loop or the final flush failed,
    /// so samples the sink did not store can still be read from its buffer.
    pub fn stop(self) -> (Poller<T, S>, Result<()>) {
        // The loop may already have ended on its own.
        let _ = self.stop_tx.send(());
        match self.thread.join() {
            Ok(stopped) => stopped,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl<T, S> std::fmt::Debug for PollHandle<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("finished", &self.thread.is_finished())
            .finish()
    }
}

fn read_value<T: Transport>(
    transport: &mut T,
    descriptor: &DatasetDescriptor,
) -> Result<FormattedValue> {
    let words = transport.read_registers(descriptor.address, descriptor.word_count())?;
    let value = decode(&words, descriptor.element_type)?;
    Ok(format_value(&value, descriptor.format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ElementType, FormatKind};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Device {
        registers: HashMap<u16, u16>,
        failing: HashSet<u16>,
        disconnecting: HashSet<u16>,
        short_reads: HashSet<u16>,
        refuse_connect: bool,
        connected: bool,
        connects: usize,
        read_delay: Duration,
        reads: Vec<(Instant, Instant)>,
    }

    #[derive(Clone, Default)]
    struct MockTransport(Arc<Mutex<Device>>);

    impl MockTransport {
        fn with_registers(registers: &[(u16, u16)]) -> Self {
            let mock = Self::default();
            mock.device().registers = registers.iter().copied().collect();
            mock
        }

        fn device(&self) -> std::sync::MutexGuard<'_, Device> {
            self.0.lock().unwrap()
        }
    }

    impl Transport for MockTransport {
        fn connect(&mut self) -> Result<()> {
            let mut device = self.device();
            device.connects += 1;
            if device.refuse_connect {
                return Err(MonitorError::connection("mock:502", "connection refused"));
            }
            device.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.device().connected
        }

        fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
            let delay = self.device().read_delay;
            let started = Instant::now();
            thread::sleep(delay);

            let mut device = self.device();
            device.reads.push((started, Instant::now()));
            if !device.connected {
                return Err(MonitorError::NotConnected);
            }
            if device.failing.contains(&address) {
                return Err(MonitorError::exception(0x04, 0x02));
            }
            if device.disconnecting.contains(&address) {
                device.connected = false;
                return Err(MonitorError::Timeout);
            }
            let count = if device.short_reads.contains(&address) {
                count - 1
            } else {
                count
            };
            Ok((address..address + count)
                .map(|a| device.registers.get(&a).copied().unwrap_or(0))
                .collect())
        }

        fn close(&mut self) {
            self.device().connected = false;
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        batches: Arc<Mutex<Vec<Vec<SampleVector>>>>,
        fail: Arc<AtomicBool>,
        accept: Arc<Mutex<Option<usize>>>,
    }

    impl RecordingSink {
        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }

        fn samples(&self) -> Vec<SampleVector> {
            self.batches.lock().unwrap().concat()
        }
    }

    impl OutputSink for RecordingSink {
        fn write(&mut self, batch: &[SampleVector]) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(MonitorError::write("recording", "disk full"));
            }
            if let Some(limit) = *self.accept.lock().unwrap() {
                let stored = limit.min(batch.len());
                self.batches.lock().unwrap().push(batch[..stored].to_vec());
                return Err(MonitorError::partial_write(
                    stored,
                    MonitorError::write("recording", "disk full"),
                ));
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn u16_table(addresses: &[u16]) -> DescriptorTable {
        DescriptorTable::new(
            addresses
                .iter()
                .map(|&a| DatasetDescriptor::new(a, ElementType::U16, FormatKind::Raw))
                .collect(),
        )
        .unwrap()
    }

    fn config(threshold: usize) -> PollerConfig {
        PollerConfig::default()
            .with_interval(Duration::from_secs(1))
            .with_buffer_threshold(threshold)
    }

    fn poller(
        transport: &MockTransport,
        sink: &RecordingSink,
        table: DescriptorTable,
        config: PollerConfig,
    ) -> Poller<MockTransport, RecordingSink> {
        Poller::new(transport.clone(), sink.clone(), table, config).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(PollerConfig::default().validate().is_ok());
        assert!(PollerConfig::default()
            .with_interval(Duration::from_millis(999))
            .validate()
            .is_err());
        assert!(PollerConfig::default()
            .with_buffer_threshold(0)
            .validate()
            .is_err());

        let result = Poller::new(
            MockTransport::default(),
            RecordingSink::default(),
            u16_table(&[1]),
            PollerConfig::default().with_buffer_threshold(0),
        );
        assert!(matches!(result, Err(MonitorError::InvalidConfig { .. })));
    }

    #[test]
    fn test_three_ticks_one_flush() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(3));

        poller.start().unwrap();
        assert_eq!(poller.state(), PollState::Polling);

        assert_eq!(poller.poll_cycle().unwrap().flushed, 0);
        assert_eq!(poller.poll_cycle().unwrap().flushed, 0);
        assert!(sink.batch_sizes().is_empty());

        let report = poller.poll_cycle().unwrap();
        assert_eq!(report.flushed, 3);
        assert!(report.faults.is_empty());
        assert_eq!(sink.batch_sizes(), vec![3]);
        assert!(poller.buffer().is_empty());
    }

    #[test]
    fn test_read_failure_nulls_one_value() {
        let transport = MockTransport::with_registers(&[(10, 1), (20, 2), (30, 3)]);
        transport.device().failing.insert(20);
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10, 20, 30]), config(50));

        poller.start().unwrap();
        let report = poller.poll_cycle().unwrap();

        let sample = report.sample.unwrap();
        assert_eq!(
            sample.values(),
            &[
                FormattedValue::Unsigned(1),
                FormattedValue::Null,
                FormattedValue::Unsigned(3)
            ]
        );
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].class, ErrorClass::Read);
        assert_eq!(report.faults[0].index, Some(1));
        assert_eq!(report.faults[0].address, Some(20));
    }

    #[test]
    fn test_decode_failure_nulls_one_value() {
        let transport = MockTransport::with_registers(&[(10, 1)]);
        transport.device().short_reads.insert(20);
        let sink = RecordingSink::default();
        let table = DescriptorTable::new(vec![
            DatasetDescriptor::new(10, ElementType::U16, FormatKind::Raw),
            DatasetDescriptor::new(20, ElementType::U32, FormatKind::Raw),
        ])
        .unwrap();
        let mut poller = poller(&transport, &sink, table, config(50));

        poller.start().unwrap();
        let report = poller.poll_cycle().unwrap();
        assert_eq!(
            report.sample.unwrap().values(),
            &[FormattedValue::Unsigned(1), FormattedValue::Null]
        );
        assert_eq!(report.faults[0].class, ErrorClass::Decode);
    }

    #[test]
    fn test_sentinel_is_null_without_fault() {
        let transport = MockTransport::with_registers(&[(30775, 0x8000), (30776, 0x0000)]);
        let sink = RecordingSink::default();
        let table = DescriptorTable::single(DatasetDescriptor::new(
            30775,
            ElementType::S32,
            FormatKind::Fix2,
        ))
        .unwrap();
        let mut poller = poller(&transport, &sink, table, config(50));

        poller.start().unwrap();
        let report = poller.poll_cycle().unwrap();
        assert_eq!(report.sample.unwrap().values(), &[FormattedValue::Null]);
        assert!(report.faults.is_empty());
    }

    #[test]
    fn test_dropped_connection_mid_cycle_reports_once() {
        let transport = MockTransport::with_registers(&[(10, 1), (30, 3)]);
        transport.device().disconnecting.insert(20);
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10, 20, 30]), config(50));

        poller.start().unwrap();
        let report = poller.poll_cycle().unwrap();
        assert_eq!(
            report.sample.unwrap().values(),
            &[
                FormattedValue::Unsigned(1),
                FormattedValue::Null,
                FormattedValue::Null
            ]
        );
        assert_eq!(report.faults.len(), 1);

        transport.device().disconnecting.clear();
        let report = poller.poll_cycle().unwrap();
        assert!(report.faults.is_empty());
        assert_eq!(transport.device().connects, 2);
    }

    #[test]
    fn test_single_shot_flushes_one_sample() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(50).single_shot());

        let report = poller.run_single_shot().unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(sink.batch_sizes(), vec![1]);
        assert_eq!(poller.state(), PollState::Stopped);
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_run_in_single_shot_mode_returns_after_one_cycle() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(50).single_shot());

        let (_stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        poller.run(&stop_rx).unwrap();
        assert_eq!(sink.batch_sizes(), vec![1]);
        assert_eq!(poller.state(), PollState::Stopped);
    }

    #[test]
    fn test_stop_flushes_partial_buffer() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(50));

        poller.start().unwrap();
        poller.poll_cycle().unwrap();
        poller.poll_cycle().unwrap();
        assert_eq!(poller.stop().unwrap(), 2);
        assert_eq!(sink.batch_sizes(), vec![2]);
        assert_eq!(poller.state(), PollState::Stopped);
        assert!(!transport.is_connected());

        assert_eq!(poller.stop().unwrap(), 0);
        assert!(poller.poll_cycle().is_err());
    }

    #[test]
    fn test_write_failure_requeues_batch() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        sink.fail.store(true, Ordering::SeqCst);
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(1));

        poller.start().unwrap();
        let report = poller.poll_cycle().unwrap();
        assert_eq!(report.flushed, 0);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].class, ErrorClass::Write);
        assert_eq!(poller.buffer().len(), 1);

        sink.fail.store(false, Ordering::SeqCst);
        let report = poller.poll_cycle().unwrap();
        assert_eq!(report.flushed, 2);
        assert_eq!(sink.batch_sizes(), vec![2]);

        let samples = sink.samples();
        assert!(samples[0].timestamp() <= samples[1].timestamp());
    }

    #[test]
    fn test_partial_write_requeues_only_the_rest() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        *sink.accept.lock().unwrap() = Some(2);
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(3));

        poller.start().unwrap();
        poller.poll_cycle().unwrap();
        poller.poll_cycle().unwrap();
        let report = poller.poll_cycle().unwrap();
        assert_eq!(report.flushed, 2);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].class, ErrorClass::Write);
        assert_eq!(poller.buffer().len(), 1);

        *sink.accept.lock().unwrap() = None;
        assert_eq!(poller.stop().unwrap(), 1);
        assert_eq!(sink.batch_sizes(), vec![2, 1]);

        let samples = sink.samples();
        assert!(samples
            .windows(2)
            .all(|pair| pair[0].timestamp() <= pair[1].timestamp()));
    }

    #[test]
    fn test_final_flush_failure_keeps_samples() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(50));

        poller.start().unwrap();
        poller.poll_cycle().unwrap();
        sink.fail.store(true, Ordering::SeqCst);
        assert!(poller.stop().is_err());
        assert_eq!(poller.buffer().len(), 1);
    }

    #[test]
    fn test_connect_failure_at_start() {
        let transport = MockTransport::default();
        transport.device().refuse_connect = true;
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(50));

        let err = poller.start().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Connection);
        assert_eq!(poller.state(), PollState::Idle);
        assert!(poller.poll_cycle().is_err());
    }

    #[test]
    fn test_empty_table_rejected() {
        let transport = MockTransport::default();
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, DescriptorTable::default(), config(50));

        let err = poller.start().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Config);
        assert_eq!(transport.device().connects, 0);
    }

    #[test]
    fn test_reconnect_failure_skips_tick() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(50));
        poller.start().unwrap();

        {
            let mut device = transport.device();
            device.connected = false;
            device.refuse_connect = true;
        }
        let report = poller.poll_cycle().unwrap();
        assert!(report.sample.is_none());
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].class, ErrorClass::Connection);
        assert!(poller.buffer().is_empty());

        transport.device().refuse_connect = false;
        let report = poller.poll_cycle().unwrap();
        assert!(report.sample.is_some());
        assert_eq!(poller.buffer().len(), 1);
    }

    #[test]
    fn test_events() {
        let transport = MockTransport::with_registers(&[(10, 1)]);
        transport.device().failing.insert(20);
        let sink = RecordingSink::default();
        let (tx, rx) = crossbeam_channel::bounded(16);
        let mut poller =
            poller(&transport, &sink, u16_table(&[10, 20]), config(50)).with_events(tx);

        poller.start().unwrap();
        poller.poll_cycle().unwrap();

        match rx.try_recv().unwrap() {
            PollEvent::Fault(fault) => assert_eq!(fault.address, Some(20)),
            other => panic!("Expected fault, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            PollEvent::Sample(sample) => assert_eq!(sample.len(), 2),
            other => panic!("Expected sample, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_event_channel_never_blocks() {
        let transport = MockTransport::with_registers(&[(10, 1)]);
        let sink = RecordingSink::default();
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let mut poller = poller(&transport, &sink, u16_table(&[10]), config(50)).with_events(tx);

        poller.start().unwrap();
        for _ in 0..3 {
            poller.poll_cycle().unwrap();
        }
        assert_eq!(poller.dropped_events(), 2);
        assert_eq!(poller.buffer().len(), 3);
    }

    #[test]
    fn test_spawn_stop_before_next_tick() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        let (tx, rx) = crossbeam_channel::bounded(16);
        let config = PollerConfig::default().with_interval(Duration::from_secs(3600));
        let handle = poller(&transport, &sink, u16_table(&[10]), config)
            .with_events(tx)
            .spawn()
            .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, PollEvent::Sample(_)));

        let started = Instant::now();
        let (poller, result) = handle.stop();
        result.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(poller.state(), PollState::Stopped);
        assert_eq!(sink.batch_sizes(), vec![1]);
    }

    #[test]
    fn test_spawned_ticks_are_all_flushed() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = poller(&transport, &sink, u16_table(&[10]), config(50))
            .with_events(tx)
            .spawn()
            .unwrap();

        for _ in 0..2 {
            let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(matches!(event, PollEvent::Sample(_)));
        }
        handle.stop().1.unwrap();

        let cycles = 2 + rx.try_iter().count();
        assert_eq!(sink.samples().len(), cycles);
    }

    #[test]
    fn test_handle_stop_returns_poller_after_failed_flush() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        let sink = RecordingSink::default();
        sink.fail.store(true, Ordering::SeqCst);
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = PollerConfig::default().with_interval(Duration::from_secs(3600));
        let handle = poller(&transport, &sink, u16_table(&[10]), config)
            .with_events(tx)
            .spawn()
            .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, PollEvent::Sample(_)));

        let (poller, result) = handle.stop();
        assert_eq!(result.unwrap_err().class(), ErrorClass::Write);
        assert_eq!(poller.state(), PollState::Stopped);
        assert!(sink.batch_sizes().is_empty());

        // The unwritten sample is still there to be saved elsewhere.
        let kept = poller.buffer().flush_now();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].values(), &[FormattedValue::Unsigned(7)]);
    }

    #[test]
    fn test_overrunning_cycle_skips_missed_ticks() {
        let transport = MockTransport::with_registers(&[(10, 7)]);
        transport.device().read_delay = Duration::from_millis(1200);
        let sink = RecordingSink::default();
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = poller(&transport, &sink, u16_table(&[10]), config(50))
            .with_events(tx)
            .spawn()
            .unwrap();

        for _ in 0..2 {
            let event = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            assert!(matches!(event, PollEvent::Sample(_)));
        }
        handle.stop().1.unwrap();

        let reads = transport.device().reads.clone();
        assert!(reads.len() >= 2);
        for pair in reads.windows(2) {
            let (previous_start, previous_end) = pair[0];
            let (start, _) = pair[1];
            assert!(start >= previous_end, "cycles overlap");
            // The tick at +1s fell inside the first read and is dropped, so
            // the next cycle waits for the tick at +2s instead of running late.
            assert!(start - previous_start >= Duration::from_millis(1900));
        }
        assert_eq!(sink.samples().len(), reads.len());
    }

    #[test]
    fn test_spawn_connect_failure() {
        let transport = MockTransport::default();
        transport.device().refuse_connect = true;
        let sink = RecordingSink::default();
        let result = poller(&transport, &sink, u16_table(&[10]), config(50)).spawn();
        assert!(matches!(result, Err(MonitorError::Connection { .. })));
    }
}
