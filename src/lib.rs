//! # Modbus Monitor
//!
//! A Rust library that polls typed values from a device over Modbus TCP and
//! logs them as time-stamped samples.
//!
//! Every tick the poller reads each entry of a descriptor table, decodes the
//! register block according to its element type, applies a display format,
//! and appends one sample to an in-memory buffer. Full buffers are written to
//! an output sink in one batch.
//!
//! ## Features
//!
//! - **Typed decoding**: S16, U16, S32, U32, U64 and 32-byte strings,
//!   big-endian across registers
//! - **"No data" sentinels**: values the device reports as unavailable are
//!   logged as empty, never as zero
//! - **Fault tolerant**: a failed read nulls one value, a lost connection
//!   skips one tick, a failed write keeps the batch
//! - **Batched output**: console or CSV log files, optionally one per day
//! - **No panics**: all errors returned as `Result<T, MonitorError>`
//!
//! ## Quick Start
//!
//! ```no_run
//! use modbus_monitor::{
//!     Client, ClientConfig, ConsoleSink, DatasetDescriptor, DescriptorTable, ElementType,
//!     FormatKind, Poller, PollerConfig,
//! };
//! use std::net::Ipv4Addr;
//!
//! fn main() -> modbus_monitor::Result<()> {
//!     let table = DescriptorTable::new(vec![
//!         DatasetDescriptor::new(30775, ElementType::S32, FormatKind::Fix0)
//!             .with_description("AC power")
//!             .with_unit("W"),
//!         DatasetDescriptor::new(30529, ElementType::U32, FormatKind::Fix3)
//!             .with_description("total yield")
//!             .with_unit("kWh"),
//!     ])?;
//!
//!     let client = Client::new(ClientConfig::new(Ipv4Addr::new(192, 168, 1, 50)));
//!     let sink = ConsoleSink::stdout(&table);
//!
//!     // Poll once and print the sample
//!     let mut poller = Poller::new(client, sink, table, PollerConfig::default().single_shot())?;
//!     poller.run_single_shot()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Element Types
//!
//! | Type | Registers | Sentinel |
//! |------|:---------:|----------|
//! | [`ElementType::S16`] | 1 | none |
//! | [`ElementType::U16`] | 1 | none |
//! | [`ElementType::S32`] | 2 | -2147483648 |
//! | [`ElementType::U32`] | 2 | 4294967295 |
//! | [`ElementType::U64`] | 4 | 4294967295 |
//! | [`ElementType::Str32`] | 16 | none |
//!
//! ## Formats
//!
//! [`FormatKind::Fix1`], [`FormatKind::Fix2`] and [`FormatKind::Fix3`] divide
//! by 10, 100 and 1000. Every other format passes the value through.
//!
//! ```
//! use modbus_monitor::{decode, format_value, ElementType, FormatKind, FormattedValue};
//!
//! let value = decode(&[0x0000, 0x04D2], ElementType::U32)?;
//! assert_eq!(format_value(&value, FormatKind::Fix1), FormattedValue::Decimal(123.4));
//! assert_eq!(format_value(&value, FormatKind::Raw), FormattedValue::Unsigned(1234));
//! # Ok::<(), modbus_monitor::MonitorError>(())
//! ```
//!
//! ## Logging to CSV
//!
//! ```no_run
//! use modbus_monitor::{
//!     Client, ClientConfig, CsvLogSink, DatasetDescriptor, DescriptorTable, ElementType,
//!     FormatKind, Poller, PollerConfig,
//! };
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! # fn main() -> modbus_monitor::Result<()> {
//! let table = DescriptorTable::single(
//!     DatasetDescriptor::new(30775, ElementType::S32, FormatKind::Fix0)
//!         .with_description("AC power"),
//! )?;
//! let sink = CsvLogSink::new("pv.csv", table.clone()).with_daily_files(true);
//! sink.probe()?;
//!
//! let config = PollerConfig::default()
//!     .with_interval(Duration::from_secs(10))
//!     .with_buffer_threshold(30);
//! let client = Client::new(ClientConfig::new(Ipv4Addr::new(192, 168, 1, 50)));
//! let handle = Poller::new(client, sink, table, config)?.spawn()?;
//!
//! // ... later
//! let (_poller, result) = handle.stop();
//! result?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every error carries an [`ErrorClass`] telling how the poller recovers.
//!
//! ```no_run
//! use modbus_monitor::{Client, ClientConfig, ErrorClass, MonitorError, Transport};
//! use std::net::Ipv4Addr;
//!
//! let mut client = Client::new(ClientConfig::new(Ipv4Addr::new(192, 168, 1, 50)));
//! client.connect()?;
//!
//! match client.read_registers(30775, 2) {
//!     Ok(words) => println!("Words: {:?}", words),
//!     Err(MonitorError::Exception { code, .. }) => println!("Device refused: 0x{:02X}", code),
//!     Err(e) if e.class() == ErrorClass::Read => println!("Read failed: {}", e),
//!     Err(e) => return Err(e),
//! }
//! # Ok::<(), MonitorError>(())
//! ```
//!
//! ## Logging
//!
//! The library reports through [`tracing`] and installs no subscriber.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod bank;
mod buffer;
mod client;
mod decode;
mod descriptor;
mod error;
mod format;
mod header;
mod poller;
mod request;
mod response;
mod sample;
mod sink;
mod transport;

// Re-exports
pub use bank::RegisterBank;
pub use buffer::{SampleBuffer, DEFAULT_BUFFER_THRESHOLD};
pub use client::{Client, ClientConfig, DEFAULT_UNIT_ID};
pub use decode::{decode, DecodedValue, Scalar, NO_DATA_SIGNED, NO_DATA_UNSIGNED};
pub use descriptor::{DatasetDescriptor, DescriptorTable, ElementType, FormatKind};
pub use error::{exception_description, ErrorClass, MonitorError, Result};
pub use format::{format_value, FormattedValue};
pub use header::{MbapHeader, MBAP_HEADER_SIZE};
pub use poller::{
    CycleReport, Fault, PollEvent, PollHandle, PollMode, PollState, Poller, PollerConfig,
    DEFAULT_INTERVAL, MIN_INTERVAL,
};
pub use request::{ReadRegistersRequest, MAX_REGISTERS_PER_READ};
pub use response::ModbusResponse;
pub use sample::{SampleVector, TIMESTAMP_FORMAT};
pub use sink::{ConsoleSink, CsvLogSink, OutputSink};
pub use transport::{TcpTransport, Transport, DEFAULT_MODBUS_PORT, DEFAULT_TIMEOUT, MAX_FRAME_SIZE};
