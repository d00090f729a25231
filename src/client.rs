//! Modbus TCP client.
//!
//! [`Client`] turns register reads into request frames, correlates replies by
//! transaction ID, and validates what comes back. It implements
//! [`Transport`], which is all the poller needs from it.
//!
//! # Example
//!
//! ```no_run
//! use modbus_monitor::{Client, ClientConfig, Transport};
//! use std::net::Ipv4Addr;
//!
//! let config = ClientConfig::new(Ipv4Addr::new(10, 0, 0, 42)).with_unit_id(3);
//! let mut client = Client::new(config);
//! client.connect()?;
//!
//! // Two registers holding a U32 at 30775
//! let words = client.read_registers(30775, 2)?;
//! println!("{:?}", words);
//! client.close();
//! # Ok::<(), modbus_monitor::MonitorError>(())
//! ```
//!
//! # Connection handling
//!
//! The client never reconnects on its own. A timeout, a socket error or an
//! unreadable frame boundary drops the connection, and every later read
//! fails with [`MonitorError::NotConnected`] until [`Transport::connect`] is
//! called again. The poller does that at the start of its next tick.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::bank::RegisterBank;
use crate::error::{MonitorError, Result};
use crate::request::ReadRegistersRequest;
use crate::response::ModbusResponse;
use crate::transport::{TcpTransport, Transport, DEFAULT_MODBUS_PORT, DEFAULT_TIMEOUT};

/// Default unit ID of the polled device.
pub const DEFAULT_UNIT_ID: u8 = 3;

/// Replies with a foreign transaction ID skipped before giving up.
const MAX_STALE_FRAMES: usize = 3;

/// Configuration for creating a Modbus client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Device address and port.
    pub device_addr: SocketAddr,
    /// Unit ID sent with every request.
    pub unit_id: u8,
    /// Register bank read by [`Transport::read_registers`].
    pub bank: RegisterBank,
    /// Connect, send and receive timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration with the default port (502), unit ID (3),
    /// timeout (2 s) and the input register bank.
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::ClientConfig;
    /// use std::net::Ipv4Addr;
    ///
    /// let config = ClientConfig::new(Ipv4Addr::new(10, 0, 0, 42));
    /// assert_eq!(config.device_addr.port(), 502);
    /// assert_eq!(config.unit_id, 3);
    /// ```
    pub fn new(ip: impl Into<IpAddr>) -> Self {
        Self {
            device_addr: SocketAddr::new(ip.into(), DEFAULT_MODBUS_PORT),
            unit_id: DEFAULT_UNIT_ID,
            bank: RegisterBank::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets a custom port (default is 502).
    pub fn with_port(mut self, port: u16) -> Self {
        self.device_addr.set_port(port);
        self
    }

    /// Sets the unit ID (default is 3).
    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    /// Sets the register bank (default is input registers).
    pub fn with_bank(mut self, bank: RegisterBank) -> Self {
        self.bank = bank;
        self
    }

    /// Sets a custom timeout (default is 2 seconds).
    ///
    /// # Example
    ///
    /// ```
    /// use modbus_monitor::ClientConfig;
    /// use std::net::Ipv4Addr;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new(Ipv4Addr::LOCALHOST)
    ///     .with_port(1502)
    ///     .with_timeout(Duration::from_millis(500));
    /// assert_eq!(config.timeout, Duration::from_millis(500));
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Modbus TCP client.
///
/// Each read produces exactly one request. No retries, no caching.
pub struct Client {
    config: ClientConfig,
    transport: Option<TcpTransport>,
    transaction_counter: AtomicU16,
}

impl Client {
    /// Creates a client. No connection is made until [`Transport::connect`].
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            transaction_counter: AtomicU16::new(0),
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Generates the next transaction ID.
    fn next_transaction_id(&self) -> u16 {
        self.transaction_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends a request and returns the reply carrying its transaction ID.
    ///
    /// Replies to earlier, timed-out requests may still be queued on the
    /// stream; those are skipped.
    fn exchange(&mut self, request: &ReadRegistersRequest) -> Result<ModbusResponse> {
        let transport = self.transport.as_mut().ok_or(MonitorError::NotConnected)?;
        transport.send(&request.to_bytes())?;

        let expected = request.transaction_id();
        for _ in 0..MAX_STALE_FRAMES {
            let response = ModbusResponse::from_bytes(&transport.receive()?)?;
            if response.check_transaction(expected).is_ok() {
                return Ok(response);
            }
            debug!(
                expected,
                received = response.header.transaction_id,
                "skipping stale reply"
            );
        }

        let response = ModbusResponse::from_bytes(&transport.receive()?)?;
        response.check_transaction(expected)?;
        Ok(response)
    }

    fn read_block(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let request = ReadRegistersRequest::new(
            self.next_transaction_id(),
            self.config.unit_id,
            self.config.bank,
            address,
            count,
        )?;

        let response = self.exchange(&request)?;
        response.check_exception()?;
        response.check_function(request.function())?;

        let words = response.to_words()?;
        if words.len() != usize::from(count) {
            return Err(MonitorError::invalid_response(format!(
                "requested {} registers, received {}",
                count,
                words.len()
            )));
        }
        Ok(words)
    }
}

impl Transport for Client {
    fn connect(&mut self) -> Result<()> {
        if let Some(old) = self.transport.take() {
            old.shutdown();
        }
        let transport = TcpTransport::connect(self.config.device_addr, self.config.timeout)?;
        debug!(addr = %self.config.device_addr, "connected");
        self.transport = Some(transport);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let result = self.read_block(address, count);
        if let Err(e) = &result {
            if e.breaks_connection() {
                debug!(addr = %self.config.device_addr, error = %e, "dropping connection");
                self.close();
            }
        }
        result
    }

    fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("device_addr", &self.config.device_addr)
            .field("unit_id", &self.config.unit_id)
            .field("bank", &self.config.bank)
            .field("connected", &self.transport.is_some())
            .finish()
    }
}
