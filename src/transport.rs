//! Transport contract and the TCP socket layer.
//!
//! [`Transport`] is what the poller talks to: connect, read a block of
//! registers, close. [`Client`](crate::Client) implements it for Modbus TCP.
//!
//! [`TcpTransport`] is the byte layer underneath the client. It only knows
//! about sockets and MBAP framing: it writes a request and reads back one
//! complete frame, using the header's length field to know where it ends.
//!
//! # Constants
//!
//! - [`DEFAULT_MODBUS_PORT`] - Default Modbus TCP port (502)
//! - [`DEFAULT_TIMEOUT`] - Default timeout (2 seconds)
//! - [`MAX_FRAME_SIZE`] - Maximum Modbus TCP frame size (260 bytes)

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{MonitorError, Result};
use crate::header::{MbapHeader, MBAP_HEADER_SIZE};

/// Default Modbus TCP port.
pub const DEFAULT_MODBUS_PORT: u16 = 502;

/// Default timeout for connect, send and receive.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum Modbus TCP frame size: MBAP header (7) + PDU (253).
pub const MAX_FRAME_SIZE: usize = 260;

/// Source of raw register words.
///
/// Implementations must bound every call with a timeout; the poller treats a
/// slow device as a failed read, not as a reason to wait.
pub trait Transport {
    /// Opens the connection to the device.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Connection` if the device cannot be reached.
    fn connect(&mut self) -> Result<()>;

    /// Returns whether a connection is currently open.
    fn is_connected(&self) -> bool;

    /// Reads `count` consecutive registers starting at `address`.
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;

    /// Closes the connection. Closing a closed transport is a no-op.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        (**self).read_registers(address, count)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Blocking TCP connection to a Modbus device.
pub struct TcpTransport {
    stream: TcpStream,
    remote_addr: SocketAddr,
}

impl TcpTransport {
    /// Connects to the device at `addr`.
    ///
    /// The timeout bounds the connect itself and every later read and write.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Connection` if the connection cannot be
    /// established, or an I/O error if the socket cannot be configured.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| MonitorError::connection(addr.to_string(), e.to_string()))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            remote_addr: addr,
        })
    }

    /// Sends a request frame.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).map_err(map_io_error)
    }

    /// Receives one complete response frame.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Timeout` if the device stays silent, and
    /// `MonitorError::Framing` if the header is malformed or announces a
    /// frame larger than [`MAX_FRAME_SIZE`]. The stream cannot be trusted
    /// after a framing error.
    pub fn receive(&mut self) -> Result<Vec<u8>> {
        let mut frame = vec![0u8; MBAP_HEADER_SIZE];
        self.stream.read_exact(&mut frame).map_err(map_io_error)?;

        let header = MbapHeader::from_bytes(&frame).map_err(|e| match e {
            MonitorError::InvalidResponse { reason } => MonitorError::framing(reason),
            other => other,
        })?;
        let total = MBAP_HEADER_SIZE + header.pdu_len();
        if total > MAX_FRAME_SIZE {
            return Err(MonitorError::framing(format!(
                "frame of {} bytes exceeds the {} byte limit",
                total, MAX_FRAME_SIZE
            )));
        }

        frame.resize(total, 0);
        self.stream
            .read_exact(&mut frame[MBAP_HEADER_SIZE..])
            .map_err(map_io_error)?;
        Ok(frame)
    }

    /// Sends a request and receives the next frame.
    pub fn send_receive(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.send(data)?;
        self.receive()
    }

    /// Returns the remote device address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Shuts the socket down in both directions.
    pub fn shutdown(&self) {
        // The peer may already have closed; nothing left to report then.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

fn map_io_error(e: std::io::Error) -> MonitorError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => MonitorError::Timeout,
        _ => MonitorError::Io(e),
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("remote_addr", &self.remote_addr)
            .field("local_addr", &self.stream.local_addr().ok())
            .finish()
    }
}
