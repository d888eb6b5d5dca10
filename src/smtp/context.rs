//! Per-connection I/O: CRLF line framing over any byte stream

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use memchr::memmem;
use tracing::trace;

use crate::smtp::error::SmtpError;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{ConnectionId, SmtpSession};

const READ_CHUNK: usize = 4096;

/// A bidirectional byte stream a session can run over
pub trait Connection: Read + Write {
    /// Address of the remote end, if the transport has one
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Close the stream in both directions
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}

/// A connection together with its session and unconsumed input
pub struct SmtpContext<C: Connection> {
    connection: C,
    session: SmtpSession,
    buffer: Vec<u8>,
    // Prefix of `buffer` already searched for CRLF
    scanned: usize,
    closed: bool,
}

impl<C: Connection> SmtpContext<C> {
    pub fn new(connection: C, connection_id: ConnectionId) -> Self {
        let peer = connection.peer_addr();
        Self {
            connection,
            session: SmtpSession::new(connection_id, peer),
            buffer: Vec::new(),
            scanned: 0,
            closed: false,
        }
    }

    pub fn session(&self) -> &SmtpSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SmtpSession {
        &mut self.session
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.session.connection_id()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read the next CRLF-terminated line, without its terminator.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream or the read
    /// timed out. Bytes after the returned line stay buffered for the next
    /// call; a trailing fragment without CRLF is dropped at end of stream.
    pub fn read_line(&mut self) -> Result<Option<String>, SmtpError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            // Back up one byte so a CR at the end of the last chunk still pairs
            let start = self.scanned.saturating_sub(1);
            if let Some(offset) = memmem::find(&self.buffer[start..], b"\r\n") {
                let end = start + offset;
                let line = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
                self.buffer.drain(..end + 2);
                self.scanned = 0;
                trace!(target: "spoolmail::io", connection_id = %self.connection_id(), "C: {line}");
                return Ok(Some(line));
            }
            self.scanned = self.buffer.len();

            if self.closed {
                return Ok(None);
            }

            match self.connection.read(&mut chunk) {
                Ok(0) => {
                    self.buffer.clear();
                    self.scanned = 0;
                    return Ok(None);
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    trace!(target: "spoolmail::io", connection_id = %self.connection_id(), "read timed out");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write `line` followed by CRLF
    pub fn write_line(&mut self, line: &str) -> Result<(), SmtpError> {
        trace!(target: "spoolmail::io", connection_id = %self.connection_id(), "S: {line}");
        self.connection.write_all(line.as_bytes())?;
        self.connection.write_all(b"\r\n")?;
        self.connection.flush()?;
        Ok(())
    }

    pub fn write_response(&mut self, response: &SmtpResponse) -> Result<(), SmtpError> {
        self.write_line(&response.line())
    }

    /// Drop the transaction in progress, keeping the HELO
    pub fn reset(&mut self) {
        self.session.reset();
    }

    /// Shut the connection down; later reads report end of stream
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.buffer.clear();
        self.scanned = 0;
        if let Err(e) = self.connection.shutdown() {
            trace!(target: "spoolmail::io", connection_id = %self.connection_id(), "shutdown failed: {e}");
        }
    }
}
