//! # spoolmail
//!
//! spoolmail is an embeddable SMTP receiving engine.
//!
//! It accepts inbound mail over any line-oriented byte stream, enforces the
//! classic SMTP command sequence, parses the message headers and
//! `multipart/mixed` structure, and hands each finished message to a
//! pluggable spool.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spoolmail::{MemoryMessageSpool, MessageSpool, SmtpProcessor, SmtpServer};
//! use std::sync::Arc;
//! use std::thread;
//!
//! // Accept mail for example.com and keep it in memory
//! let spool = Arc::new(MemoryMessageSpool::new());
//! let server = SmtpServer::new(SmtpProcessor::new("example.com", spool.clone()));
//!
//! thread::spawn(move || server.start("127.0.0.1:2525"));
//!
//! // Application sends email to localhost:2525
//! // ...
//!
//! while let Some(message) = spool.next_message() {
//!     println!("Received email with subject {:?}", message.subject());
//! }
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` - Identify the sender
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify a recipient (multiple recipients are supported)
//! - `DATA` - Send the message, ended by a line holding a single `.`
//! - `RSET` - Reset the current transaction
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! ## Extension points
//!
//! - [`RecipientFilter`] decides which `RCPT TO` addresses are accepted.
//!   [`LocalRecipientFilter`] accepts a single domain, and any
//!   `Fn(&SmtpSession, &Address) -> bool` closure works as a filter.
//! - [`MessageSpool`] receives finished messages. [`MemoryMessageSpool`] is
//!   a FIFO queue held in memory.
//! - [`Connection`] abstracts the transport, so sessions can run over
//!   anything readable and writable, not just TCP.
//!
//! ## Notes
//!
//! - ESMTP (`EHLO` and extensions) is not supported.
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.
//! - Mail relay is not supported.
//! - Message lines are stored as received; dot-stuffing is not undone.
//! - Quoted-printable bodies are decoded only on request, see
//!   [`MessagePart::decoded_body`].

pub mod config;
pub mod logging;
pub mod smtp;

pub use config::{Config, ConfigError};
pub use smtp::{
    AcceptAllFilter, Address, AddressError, Connection, ConnectionId, Headers, LocalRecipientFilter,
    MemoryMessageSpool, Message, MessagePart, MessageSpool, RecipientFilter, SmtpContext,
    SmtpError, SmtpProcessor, SmtpResponse, SmtpServer, SmtpSession, SmtpState,
};
