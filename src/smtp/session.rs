//! SMTP session state management

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::smtp::address::Address;
use crate::smtp::message::Message;

/// Commands understood by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpCommand {
    Helo,
    Rset,
    Noop,
    Quit,
    Mail,
    Rcpt,
    Data,
}

/// The last successful command, which alone decides what may come next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Initial state - waiting for HELO
    Initial,
    /// HELO received, or a transaction was reset - ready for MAIL
    Helo,
    /// MAIL FROM received - ready for RCPT
    Mail,
    /// At least one RCPT TO accepted - ready for DATA or more RCPT
    Rcpt,
}

/// Unique, monotonically assigned identifier of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out connection ids; shared by every session of a processor
#[derive(Debug)]
pub struct ConnectionIds {
    next: AtomicU64,
}

impl ConnectionIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Manages the state and data for a single SMTP session
#[derive(Debug)]
pub struct SmtpSession {
    connection_id: ConnectionId,
    peer: Option<SocketAddr>,
    state: SmtpState,
    /// Client domain from HELO command
    client_domain: Option<String>,
    message: Message,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new(connection_id: ConnectionId, peer: Option<SocketAddr>) -> Self {
        Self {
            connection_id,
            peer,
            state: SmtpState::Initial,
            client_domain: None,
            message: Message::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Address of the connected client, when the transport knows it
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    /// The message of the transaction in progress
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// Discard the transaction in progress. A completed HELO stays valid.
    pub fn reset(&mut self) {
        self.message = Message::new();
        self.state = SmtpState::Helo;
    }

    /// Finish the transaction, returning its message and resetting the session
    pub fn take_message(&mut self) -> Message {
        let message = std::mem::take(&mut self.message);
        self.state = SmtpState::Helo;
        message
    }

    /// Record the client domain from HELO
    pub fn set_client_domain(&mut self, domain: String) {
        self.client_domain = Some(domain);
        self.state = SmtpState::Helo;
    }

    /// Set the sender address
    pub fn set_sender(&mut self, sender: Address) {
        self.message.set_from_address(sender);
        self.state = SmtpState::Mail;
    }

    /// Add an accepted recipient address
    pub fn add_recipient(&mut self, recipient: Address) {
        self.message.add_to_address(recipient);
        self.state = SmtpState::Rcpt;
    }

    /// Check if the session is ready for a specific command
    pub fn can_execute(&self, command: SmtpCommand) -> bool {
        match command {
            SmtpCommand::Helo => self.state == SmtpState::Initial,
            SmtpCommand::Rset => self.state != SmtpState::Initial,
            SmtpCommand::Noop | SmtpCommand::Quit => true,
            SmtpCommand::Mail => self.state == SmtpState::Helo,
            SmtpCommand::Rcpt => matches!(self.state, SmtpState::Mail | SmtpState::Rcpt),
            SmtpCommand::Data => self.state == SmtpState::Rcpt,
        }
    }

    pub fn recipient_count(&self) -> usize {
        self.message.to_addresses().len()
    }
}
