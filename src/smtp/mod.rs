//! SMTP receiving engine

pub mod address;
pub mod commands;
pub mod context;
pub mod error;
pub mod filter;
pub mod message;
pub mod mime;
pub mod processor;
pub mod quoted_printable;
pub mod response;
pub mod server;
pub mod session;
pub mod spool;

#[cfg(test)]
mod testing;

pub use address::{Address, AddressError};
pub use context::{Connection, SmtpContext};
pub use error::SmtpError;
pub use filter::{AcceptAllFilter, LocalRecipientFilter, RecipientFilter};
pub use message::Message;
pub use mime::{Headers, MessagePart};
pub use processor::SmtpProcessor;
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{ConnectionId, SmtpSession, SmtpState};
pub use spool::{MemoryMessageSpool, MessageSpool};
