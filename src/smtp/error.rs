//! Error types for the SMTP server

use thiserror::Error;

use crate::smtp::address::AddressError;
use crate::smtp::response::SmtpResponse;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Command unrecognized")]
    InvalidCommand,

    #[error("Command not allowed here")]
    InvalidState,

    #[error("Incorrect number of arguments")]
    InvalidArguments,

    #[error("No address found in {0:?}")]
    AddressNotFound(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Recipient rejected: {0}")]
    RecipientRejected(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),
}

/// Maps SMTP errors to appropriate response codes
impl SmtpError {
    pub fn to_response_code(&self) -> u16 {
        match self {
            SmtpError::Io(_) | SmtpError::ConnectionClosed => 421,
            SmtpError::InvalidCommand => 500,
            SmtpError::InvalidArguments => 501,
            SmtpError::InvalidState => 503,
            SmtpError::AddressNotFound(_) | SmtpError::InvalidAddress(_) => 451,
            SmtpError::RecipientRejected(_) => 550,
            SmtpError::Transaction(_) => 554,
        }
    }

    pub fn to_response_message(&self) -> &'static str {
        match self {
            SmtpError::Io(_) | SmtpError::ConnectionClosed => "Service not available",
            SmtpError::InvalidCommand => "Command Unrecognized",
            SmtpError::InvalidArguments => "Incorrect number of arguments",
            SmtpError::InvalidState => "Command not allowed here",
            SmtpError::AddressNotFound(_) | SmtpError::InvalidAddress(_) => "Address is invalid",
            SmtpError::RecipientRejected(_) => "User does not exist",
            SmtpError::Transaction(_) => "Transaction failed",
        }
    }

    pub fn to_response(&self) -> SmtpResponse {
        SmtpResponse::new(self.to_response_code(), self.to_response_message())
    }
}
