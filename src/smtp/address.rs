//! Mailbox addresses accepted on `MAIL FROM` and `RCPT TO`

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Shortest plausible domain, e.g. `a.com`.
pub const MIN_DOMAIN_LENGTH: usize = 5;

/// Characters that may appear in neither the username nor the domain.
pub const ILLEGAL_CHARACTERS: &[char] = &[
    '[', ']', '(', ')', '@', '>', '<', '"', ',', ';', ':', '\\',
];

/// Reasons an address fails validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be formatted as username@domain")]
    NoAt,

    #[error("address contains more than one '@'")]
    MultipleAt,

    #[error("username must be at least one character")]
    EmptyUsername,

    #[error("domain must be at least {} characters", MIN_DOMAIN_LENGTH)]
    DomainTooShort,

    #[error("address contains the illegal character {0:?}")]
    IllegalCharacters(char),
}

/// A validated `username@domain` mailbox.
///
/// An `Address` can only be obtained through [`Address::parse`] or
/// [`Address::from_parts`], so holding one means the value passed
/// validation. It is immutable afterwards. No case folding is applied:
/// comparison and formatting use the exact input text.
///
/// Usernames are allowed to contain spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    full: String,
    at: usize,
}

impl Address {
    /// Parse a combined `username@domain` string
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let mut pieces = address.split('@');
        match (pieces.next(), pieces.next(), pieces.next()) {
            (Some(username), Some(domain), None) => Self::from_parts(username, domain),
            (_, None, _) => Err(AddressError::NoAt),
            _ => Err(AddressError::MultipleAt),
        }
    }

    /// Build an address from a separate username and domain
    pub fn from_parts(username: &str, domain: &str) -> Result<Self, AddressError> {
        if username.is_empty() {
            return Err(AddressError::EmptyUsername);
        }
        if domain.chars().count() < MIN_DOMAIN_LENGTH {
            return Err(AddressError::DomainTooShort);
        }
        check_characters(username)?;
        check_characters(domain)?;

        Ok(Self {
            full: format!("{username}@{domain}"),
            at: username.len(),
        })
    }

    /// Everything before the `@`
    pub fn username(&self) -> &str {
        &self.full[..self.at]
    }

    /// Everything after the `@`
    pub fn domain(&self) -> &str {
        &self.full[self.at + 1..]
    }

    /// The whole address, `username@domain`
    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn into_string(self) -> String {
        self.full
    }
}

fn check_characters(part: &str) -> Result<(), AddressError> {
    match part.chars().find(|c| ILLEGAL_CHARACTERS.contains(c)) {
        Some(c) => Err(AddressError::IllegalCharacters(c)),
        None => Ok(()),
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.full
    }
}
