//! Recipient acceptance policy

use crate::smtp::address::Address;
use crate::smtp::session::SmtpSession;

/// Decides whether a `RCPT TO` address is accepted
pub trait RecipientFilter: Send + Sync {
    fn accept_recipient(&self, session: &SmtpSession, recipient: &Address) -> bool;
}

/// Accepts recipients whose domain equals the local domain, ignoring case
#[derive(Debug, Clone)]
pub struct LocalRecipientFilter {
    domain: String,
}

impl LocalRecipientFilter {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_lowercase(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl RecipientFilter for LocalRecipientFilter {
    fn accept_recipient(&self, _session: &SmtpSession, recipient: &Address) -> bool {
        recipient.domain().to_lowercase() == self.domain
    }
}

/// Accepts every recipient
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl RecipientFilter for AcceptAllFilter {
    fn accept_recipient(&self, _session: &SmtpSession, _recipient: &Address) -> bool {
        true
    }
}

impl<F> RecipientFilter for F
where
    F: Fn(&SmtpSession, &Address) -> bool + Send + Sync,
{
    fn accept_recipient(&self, session: &SmtpSession, recipient: &Address) -> bool {
        self(session, recipient)
    }
}
