//! Implementation of SMTP commands

use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::smtp::address::Address;
use crate::smtp::error::SmtpError;
use crate::smtp::filter::RecipientFilter;
use crate::smtp::response::{SmtpResponse, render_template};
use crate::smtp::session::{SmtpCommand, SmtpSession};

static BRACKETED_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(\S+@\S+)>").expect("valid address regex"));

/// What the session loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Send the reply and read the next command
    Reply(SmtpResponse),
    /// Reply 354 and collect message lines
    BeginData,
    /// Reply 221 and close the connection
    Quit,
}

/// Handles SMTP commands and returns appropriate responses
pub struct SmtpCommandHandler<'a> {
    domain: &'a str,
    helo_response: &'a str,
    filter: &'a dyn RecipientFilter,
}

impl<'a> SmtpCommandHandler<'a> {
    /// Create a new command handler
    pub fn new(domain: &'a str, helo_response: &'a str, filter: &'a dyn RecipientFilter) -> Self {
        Self {
            domain,
            helo_response,
            filter,
        }
    }

    /// Process a command line and decide the outcome.
    ///
    /// Errors are per-command failures the caller answers with
    /// [`SmtpError::to_response`]; the session stays usable after them.
    pub fn process_command(
        &self,
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<CommandOutcome, SmtpError> {
        let parts: Vec<&str> = command_line.split_whitespace().collect();
        let Some(keyword) = parts.first() else {
            return Err(SmtpError::InvalidCommand);
        };

        match keyword.to_lowercase().as_str() {
            "helo" => self.handle_helo(&parts, session),
            "rset" => self.handle_rset(session),
            "noop" => Ok(CommandOutcome::Reply(SmtpResponse::ok())),
            "quit" => Ok(CommandOutcome::Quit),
            "mail" => self.handle_mail(&parts, command_line, session),
            "rcpt" => self.handle_rcpt(&parts, command_line, session),
            "data" => self.handle_data(session),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    /// Handle HELO command
    fn handle_helo(
        &self,
        parts: &[&str],
        session: &mut SmtpSession,
    ) -> Result<CommandOutcome, SmtpError> {
        if !session.can_execute(SmtpCommand::Helo) {
            return Err(SmtpError::InvalidState);
        }

        let [_, client_domain] = parts else {
            return Err(SmtpError::InvalidArguments);
        };

        let reply = render_template(self.helo_response, self.domain, client_domain);
        session.set_client_domain((*client_domain).to_owned());
        debug!(connection_id = %session.connection_id(), client = %client_domain, "HELO accepted");

        Ok(CommandOutcome::Reply(SmtpResponse::helo(&reply)))
    }

    /// Handle RSET command
    fn handle_rset(&self, session: &mut SmtpSession) -> Result<CommandOutcome, SmtpError> {
        if !session.can_execute(SmtpCommand::Rset) {
            return Err(SmtpError::InvalidState);
        }

        session.reset();
        Ok(CommandOutcome::Reply(SmtpResponse::ok()))
    }

    /// Handle MAIL command
    fn handle_mail(
        &self,
        parts: &[&str],
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<CommandOutcome, SmtpError> {
        let argument = sub_command_argument(parts, command_line, "from")?;

        if !session.can_execute(SmtpCommand::Mail) {
            return Err(SmtpError::InvalidState);
        }

        let address = parse_bracketed_address(argument).inspect_err(|e| {
            debug!(connection_id = %session.connection_id(), %argument, "MAIL FROM rejected: {e}");
        })?;

        debug!(connection_id = %session.connection_id(), from = %address, "MAIL FROM accepted");
        session.set_sender(address);

        Ok(CommandOutcome::Reply(SmtpResponse::ok()))
    }

    /// Handle RCPT command
    fn handle_rcpt(
        &self,
        parts: &[&str],
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<CommandOutcome, SmtpError> {
        let argument = sub_command_argument(parts, command_line, "to")?;

        if !session.can_execute(SmtpCommand::Rcpt) {
            return Err(SmtpError::InvalidState);
        }

        let address = parse_bracketed_address(argument).inspect_err(|e| {
            debug!(connection_id = %session.connection_id(), %argument, "RCPT TO rejected: {e}");
        })?;

        let accepted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.filter.accept_recipient(session, &address)
        }))
        .map_err(|_| SmtpError::Transaction("recipient filter panicked".to_owned()))?;

        if !accepted {
            info!(connection_id = %session.connection_id(), to = %address, "RCPT TO rejected by recipient filter");
            return Err(SmtpError::RecipientRejected(address.into_string()));
        }

        debug!(connection_id = %session.connection_id(), to = %address, "RCPT TO accepted");
        session.add_recipient(address);

        Ok(CommandOutcome::Reply(SmtpResponse::ok()))
    }

    /// Handle DATA command
    fn handle_data(&self, session: &SmtpSession) -> Result<CommandOutcome, SmtpError> {
        if !session.can_execute(SmtpCommand::Data) {
            return Err(SmtpError::InvalidState);
        }

        Ok(CommandOutcome::BeginData)
    }
}

/// Check that the token after the keyword starts with `sub_keyword`, and
/// return everything after the keyword
fn sub_command_argument<'l>(
    parts: &[&str],
    command_line: &'l str,
    sub_keyword: &str,
) -> Result<&'l str, SmtpError> {
    let starts_with_sub_keyword = parts
        .get(1)
        .is_some_and(|token| token.to_lowercase().starts_with(sub_keyword));
    if !starts_with_sub_keyword {
        return Err(SmtpError::InvalidCommand);
    }

    let keyword_end = command_line
        .trim_start()
        .find(char::is_whitespace)
        .ok_or(SmtpError::InvalidCommand)?;
    Ok(command_line.trim_start()[keyword_end..].trim())
}

/// Find the first `<user@domain>` token in `argument` and validate it
pub fn parse_bracketed_address(argument: &str) -> Result<Address, SmtpError> {
    let captures = BRACKETED_ADDRESS
        .captures(argument)
        .ok_or_else(|| SmtpError::AddressNotFound(argument.to_owned()))?;
    Ok(Address::parse(&captures[1])?)
}
