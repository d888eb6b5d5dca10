//! The SMTP session loop and the DATA sub-protocol

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, error, info, info_span, warn};

use crate::config::Config;
use crate::smtp::commands::{CommandOutcome, SmtpCommandHandler};
use crate::smtp::context::{Connection, SmtpContext};
use crate::smtp::error::SmtpError;
use crate::smtp::filter::{LocalRecipientFilter, RecipientFilter};
use crate::smtp::response::{SmtpResponse, render_template};
use crate::smtp::spool::MessageSpool;
use crate::smtp::session::ConnectionIds;

pub const DEFAULT_WELCOME_MESSAGE: &str = "{domain} SMTP spoolmail ready";
pub const DEFAULT_HELO_RESPONSE: &str = "{domain}";

/// Runs SMTP sessions over connections and hands finished messages to a spool.
///
/// One processor is shared by every connection of a server; each call to
/// [`SmtpProcessor::handle`] serves a single connection until QUIT or
/// end of stream.
pub struct SmtpProcessor {
    domain: String,
    welcome_message: String,
    helo_response: String,
    filter: Arc<dyn RecipientFilter>,
    spool: Arc<dyn MessageSpool>,
    connection_ids: ConnectionIds,
}

impl SmtpProcessor {
    /// Accept recipients of `domain` only
    pub fn new(domain: &str, spool: Arc<dyn MessageSpool>) -> Self {
        Self::with_filter(domain, Arc::new(LocalRecipientFilter::new(domain)), spool)
    }

    pub fn with_filter(
        domain: &str,
        filter: Arc<dyn RecipientFilter>,
        spool: Arc<dyn MessageSpool>,
    ) -> Self {
        Self {
            domain: domain.to_owned(),
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_owned(),
            helo_response: DEFAULT_HELO_RESPONSE.to_owned(),
            filter,
            spool,
            connection_ids: ConnectionIds::new(),
        }
    }

    pub fn from_config(config: &Config, spool: Arc<dyn MessageSpool>) -> Self {
        let filter = Arc::new(LocalRecipientFilter::new(config.local_domain()));
        Self::with_filter(&config.domain, filter, spool)
            .with_welcome_message(&config.welcome_message)
            .with_helo_response(&config.helo_response)
    }

    /// Greeting text sent with `220`; `{domain}` expands to the server domain
    pub fn with_welcome_message(mut self, template: &str) -> Self {
        self.welcome_message = template.to_owned();
        self
    }

    /// HELO reply text sent with `250`; expands `{domain}` and `{client}`
    pub fn with_helo_response(mut self, template: &str) -> Self {
        self.helo_response = template.to_owned();
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn spool(&self) -> &Arc<dyn MessageSpool> {
        &self.spool
    }

    /// Serve one connection to completion, then close it
    pub fn handle<C: Connection>(&self, connection: C) {
        let connection_id = self.connection_ids.next_id();
        let span = info_span!("session", %connection_id);
        let _enter = span.enter();

        let mut context = SmtpContext::new(connection, connection_id);
        debug!(%connection_id, peer = ?context.session().peer(), "connection opened");

        match self.run(&mut context) {
            Ok(()) | Err(SmtpError::ConnectionClosed) => {}
            Err(e) => debug!(%connection_id, "session aborted: {e}"),
        }

        context.close();
        debug!(%connection_id, "connection closed");
    }

    fn run<C: Connection>(&self, context: &mut SmtpContext<C>) -> Result<(), SmtpError> {
        let welcome = render_template(&self.welcome_message, &self.domain, "");
        context.write_response(&SmtpResponse::greeting(&welcome))?;

        let handler = SmtpCommandHandler::new(&self.domain, &self.helo_response, self.filter.as_ref());

        while let Some(line) = context.read_line()? {
            match handler.process_command(&line, context.session_mut()) {
                Ok(CommandOutcome::Reply(response)) => context.write_response(&response)?,
                Ok(CommandOutcome::BeginData) => {
                    context.write_response(&SmtpResponse::data_start())?;
                    self.receive_data(context)?;
                }
                Ok(CommandOutcome::Quit) => {
                    context.write_response(&SmtpResponse::quit())?;
                    break;
                }
                Err(e) => {
                    if matches!(e, SmtpError::Transaction(_)) {
                        error!(connection_id = %context.connection_id(), %line, "failed to process command: {e}");
                    }
                    context.write_response(&e.to_response())?;
                }
            }
        }

        Ok(())
    }

    /// Collect message lines up to the lone `.`, then spool the message
    fn receive_data<C: Connection>(&self, context: &mut SmtpContext<C>) -> Result<(), SmtpError> {
        let trace_header = self.received_header(context);
        context.session_mut().message_mut().append_data(&trace_header);

        loop {
            let Some(line) = context.read_line()? else {
                debug!(connection_id = %context.connection_id(), "stream ended during DATA, message discarded");
                return Err(SmtpError::ConnectionClosed);
            };
            if line == "." {
                break;
            }
            let message = context.session_mut().message_mut();
            message.append_data(&line);
            message.append_data("\r\n");
        }

        let connection_id = context.connection_id();
        let message = context.session_mut().take_message();
        let from = message
            .from_address()
            .map(ToString::to_string)
            .unwrap_or_default();
        let recipients = message.to_addresses().len();
        let size = message.data_size();

        match panic::catch_unwind(AssertUnwindSafe(|| self.spool.spool(message))) {
            Ok(true) => info!(%connection_id, %from, recipients, size, "message spooled"),
            Ok(false) => warn!(%connection_id, %from, recipients, size, "spool did not keep the message"),
            Err(_) => {
                let e = SmtpError::Transaction("message spool panicked".to_owned());
                error!(%connection_id, %from, "{e}");
                return context.write_response(&e.to_response());
            }
        }

        context.write_response(&SmtpResponse::ok())
    }

    fn received_header<C: Connection>(&self, context: &SmtpContext<C>) -> String {
        let session = context.session();
        let client = session.client_domain().unwrap_or("unknown");
        let ip = session
            .peer()
            .map_or_else(|| "unknown".to_owned(), |peer| peer.ip().to_string());

        format!(
            "Received: from {client} ({client} [{ip}])\r\n     by {domain} (spoolmail)\r\n     {date}\r\n",
            domain = self.domain,
            date = Local::now().to_rfc2822(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::address::Address;
    use crate::smtp::filter::AcceptAllFilter;
    use crate::smtp::message::Message;
    use crate::smtp::session::SmtpSession;
    use crate::smtp::spool::MemoryMessageSpool;
    use crate::smtp::testing::ScriptedConnection;
    use pretty_assertions::assert_eq;

    const LOCAL_DOMAIN: &str = "localdomain.com";

    fn processor(spool: &Arc<MemoryMessageSpool>) -> SmtpProcessor {
        SmtpProcessor::new(LOCAL_DOMAIN, spool.clone())
    }

    fn converse(processor: &SmtpProcessor, input: &str) -> ScriptedConnection {
        let mut connection =
            ScriptedConnection::new(input).with_peer("192.0.2.7:40000".parse().unwrap());
        processor.handle(&mut connection);
        connection
    }

    #[test]
    fn test_greeting() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let connection = converse(&processor(&spool), "QUIT\r\n");

        assert_eq!(
            connection.output_lines(),
            vec!["220 localdomain.com SMTP spoolmail ready", "221 Goodbye"]
        );
        assert_eq!(connection.shutdown_count(), 1);
    }

    #[test]
    fn test_full_session() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let connection = converse(
            &processor(&spool),
            "HELO x.com\r\n\
             MAIL FROM:<u@d.com>\r\n\
             RCPT TO:<v@localdomain.com>\r\n\
             DATA\r\n\
             Subject: Hi\r\n\
             \r\n\
             Body.\r\n\
             .\r\n\
             QUIT\r\n",
        );

        let lines = connection.output_lines();
        assert_eq!(
            lines,
            vec![
                "220 localdomain.com SMTP spoolmail ready",
                "250 localdomain.com",
                "250 OK",
                "250 OK",
                "354 Start mail input; end with <CRLF>.<CRLF>",
                "250 OK",
                "221 Goodbye",
            ]
        );

        assert_eq!(spool.len(), 1);
        let message = spool.next_message().unwrap();
        assert_eq!(message.headers()["Subject"], "Hi");
        assert_eq!(message.to_addresses().len(), 1);
        assert_eq!(message.to_addresses()[0].full(), "v@localdomain.com");
        assert_eq!(message.from_address().unwrap().full(), "u@d.com");
        assert!(message.data().starts_with(
            "Received: from x.com (x.com [192.0.2.7])\r\n     by localdomain.com (spoolmail)\r\n"
        ));
        assert!(message.data().ends_with("Subject: Hi\r\n\r\nBody.\r\n"));
    }

    #[test]
    fn test_session_resets_after_data() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let connection = converse(
            &processor(&spool),
            "HELO x.com\r\n\
             MAIL FROM:<u@d.com>\r\n\
             RCPT TO:<v@localdomain.com>\r\n\
             DATA\r\n\
             Subject: one\r\n\
             .\r\n\
             RCPT TO:<v@localdomain.com>\r\n\
             MAIL FROM:<u@d.com>\r\n\
             RCPT TO:<w@localdomain.com>\r\n\
             DATA\r\n\
             Subject: two\r\n\
             .\r\n",
        );

        let lines = connection.output_lines();
        assert_eq!(lines[6], "503 Command not allowed here");
        assert_eq!(lines[7], "250 OK");
        assert_eq!(spool.len(), 2);
        assert_eq!(spool.next_message().unwrap().subject(), Some("one"));
        let second = spool.next_message().unwrap();
        assert_eq!(second.subject(), Some("two"));
        assert!(second.has_recipient("w@localdomain.com"));
        assert!(!second.has_recipient("v@localdomain.com"));
    }

    #[test]
    fn test_rejected_recipient() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let connection = converse(
            &processor(&spool),
            "HELO x.com\r\nMAIL FROM:<u@d.com>\r\nRCPT TO:<v@otherdomain.com>\r\nDATA\r\n",
        );

        let lines = connection.output_lines();
        assert_eq!(lines[3], "550 User does not exist");
        assert_eq!(lines[4], "503 Command not allowed here");
        assert!(spool.is_empty());
    }

    #[test]
    fn test_end_of_stream_during_data_discards_message() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let connection = converse(
            &processor(&spool),
            "HELO x.com\r\nMAIL FROM:<u@d.com>\r\nRCPT TO:<v@localdomain.com>\r\nDATA\r\nSubject: lost\r\n",
        );

        assert_eq!(connection.output_lines().last().unwrap(), "354 Start mail input; end with <CRLF>.<CRLF>");
        assert!(spool.is_empty());
        assert_eq!(connection.shutdown_count(), 1);
    }

    #[test]
    fn test_end_of_stream_without_quit() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let connection = converse(&processor(&spool), "HELO x.com\r\nNOOP\r\n");

        assert_eq!(
            connection.output_lines(),
            vec![
                "220 localdomain.com SMTP spoolmail ready",
                "250 localdomain.com",
                "250 OK"
            ]
        );
        assert_eq!(connection.shutdown_count(), 1);
    }

    #[test]
    fn test_errors_keep_session_alive() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let connection = converse(
            &processor(&spool),
            "MAIL FROM:<a@b.com>\r\nHELO\r\nBOGUS\r\n\r\nHELO x.com\r\nMAIL FROM:<a>\r\nNOOP\r\n",
        );

        assert_eq!(
            connection.output_lines()[1..].to_vec(),
            vec![
                "503 Command not allowed here",
                "501 Incorrect number of arguments",
                "500 Command Unrecognized",
                "500 Command Unrecognized",
                "250 localdomain.com",
                "451 Address is invalid",
                "250 OK",
            ]
        );
    }

    #[test]
    fn test_chunked_input() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let mut connection = ScriptedConnection::with_chunks([
            "HE", "LO x.com\r\nMAIL FROM:<u@d", ".com>\r", "\nRCPT TO:<v@localdomain.com>\r\nDATA\r\nSub",
            "ject: split\r\n.", "\r\n",
        ]);
        processor(&spool).handle(&mut connection);

        assert_eq!(connection.output_lines().last().unwrap(), "250 OK");
        assert_eq!(spool.next_message().unwrap().subject(), Some("split"));
    }

    #[test]
    fn test_lines_are_stored_verbatim() {
        let spool = Arc::new(MemoryMessageSpool::new());
        converse(
            &processor(&spool),
            "HELO x.com\r\nMAIL FROM:<u@d.com>\r\nRCPT TO:<v@localdomain.com>\r\nDATA\r\n\
             Subject: dots\r\n\r\n..leading\r\n . \r\n.\r\n",
        );

        let message = spool.next_message().unwrap();
        assert_eq!(message.body(), Some("..leading\r\n . \r\n"));
    }

    #[test]
    fn test_custom_templates() {
        let spool = Arc::new(MemoryMessageSpool::new());
        let processor = processor(&spool)
            .with_welcome_message("Welcome to {domain}")
            .with_helo_response("{domain} greets {client}");
        let connection = converse(&processor, "HELO client.org\r\n");

        assert_eq!(
            connection.output_lines(),
            vec![
                "220 Welcome to localdomain.com",
                "250 localdomain.com greets client.org"
            ]
        );
    }

    #[test]
    fn test_spool_rejection_still_replies_ok() {
        struct Refusing;
        impl MessageSpool for Refusing {
            fn spool(&self, _message: Message) -> bool {
                false
            }
            fn next_message(&self) -> Option<Message> {
                None
            }
            fn clear(&self) {}
        }

        let processor = SmtpProcessor::with_filter(LOCAL_DOMAIN, Arc::new(AcceptAllFilter), Arc::new(Refusing));
        let connection = converse(
            &processor,
            "HELO x.com\r\nMAIL FROM:<u@d.com>\r\nRCPT TO:<v@any.org>\r\nDATA\r\n.\r\n",
        );

        assert_eq!(connection.output_lines().last().unwrap(), "250 OK");
    }

    #[test]
    fn test_panicking_spool_replies_554_and_continues() {
        struct Exploding;
        impl MessageSpool for Exploding {
            fn spool(&self, _message: Message) -> bool {
                panic!("disk on fire")
            }
            fn next_message(&self) -> Option<Message> {
                None
            }
            fn clear(&self) {}
        }

        let processor = SmtpProcessor::with_filter(LOCAL_DOMAIN, Arc::new(AcceptAllFilter), Arc::new(Exploding));
        let connection = converse(
            &processor,
            "HELO x.com\r\nMAIL FROM:<u@d.com>\r\nRCPT TO:<v@any.org>\r\nDATA\r\n.\r\nMAIL FROM:<u@d.com>\r\n",
        );

        let lines = connection.output_lines();
        assert_eq!(lines[5], "554 Transaction failed");
        assert_eq!(lines[6], "250 OK");
    }

    #[test]
    fn test_filter_sees_session() {
        let filter = |session: &SmtpSession, _: &Address| session.client_domain() == Some("trusted.org");
        let spool = Arc::new(MemoryMessageSpool::new());
        let processor = SmtpProcessor::with_filter(LOCAL_DOMAIN, Arc::new(filter), spool.clone());

        let trusted = converse(&processor, "HELO trusted.org\r\nMAIL FROM:<u@d.com>\r\nRCPT TO:<v@any.org>\r\n");
        assert_eq!(trusted.output_lines()[3], "250 OK");

        let untrusted = converse(&processor, "HELO other.org\r\nMAIL FROM:<u@d.com>\r\nRCPT TO:<v@any.org>\r\n");
        assert_eq!(untrusted.output_lines()[3], "550 User does not exist");
    }

    #[test]
    fn test_from_config() {
        let config: Config = toml::from_str(
            r#"
            domain = "mx.example.com"
            local_domain = "example.com"
            welcome_message = "{domain} ready"
            "#,
        )
        .unwrap();
        let spool = Arc::new(MemoryMessageSpool::new());
        let processor = SmtpProcessor::from_config(&config, spool.clone());
        assert_eq!(processor.domain(), "mx.example.com");

        let connection = converse(
            &processor,
            "HELO x.com\r\nMAIL FROM:<u@d.com>\r\nRCPT TO:<v@example.com>\r\nRCPT TO:<v@mx.example.com>\r\n",
        );
        assert_eq!(
            connection.output_lines(),
            vec![
                "220 mx.example.com ready",
                "250 mx.example.com",
                "250 OK",
                "250 OK",
                "550 User does not exist",
            ]
        );
    }
}
