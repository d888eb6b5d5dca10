//! SMTP response handling

use std::fmt;

/// Represents an SMTP response that can be sent to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    /// The SMTP response code (e.g., 250, 354, 500)
    pub code: u16,
    /// The human-readable message
    pub message: String,
}

impl SmtpResponse {
    /// Create a new SMTP response
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_owned(),
        }
    }

    /// Create a success response (250 OK)
    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    /// Create a greeting response (220)
    pub fn greeting(message: &str) -> Self {
        Self::new(220, message)
    }

    /// Create a HELO response (250)
    pub fn helo(message: &str) -> Self {
        Self::new(250, message)
    }

    /// Create a DATA intermediate response (354)
    pub fn data_start() -> Self {
        Self::new(354, "Start mail input; end with <CRLF>.<CRLF>")
    }

    /// Create a QUIT response (221)
    pub fn quit() -> Self {
        Self::new(221, "Goodbye")
    }

    /// The response line without its terminator
    pub fn line(&self) -> String {
        format!("{} {}", self.code, self.message)
    }

    /// Format the response for sending over the wire
    pub fn format(&self) -> String {
        format!("{}\r\n", self.line())
    }
}

impl fmt::Display for SmtpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// Expand `{domain}` and `{client}` in a configured reply template
pub fn render_template(template: &str, domain: &str, client: &str) -> String {
    template.replace("{domain}", domain).replace("{client}", client)
}
