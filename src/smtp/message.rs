//! Messages accumulated during an SMTP transaction

use std::sync::OnceLock;

use chrono::{DateTime, Local};

use crate::smtp::address::Address;
use crate::smtp::mime::{self, Headers, MessagePart};

/// A message being received, or handed to a spool once complete.
///
/// `headers()` and `parts()` are derived from the raw data on first access
/// and cached. Appending data drops both caches, so they always reflect the
/// data as it was when they were computed.
#[derive(Debug, Clone)]
pub struct Message {
    from: Option<Address>,
    to: Vec<Address>,
    data: String,
    received_at: DateTime<Local>,
    headers: OnceLock<Headers>,
    parts: OnceLock<Vec<MessagePart>>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self {
            from: None,
            to: Vec::new(),
            data: String::new(),
            received_at: Local::now(),
            headers: OnceLock::new(),
            parts: OnceLock::new(),
        }
    }

    /// Create a message from raw data that was received elsewhere
    pub fn from_data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::new()
        }
    }

    /// The sender given with `MAIL FROM`
    pub fn from_address(&self) -> Option<&Address> {
        self.from.as_ref()
    }

    pub fn set_from_address(&mut self, address: Address) {
        self.from = Some(address);
    }

    /// Accepted recipients, in the order they were given
    pub fn to_addresses(&self) -> &[Address] {
        &self.to
    }

    pub fn add_to_address(&mut self, address: Address) {
        self.to.push(address);
    }

    /// Raw message text, including the `Received:` trace header
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Append raw text to the message
    pub fn append_data(&mut self, data: &str) {
        self.data.push_str(data);
        self.headers = OnceLock::new();
        self.parts = OnceLock::new();
    }

    /// When this message was created
    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    /// Top-level headers, parsed on first access
    pub fn headers(&self) -> &Headers {
        self.headers.get_or_init(|| mime::parse_headers(&self.data))
    }

    /// Case-insensitive lookup of a top-level header
    pub fn header(&self, name: &str) -> Option<&str> {
        mime::find_header(self.headers(), name)
    }

    /// Sections of a `multipart/mixed` body; empty for any other message
    pub fn parts(&self) -> &[MessagePart] {
        self.parts
            .get_or_init(|| mime::split_parts(&self.data, self.header("Content-Type")))
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    /// Text after the header block, if there is any
    pub fn body(&self) -> Option<&str> {
        let (_, body) = mime::split_at_blank_line(&self.data);
        (!body.is_empty()).then_some(body)
    }

    /// Check if this message was accepted for a specific recipient
    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.to.iter().any(|address| address.full() == recipient)
    }

    /// Size of the raw data in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SINGLE_ATTACHMENT: &str = "Received: from development02 (development02 [127.0.0.1])\r\n\
        \x20    by example.com (spoolmail)\r\n\
        \x20    Fri, 16 Apr 2004 10:35:58 -0500\r\n\
        From: \"Eric\" <eric@example.com>\r\n\
        Subject: CofAs\r\n\
        MIME-Version: 1.0\r\n\
        Content-Type: multipart/mixed;\r\n\
        \tboundary=\"----=_NextPart_000_0000_01C4239E.999350F0\"\r\n\
        X-Priority: 3 (Normal)\r\n\
        \r\n\
        This is a multi-part message in MIME format.\r\n\
        \r\n\
        ------=_NextPart_000_0000_01C4239E.999350F0\r\n\
        Content-Type: application/pdf;\r\n\
        \tname=\"000000001.pdf\"\r\n\
        Content-Transfer-Encoding: base64\r\n\
        Content-Disposition: attachment;\r\n\
        \tfilename=\"000000001.pdf\"\r\n\
        \r\n\
        JVBERi0xLjIKekdf1fnfSqQYt7AjczYfpmRSIEyEcx8KMSAwIG9iago8PAovVHlwZSAvQ2F0YWxv\r\n\
        \r\n\
        ------=_NextPart_000_0000_01C4239E.999350F0--\r\n\
        \r\n";

    const SINGLE_PART_BODY: &str = "From: \"Eric\" <eric@example.com>\r\n\
        Subject: CofAs\r\n\
        Content-Type: application/pdf;\r\n\
        \tname=\"000000002.pdf\"\r\n\
        Content-Transfer-Encoding: base64\r\n\
        Content-Disposition: attachment;\r\n\
        \tfilename=\"000000002.pdf\"\r\n\
        \r\n\
        JVBERi0xLjIKekdf1fnfSqQYt7AjczYfpmRSIEyEcx8KMSAwIG9iago8PAovVHlwZSAvQ2F0YWxv\r\n";

    #[test]
    fn test_message_creation() {
        let mut message = Message::new();
        assert!(message.from_address().is_none());
        assert!(message.to_addresses().is_empty());
        assert_eq!(message.data(), "");
        assert!(message.received_at() <= Local::now());

        message.set_from_address(Address::parse("sender@example.com").unwrap());
        message.add_to_address(Address::parse("user1@example.com").unwrap());
        message.add_to_address(Address::parse("user2@example.com").unwrap());

        assert_eq!(message.from_address().unwrap().full(), "sender@example.com");
        assert!(message.has_recipient("user1@example.com"));
        assert!(message.has_recipient("user2@example.com"));
        assert!(!message.has_recipient("user3@example.com"));
    }

    #[test]
    fn test_message_headers() {
        let message = Message::from_data(SINGLE_ATTACHMENT);
        let headers = message.headers();

        assert_eq!(
            headers["Received"],
            "from development02 (development02 [127.0.0.1]) by example.com (spoolmail) Fri, 16 Apr 2004 10:35:58 -0500"
        );
        assert_eq!(headers["From"], "\"Eric\" <eric@example.com>");
        assert_eq!(headers["Subject"], "CofAs");
        assert_eq!(headers["X-Priority"], "3 (Normal)");
        assert_eq!(message.subject(), Some("CofAs"));
    }

    #[test]
    fn test_single_attachment() {
        let message = Message::from_data(SINGLE_ATTACHMENT);
        let parts = message.parts();

        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts[0].header("Content-Type"),
            Some("application/pdf; name=\"000000001.pdf\"")
        );
        assert_eq!(
            parts[0].header("Content-Disposition"),
            Some("attachment; filename=\"000000001.pdf\"")
        );
        assert_eq!(
            parts[0].body_data(),
            "JVBERi0xLjIKekdf1fnfSqQYt7AjczYfpmRSIEyEcx8KMSAwIG9iago8PAovVHlwZSAvQ2F0YWxv\r\n\r\n"
        );
    }

    #[test]
    fn test_non_multipart_has_no_parts() {
        let message = Message::from_data(SINGLE_PART_BODY);
        assert!(message.parts().is_empty());
        assert_eq!(
            message.header("Content-Disposition"),
            Some("attachment; filename=\"000000002.pdf\"")
        );
    }

    #[test]
    fn test_derived_fields_are_cached() {
        let message = Message::from_data(SINGLE_ATTACHMENT);

        let first_headers: *const Headers = message.headers();
        let second_headers: *const Headers = message.headers();
        assert_eq!(first_headers, second_headers);

        let first_parts = message.parts().as_ptr();
        assert_eq!(first_parts, message.parts().as_ptr());
        assert_eq!(message.parts().len(), 1);
    }

    #[test]
    fn test_append_invalidates_cache() {
        let mut message = Message::new();
        message.append_data("Subject: one\r\n");
        assert_eq!(message.subject(), Some("one"));

        message.append_data("X-Extra: two\r\n\r\nbody\r\n");
        assert_eq!(message.header("X-Extra"), Some("two"));
        assert_eq!(message.body(), Some("body\r\n"));
    }

    #[test]
    fn test_body() {
        let message = Message::from_data("Subject: Test\r\n\r\nHello World\r\nSecond line\r\n");
        assert_eq!(message.body(), Some("Hello World\r\nSecond line\r\n"));

        let no_body = Message::from_data("Subject: Test\r\n");
        assert_eq!(no_body.body(), None);
    }

    #[test]
    fn test_data_size() {
        assert_eq!(Message::from_data("Hello").data_size(), 5);
    }
}
