//! RFC 822 header blocks and `multipart/mixed` body parts

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use tracing::warn;

use crate::smtp::quoted_printable::{charset_from_content_type, decode_quoted_printable_with};

/// Header name to unfolded, whitespace-collapsed value
pub type Headers = HashMap<String, String>;

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\s:]+):(.*)$").expect("valid header regex"));

static MULTIPART_MIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)multipart/mixed").expect("valid multipart regex"));

static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)boundary="?([^";\s]+)"?"#).expect("valid boundary regex")
});

/// Split `text` at its first blank line.
///
/// The head keeps the line terminators that form the blank line; the tail is
/// everything after them. A leading blank line yields an empty head, and text
/// without a blank line is all head.
pub fn split_at_blank_line(text: &str) -> (&str, &str) {
    for leading in ["\r\n", "\n"] {
        if text.starts_with(leading) {
            return text.split_at(leading.len());
        }
    }

    let crlf = text.find("\r\n\r\n").map(|i| i + 4);
    let lf = text.find("\n\n").map(|i| i + 2);
    let end = match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    match end {
        Some(end) => text.split_at(end),
        None => (text, ""),
    }
}

/// Parse the header block at the top of `data`.
///
/// Folded continuation lines (those starting with whitespace) are joined onto
/// the preceding header, then every whitespace run is collapsed to a single
/// space. A repeated header keeps its last value.
pub fn parse_headers(data: &str) -> Headers {
    let (head, _) = split_at_blank_line(data);
    let mut headers = Headers::new();
    let mut current: Option<(String, String)> = None;

    for line in head.lines() {
        if line.is_empty() {
            break;
        }

        if line.starts_with(|c: char| c == ' ' || c == '\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line);
            }
            continue;
        }

        if let Some((key, value)) = current.take() {
            headers.insert(key, collapse_whitespace(&value));
        }

        if let Some(captures) = HEADER_LINE.captures(line) {
            current = Some((captures[1].to_owned(), captures[2].to_owned()));
        }
    }

    if let Some((key, value)) = current {
        headers.insert(key, collapse_whitespace(&value));
    }

    headers
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive header lookup
pub fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers.get(name).map(String::as_str).or_else(|| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    })
}

/// Split the body of a `multipart/mixed` message into its parts.
///
/// `content_type` is the message's `Content-Type` header. Anything that is
/// not `multipart/mixed` with a boundary produces no parts. The preamble
/// before the first boundary line and the epilogue after the last one are
/// dropped.
pub fn split_parts(data: &str, content_type: Option<&str>) -> Vec<MessagePart> {
    let Some(content_type) = content_type else {
        return Vec::new();
    };
    if !MULTIPART_MIXED.is_match(content_type) {
        return Vec::new();
    }
    let Some(boundary) = BOUNDARY.captures(content_type).map(|c| c[1].to_owned()) else {
        return Vec::new();
    };

    let delimiter = match Regex::new(&format!(
        r"(?m)^--{}[^\n]*\n?",
        regex::escape(&boundary)
    )) {
        Ok(delimiter) => delimiter,
        Err(e) => {
            warn!("Unusable MIME boundary {boundary:?}: {e}");
            return Vec::new();
        }
    };

    let (_, body) = split_at_blank_line(data);

    let mut parts = Vec::new();
    let mut open: Option<usize> = None;
    for delimiter_line in delimiter.find_iter(body) {
        if let Some(start) = open {
            parts.push(MessagePart::new(&body[start..delimiter_line.start()]));
        }
        open = Some(delimiter_line.end());
    }

    parts
}

/// One section of a multipart body
#[derive(Debug, Clone)]
pub struct MessagePart {
    header_data: String,
    body_data: String,
    headers: OnceLock<Headers>,
}

impl MessagePart {
    /// Create a part from the raw text between two boundary lines
    pub fn new(data: &str) -> Self {
        let (header_data, body_data) = split_at_blank_line(data);
        Self {
            header_data: header_data.to_owned(),
            body_data: body_data.to_owned(),
            headers: OnceLock::new(),
        }
    }

    /// Raw header block, including the blank line that ends it
    pub fn header_data(&self) -> &str {
        &self.header_data
    }

    /// Raw body text
    pub fn body_data(&self) -> &str {
        &self.body_data
    }

    /// Parsed headers, computed on first access
    pub fn headers(&self) -> &Headers {
        self.headers.get_or_init(|| parse_headers(&self.header_data))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(self.headers(), name)
    }

    /// Body with quoted-printable escapes decoded when the part declares that
    /// transfer encoding, otherwise the raw body
    pub fn decoded_body(&self) -> Cow<'_, str> {
        decode_body(self.headers(), &self.body_data)
    }
}

/// Apply the transfer decoding declared in `headers` to `body`.
///
/// Only `quoted-printable` is decoded; the charset comes from the
/// `Content-Type` parameter and defaults to ISO-8859-1.
pub fn decode_body<'a>(headers: &Headers, body: &'a str) -> Cow<'a, str> {
    let quoted_printable = find_header(headers, "Content-Transfer-Encoding")
        .is_some_and(|encoding| encoding.eq_ignore_ascii_case("quoted-printable"));
    if !quoted_printable {
        return Cow::Borrowed(body);
    }

    let charset = find_header(headers, "Content-Type")
        .and_then(charset_from_content_type)
        .unwrap_or_default();
    Cow::Owned(decode_quoted_printable_with(body, charset))
}
