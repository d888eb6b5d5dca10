//! Quoted-printable decoding for consumers of finished messages
//!
//! Nothing in the receiving path calls this; a consumer that sees
//! `Content-Transfer-Encoding: quoted-printable` invokes it explicitly.

use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::{Encoding, mem};
use regex::Regex;

static CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset="?([^";\s]+)"?"#).expect("valid charset regex")
});

// Labels the WHATWG table folds into windows-1252 but which name the
// byte-per-code-point mapping.
const LATIN1_LABELS: &[&str] = &[
    "iso-8859-1",
    "iso8859-1",
    "iso_8859-1",
    "iso_8859-1:1987",
    "iso-ir-100",
    "latin1",
    "l1",
    "cp819",
    "ibm819",
    "csisolatin1",
    "us-ascii",
    "ascii",
];

/// Character set used to turn escaped bytes back into text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Charset {
    /// Each byte is the code point of the same value
    #[default]
    Latin1,
    Encoding(&'static Encoding),
}

impl Charset {
    fn decode<'a>(self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Charset::Latin1 => mem::decode_latin1(bytes),
            Charset::Encoding(encoding) => encoding.decode_without_bom_handling(bytes).0,
        }
    }
}

impl From<&'static Encoding> for Charset {
    fn from(encoding: &'static Encoding) -> Self {
        Charset::Encoding(encoding)
    }
}

/// Decode `=XX` escapes as ISO-8859-1 and drop soft line breaks
pub fn decode_quoted_printable(input: &str) -> String {
    decode_quoted_printable_with(input, Charset::Latin1)
}

/// Decode `=XX` escapes using `charset` and drop soft line breaks.
///
/// Consecutive escapes are decoded together so multi-byte sequences survive,
/// even when a soft line break falls between them. Text that is not escaped
/// is copied through unchanged, as is an `=` not followed by two hex digits
/// or a line terminator.
pub fn decode_quoted_printable_with(input: &str, charset: impl Into<Charset>) -> String {
    let charset = charset.into();
    let bytes = input.as_bytes();
    let mut output = String::with_capacity(input.len());
    let mut pending = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'=' {
            flush(&mut output, &mut pending, charset);
            i += 1;
            continue;
        }

        let rest = &bytes[i + 1..];
        let (consumed, byte) = if rest.starts_with(b"\r\n") {
            (2, None)
        } else if rest.starts_with(b"\n") {
            (1, None)
        } else if let Some(byte) = hex_pair(rest) {
            (2, Some(byte))
        } else {
            flush(&mut output, &mut pending, charset);
            i += 1;
            continue;
        };

        output.push_str(&input[literal_start..i]);
        pending.extend(byte);
        i += 1 + consumed;
        literal_start = i;
    }

    flush(&mut output, &mut pending, charset);
    output.push_str(&input[literal_start..]);
    output
}

fn flush(output: &mut String, pending: &mut Vec<u8>, charset: Charset) {
    if pending.is_empty() {
        return;
    }
    output.push_str(&charset.decode(pending));
    pending.clear();
}

fn hex_pair(bytes: &[u8]) -> Option<u8> {
    let high = (*bytes.first()? as char).to_digit(16)?;
    let low = (*bytes.get(1)? as char).to_digit(16)?;
    Some((high * 16 + low) as u8)
}

/// Resolve the `charset` parameter of a `Content-Type` value
pub fn charset_from_content_type(content_type: &str) -> Option<Charset> {
    let label = &CHARSET.captures(content_type)?[1];
    if LATIN1_LABELS.iter().any(|l| l.eq_ignore_ascii_case(label)) {
        return Some(Charset::Latin1);
    }
    Encoding::for_label(label.as_bytes()).map(Charset::Encoding)
}
