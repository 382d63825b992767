//! Line encoding of tiddlers (`.tid` files).
//!
//! ```text
//! created: 20230101120000000
//! tags: Intro [[Getting Started]]
//! title: HelloThere
//!
//! Welcome to the wiki.
//! ```
//!
//! Header lines are `name: value` pairs, terminated by the first blank (or
//! whitespace-only) line. Everything after the terminator is the literal
//! value of `text`. A file that ends before any blank line is a tiddler
//! without a body.
//!
//! Binary tiddlers can also be stored as a pair: `logo.png.meta` holds the
//! header fields and `logo.png` holds the raw body. See [`decode_location`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use tracing::{debug, instrument};

use crate::error::{Result, StoreError};
use crate::path;
use crate::tiddler::{stringify_list, FieldValue, Tiddler, REVISION, TEXT, TITLE};
use crate::traits::TiddlerBackend;

/// Split off the next line, without its `\n`.
fn next_line(data: &[u8]) -> (&[u8], &[u8]) {
    match data.iter().position(|&b| b == b'\n') {
        Some(i) => (&data[..i], &data[i + 1..]),
        None => (data, &data[data.len()..]),
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn header_value(name: &str, value: &FieldValue) -> Result<String> {
    let rendered = match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::List(items) => stringify_list(items),
        FieldValue::Bytes(bytes) => BASE64.encode(bytes),
    };
    if rendered.contains(['\n', '\r']) {
        return Err(StoreError::Invalid(format!(
            "field '{}' contains a line break",
            name
        )));
    }
    Ok(rendered)
}

/// Encode a tiddler in the line format.
///
/// Fields are written in name order. A raw-bytes `text` is written as
/// base64, the way TiddlyWiki stores binary bodies inside `.tid` files.
///
/// # Errors
///
/// Returns `StoreError::Invalid` for field names that cannot be written as a
/// header (empty, or containing `:` or whitespace) and for header values
/// containing line breaks.
pub fn encode(tiddler: &Tiddler) -> Result<Bytes> {
    let mut buf = Vec::new();

    for (name, value) in tiddler.iter() {
        if name == TEXT {
            continue;
        }
        if name.is_empty() || name.contains(':') || name.contains(char::is_whitespace) {
            return Err(StoreError::Invalid(format!("unwritable field name '{}'", name)));
        }
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(header_value(name, value)?.as_bytes());
        buf.push(b'\n');
    }

    buf.push(b'\n');

    match tiddler.get(TEXT) {
        Some(FieldValue::Text(text)) => buf.extend_from_slice(text.as_bytes()),
        Some(FieldValue::Bytes(bytes)) => buf.extend_from_slice(BASE64.encode(bytes).as_bytes()),
        Some(FieldValue::List(items)) => buf.extend_from_slice(stringify_list(items).as_bytes()),
        None => {}
    }

    Ok(Bytes::from(buf))
}

/// Encode a tiddler as a `.meta` pair: the header fields, and the raw body.
///
/// The body of a binary tiddler is written as bytes. A binary tiddler whose
/// text arrived as a base64 string is decoded first, falling back to the
/// string itself when it is not valid base64.
pub fn encode_pair(tiddler: &Tiddler) -> Result<(Bytes, Bytes)> {
    let mut header = tiddler.clone();
    let body = match header.remove(TEXT) {
        Some(FieldValue::Bytes(bytes)) => bytes,
        Some(FieldValue::Text(text)) if tiddler.is_binary() => match BASE64.decode(text.trim()) {
            Ok(raw) => Bytes::from(raw),
            Err(_) => Bytes::from(text),
        },
        Some(FieldValue::Text(text)) => Bytes::from(text),
        Some(FieldValue::List(items)) => Bytes::from(stringify_list(&items)),
        None => Bytes::new(),
    };
    Ok((encode(&header)?, body))
}

/// Decode a tiddler from the line format.
///
/// Sets `revision` to `"0"` when the header has none, which the TiddlyWeb
/// sync adaptor requires.
///
/// # Errors
///
/// Returns `StoreError::Invalid` for a header line with no `:`.
pub fn decode(data: &[u8]) -> Result<Tiddler> {
    let mut tiddler = Tiddler::new();
    let mut rest = data;

    while !rest.is_empty() {
        let (raw, next) = next_line(rest);
        rest = next;

        let line = String::from_utf8_lossy(raw);
        if is_blank(&line) {
            if !rest.is_empty() {
                tiddler.set(TEXT, String::from_utf8_lossy(rest).into_owned());
            }
            break;
        }

        let (name, value) = line.split_once(':').ok_or_else(|| {
            StoreError::Invalid(format!("header line without a field name: {:?}", line))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid(format!("empty field name: {:?}", line)));
        }
        tiddler.set(name, value.trim());
    }

    if !tiddler.contains(REVISION) {
        tiddler.set(REVISION, "0");
    }

    Ok(tiddler)
}

/// Find the title in a line-encoded tiddler without parsing the whole file.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if no `title:` line appears before the
/// header terminator, and `StoreError::Invalid` if the title is empty.
pub fn peek_title(data: &[u8]) -> Result<String> {
    let mut rest = data;

    while !rest.is_empty() {
        let (raw, next) = next_line(rest);
        rest = next;

        let line = String::from_utf8_lossy(raw);
        if is_blank(&line) {
            break;
        }
        if let Some(value) = line.strip_prefix("title:") {
            let title = value.trim();
            if title.is_empty() {
                return Err(StoreError::Invalid("empty title".to_string()));
            }
            return Ok(title.to_string());
        }
    }

    Err(StoreError::NotFound(TITLE.to_string()))
}

/// Read and decode the tiddler stored at `location`.
///
/// For a `.meta` location the body is read from the same location without
/// the suffix. It becomes raw bytes when the tiddler's `type` is binary, and
/// text otherwise.
#[instrument(skip(backend), fields(backend = backend.backend_name()))]
pub async fn decode_location(backend: &dyn TiddlerBackend, location: &str) -> Result<Tiddler> {
    let data = backend.read(location).await?;

    match path::body_location(location) {
        Some(body_location) => {
            debug!("Reading body for {} from {}", location, body_location);
            let body = backend.read(body_location).await?;
            decode_pair(&data, body)
        }
        None => decode(&data),
    }
}

/// Decode a `.meta` header together with its body file.
///
/// The body becomes raw bytes when the tiddler's `type` is binary, and text
/// otherwise.
pub fn decode_pair(header: &[u8], body: Bytes) -> Result<Tiddler> {
    let mut tiddler = decode(header)?;
    if tiddler.is_binary() {
        tiddler.set(TEXT, body);
    } else {
        tiddler.set(TEXT, String::from_utf8_lossy(&body).into_owned());
    }
    Ok(tiddler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiddler::{TAGS, TYPE};

    const HELLO: &str = "created: 20230101120000000\n\
                         modified: 20230102120000000\n\
                         tags: Intro [[Getting Started]]\n\
                         title: HelloThere\n\
                         type: text/vnd.tiddlywiki\n\
                         \n\
                         Welcome to the wiki.\n\nSecond paragraph: with a colon.\n";

    #[test]
    fn test_decode() {
        let tiddler = decode(HELLO.as_bytes()).unwrap();

        assert_eq!(tiddler.title(), Some("HelloThere"));
        assert_eq!(tiddler.field("type").as_deref(), Some("text/vnd.tiddlywiki"));
        assert_eq!(tiddler.tags(), vec!["Intro", "Getting Started"]);
        assert_eq!(
            tiddler.field(TEXT).as_deref(),
            Some("Welcome to the wiki.\n\nSecond paragraph: with a colon.\n")
        );
        assert_eq!(tiddler.field(REVISION).as_deref(), Some("0"));
    }

    #[test]
    fn test_decode_keeps_revision() {
        let tiddler = decode(b"title: A\nrevision: 4\n\nbody").unwrap();
        assert_eq!(tiddler.revision(), 4);
    }

    #[test]
    fn test_decode_empty_input() {
        let tiddler = decode(b"").unwrap();
        assert_eq!(tiddler.len(), 1);
        assert_eq!(tiddler.field(REVISION).as_deref(), Some("0"));
    }

    #[test]
    fn test_decode_without_terminator() {
        let tiddler = decode(b"title: NoBody\ntype: text/plain").unwrap();
        assert_eq!(tiddler.title(), Some("NoBody"));
        assert!(!tiddler.contains(TEXT));
    }

    #[test]
    fn test_decode_whitespace_terminator() {
        let tiddler = decode(b"title: A\n  \t\r\nbody").unwrap();
        assert_eq!(tiddler.field(TEXT).as_deref(), Some("body"));
    }

    #[test]
    fn test_decode_crlf() {
        let tiddler = decode(b"title: Windows\r\ntags: a b\r\n\r\nbody").unwrap();
        assert_eq!(tiddler.title(), Some("Windows"));
        assert_eq!(tiddler.field(TAGS).as_deref(), Some("a b"));
    }

    #[test]
    fn test_decode_header_without_colon() {
        let err = decode(b"title: A\nnot a header\n\nbody").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_value_split_on_first_colon() {
        let tiddler = decode(b"title: $:/config/tiddlyweb/host\n\n").unwrap();
        assert_eq!(tiddler.title(), Some("$:/config/tiddlyweb/host"));
    }

    #[test]
    fn test_encode_layout() {
        let tiddler = Tiddler::with_title("A")
            .with_field(TAGS, vec!["x".to_string(), "y z".to_string()])
            .with_field(TEXT, "hello");

        let encoded = encode(&tiddler).unwrap();
        assert_eq!(&encoded[..], b"tags: x [[y z]]\ntitle: A\n\nhello");
    }

    #[test]
    fn test_encode_without_text() {
        let encoded = encode(&Tiddler::with_title("A")).unwrap();
        assert_eq!(&encoded[..], b"title: A\n\n");
    }

    #[test]
    fn test_encode_rejects_unwritable_headers() {
        let bad_value = Tiddler::with_title("A").with_field("caption", "two\nlines");
        assert!(matches!(encode(&bad_value), Err(StoreError::Invalid(_))));

        let bad_name = Tiddler::with_title("A").with_field("a:b", "x");
        assert!(matches!(encode(&bad_name), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_roundtrip_with_list_tags() {
        let original = Tiddler::with_title("Round Trip")
            .with_field("created", "20230101120000000")
            .with_field(TAGS, vec!["one".to_string(), "two words".to_string()])
            .with_field("color", "blue")
            .with_field(TEXT, "line one\n\nline three: still body\n");

        let decoded = decode(&encode(&original).unwrap()).unwrap();

        for (name, value) in original.iter() {
            if name == TAGS {
                let mut want = original.tags();
                let mut have = decoded.tags();
                want.sort();
                have.sort();
                assert_eq!(want, have);
            } else {
                assert_eq!(decoded.get(name), Some(value), "field {}", name);
            }
        }
        assert_eq!(decoded.field(REVISION).as_deref(), Some("0"));
    }

    #[test]
    fn test_encode_binary_text_as_base64() {
        let tiddler = Tiddler::with_title("dot.png")
            .with_field(TYPE, "image/png")
            .with_field(TEXT, vec![0xFFu8, 0xD8, 0xFF]);
        let decoded = decode(&encode(&tiddler).unwrap()).unwrap();
        assert_eq!(decoded.field(TEXT).as_deref(), Some("/9j/"));
    }

    #[test]
    fn test_encode_pair_binary() {
        let tiddler = Tiddler::with_title("dot.png")
            .with_field(TYPE, "image/png")
            .with_field(TEXT, vec![0xFFu8, 0xD8, 0xFF]);

        let (header, body) = encode_pair(&tiddler).unwrap();
        assert_eq!(&header[..], b"title: dot.png\ntype: image/png\n\n");
        assert_eq!(&body[..], &[0xFF, 0xD8, 0xFF]);

        let decoded = decode_pair(&header, body).unwrap();
        assert_eq!(decoded.get(TEXT), tiddler.get(TEXT));
        assert_eq!(decoded.field(REVISION).as_deref(), Some("0"));
    }

    #[test]
    fn test_encode_pair_base64_text() {
        let tiddler = Tiddler::with_title("dot.png")
            .with_field(TYPE, "image/png")
            .with_field(TEXT, "/9j/");

        let (_, body) = encode_pair(&tiddler).unwrap();
        assert_eq!(&body[..], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_encode_pair_text() {
        let tiddler = Tiddler::with_title("notes.txt")
            .with_field(TYPE, "text/plain")
            .with_field(TEXT, "plain notes");

        let (header, body) = encode_pair(&tiddler).unwrap();
        assert_eq!(&body[..], b"plain notes");
        assert_eq!(
            decode_pair(&header, body).unwrap().field(TEXT).as_deref(),
            Some("plain notes")
        );
    }

    #[test]
    fn test_peek_title() {
        assert_eq!(peek_title(b"title: Foo\n\nbody").unwrap(), "Foo");
        assert_eq!(peek_title(HELLO.as_bytes()).unwrap(), "HelloThere");
    }

    #[test]
    fn test_peek_title_missing() {
        let err = peek_title(b"type: text/plain\n\ntitle: in the body").unwrap_err();
        assert!(err.is_not_found());

        assert!(peek_title(b"").unwrap_err().is_not_found());
    }

    #[test]
    fn test_peek_title_empty() {
        let err = peek_title(b"title:   \n\n").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
