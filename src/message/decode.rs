//! Best-effort extraction of the subject and body from a raw message.
//!
//! Nothing here can fail. A header block that does not look like RFC 5322
//! headers makes the whole input the body, with an empty subject. The raw
//! bytes are never modified; callers keep them alongside whatever this returns.

use mailparse::MailHeaderMap;

use crate::internal;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub subject: String,
    pub body: String,
}

/// Recover `Subject` and the body from `raw`.
#[must_use]
pub fn decode(raw: &[u8]) -> Decoded {
    let (headers, body_start) = split_headers(raw);

    if headers.is_empty() || !valid_header_block(headers) {
        internal!(level = DEBUG, "No usable header block, storing message as body");
        return Decoded {
            subject: String::new(),
            body: lossy(raw),
        };
    }

    match mailparse::parse_mail(raw) {
        Ok(parsed) => Decoded {
            subject: parsed
                .headers
                .get_first_value("Subject")
                .map(|subject| subject.trim().to_string())
                .unwrap_or_default(),
            body: parsed
                .get_body()
                .unwrap_or_else(|_| lossy(&raw[body_start..])),
        },
        Err(err) => {
            internal!(level = DEBUG, "Unable to parse message: {err}");
            Decoded {
                subject: String::new(),
                body: lossy(raw),
            }
        }
    }
}

/// UTF-8 with invalid sequences replaced. A leading byte order mark is
/// kept as content rather than used to pick an encoding.
fn lossy(data: &[u8]) -> String {
    encoding_rs::UTF_8
        .decode_without_bom_handling(data)
        .0
        .into_owned()
}

/// Split at the first blank line. Returns the header block and the offset of
/// the first body byte; without a blank line the whole input is headers.
fn split_headers(raw: &[u8]) -> (&[u8], usize) {
    let mut start = 0;

    while start < raw.len() {
        let end = raw[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |pos| start + pos + 1);

        let line = &raw[start..end];
        if line == b"\r\n" || line == b"\n" {
            return (&raw[..start], end);
        }

        start = end;
    }

    (raw, raw.len())
}

fn valid_header_block(headers: &[u8]) -> bool {
    let mut lines = headers
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .peekable();

    // A block cannot open with a folded line.
    if lines
        .peek()
        .is_some_and(|line| line[0] == b' ' || line[0] == b'\t')
    {
        return false;
    }

    lines.all(|line| {
        if line[0] == b' ' || line[0] == b'\t' {
            return true;
        }

        line.iter().position(|&b| b == b':').is_some_and(|colon| {
            colon > 0
                && line[..colon]
                    .iter()
                    .all(|&b| b.is_ascii_graphic() && b != b':')
        })
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{decode, split_headers, valid_header_block, Decoded};

    #[test]
    fn subject_and_body() {
        assert_eq!(
            decode(b"Subject: Test\r\n\r\nHello"),
            Decoded {
                subject: String::from("Test"),
                body: String::from("Hello"),
            }
        );
    }

    #[test]
    fn no_header_block() {
        let raw = b"just some text\r\nwith lines\r\n";
        assert_eq!(
            decode(raw),
            Decoded {
                subject: String::new(),
                body: String::from_utf8(raw.to_vec()).unwrap(),
            }
        );
    }

    #[test]
    fn malformed_header_line() {
        let raw = b"Subject: fine\r\nnot a header\r\n\r\nbody";
        let decoded = decode(raw);
        assert_eq!(decoded.subject, "");
        assert_eq!(decoded.body.as_bytes(), raw);
    }

    #[test]
    fn missing_subject() {
        let decoded = decode(b"From: a@test\r\nTo: b@test\r\n\r\nbody text\r\n");
        assert_eq!(decoded.subject, "");
        assert_eq!(decoded.body, "body text\r\n");
    }

    #[test]
    fn encoded_subject() {
        let decoded = decode(b"Subject: =?UTF-8?B?SGVsbG8gV29ybGQ=?=\r\n\r\nbody");
        assert_eq!(decoded.subject, "Hello World");
    }

    #[test]
    fn invalid_utf8_body_is_lossy() {
        let decoded = decode(b"\xff\xfe not headers");
        assert_eq!(decoded.subject, "");
        assert!(decoded.body.ends_with(" not headers"));
    }

    #[test]
    fn byte_order_marks_are_not_sniffed() {
        let decoded = decode(b"\xfe\xffhello world\r\n");
        assert_eq!(decoded.subject, "");
        assert_eq!(decoded.body, "\u{FFFD}\u{FFFD}hello world\r\n");

        let decoded = decode(b"\xff\xfe not headers");
        assert_eq!(decoded.body, "\u{FFFD}\u{FFFD} not headers");

        let decoded = decode(b"\xef\xbb\xbfno headers here");
        assert_eq!(decoded.body, "\u{FEFF}no headers here");
    }

    #[test]
    fn header_block_rules() {
        assert!(valid_header_block(b"Subject: x\r\nX-Test: y\r\n"));
        assert!(valid_header_block(b"Subject: x\r\n\tcontinued\r\n"));
        assert!(!valid_header_block(b" leading fold: x\r\n"));
        assert!(!valid_header_block(b": no name\r\n"));
        assert!(!valid_header_block(b"Bad Name: x\r\n"));

        assert_eq!(split_headers(b"A: b\r\n\r\nbody"), (&b"A: b\r\n"[..], 8));
        assert_eq!(split_headers(b"A: b\n\nbody"), (&b"A: b\n"[..], 6));
        assert_eq!(split_headers(b"A: b"), (&b"A: b"[..], 4));
    }
}
