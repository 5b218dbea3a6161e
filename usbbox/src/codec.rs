//! Converts messages from and to their textual representation.
//!
//! A message is written as eight comma-separated fields of the form `0xHH`,
//! for example `0x52,0x00,0x00,0x00,0x00,0x00,0x00,0x00`.

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::message::{MESSAGE_SIZE, Message};

const FIELD_SEPARATOR: char = ',';
const FIELD_PREFIX: &str = "0x";

/// Encodes a message as text.
pub fn encode(msg: &Message) -> String {
    msg.to_string()
}

/// Decodes a message from text, requiring all eight fields to be present.
///
/// Trailing whitespace (such as the newline of a line read from stdin) is
/// ignored, as is anything following the eighth field.
pub fn decode(text: &str) -> Result<Message, CodecError> {
    match decode_partial(text) {
        (msg, MESSAGE_SIZE) => Ok(msg),
        (_, parsed) => Err(CodecError::Incomplete { parsed }),
    }
}

/// Decodes as many fields as possible from text.
///
/// Parsing stops at the first malformed field. Returns the message along with
/// the amount of successfully parsed fields; bytes that were not parsed are
/// left zero and must not be trusted unless the count equals
/// [`MESSAGE_SIZE`].
pub fn decode_partial(text: &str) -> (Message, usize) {
    let mut bytes = [0u8; MESSAGE_SIZE];
    let mut parsed = 0;

    for (slot, field) in bytes
        .iter_mut()
        .zip(text.trim_end().split(FIELD_SEPARATOR))
    {
        let Some(value) = parse_field(field) else {
            break;
        };
        *slot = value;
        parsed += 1;
    }

    (Message::new(bytes), parsed)
}

/// Parses a single `0xH` or `0xHH` field.
fn parse_field(field: &str) -> Option<u8> {
    let digits = field.strip_prefix(FIELD_PREFIX)?;
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i != 0 {
                write!(f, "{FIELD_SEPARATOR}")?;
            }
            write!(f, "{FIELD_PREFIX}{byte:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for Message {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Represents an error that occurred while decoding a message from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Indicates that fewer than [`MESSAGE_SIZE`] fields could be parsed.
    #[error("only {parsed} of 8 message fields could be parsed")]
    Incomplete {
        /// The amount of fields that were parsed before the first
        /// malformed one.
        parsed: usize,
    },
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn encodes_zero_padded_uppercase_fields() {
        let msg = Message::new([0x52, 0x00, 0x0a, 0xff, 0x01, 0x10, 0x7f, 0x80]);
        assert_eq!(encode(&msg), "0x52,0x00,0x0A,0xFF,0x01,0x10,0x7F,0x80");
    }

    #[test]
    fn decodes_line_with_trailing_newline() {
        let msg = decode("0x57,0x01,0x00,0x00,0x00,0x00,0x00,0x00\n").unwrap();
        assert_eq!(msg, Message::new([0x57, 0x01, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn decodes_single_digit_and_lowercase_fields() {
        let msg: Message = "0x1,0xa,0xBc,0x0,0x0,0x0,0x0,0xf".parse().unwrap();
        assert_eq!(msg.into_bytes(), [0x01, 0x0a, 0xbc, 0, 0, 0, 0, 0x0f]);
    }

    #[test]
    fn partial_decode_reports_parsed_fields() {
        let (msg, parsed) = decode_partial("0x52,0x11,garbage,0x00");
        assert_eq!(parsed, 2);
        assert_eq!(&msg.as_bytes()[..2], &[0x52, 0x11]);

        assert_eq!(
            decode("0x52,0x11,garbage,0x00"),
            Err(CodecError::Incomplete { parsed: 2 })
        );
    }

    #[test]
    fn rejects_oversized_and_unprefixed_fields() {
        assert_eq!(decode_partial("0x123").1, 0);
        assert_eq!(decode_partial("52,0x00").1, 0);
        assert_eq!(decode_partial("0x,0x00").1, 0);
        assert_eq!(decode_partial("").1, 0);
    }

    #[test]
    fn ignores_fields_beyond_the_eighth() {
        let text = "0x01,0x02,0x03,0x04,0x05,0x06,0x07,0x08,0x09";
        assert_eq!(decode(text).unwrap().into_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn random_messages_survive_encoding() {
        let mut rng = rand::rng();
        for _ in 0..256 {
            let msg = Message::new(rng.random());
            assert_eq!(decode(&encode(&msg)), Ok(msg));
        }
    }
}
