//! Implements the fixed-size message exchanged with the box.

/// The size of every message sent to or received from the box.
pub const MESSAGE_SIZE: usize = 8;

/// Represents a single 8-byte message.
///
/// Messages have no identity beyond their bytes and are copied by value
/// across every boundary (queue, report callback, writes).
///
/// By convention the first byte is a command/reply tag used to correlate a
/// reply with the command that caused it, see [`Self::tag`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message([u8; MESSAGE_SIZE]);

impl Message {
    /// Constructs a message from its raw bytes.
    pub const fn new(bytes: [u8; MESSAGE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Constructs a message consisting of a tag followed by seven zero bytes.
    pub const fn with_tag(tag: u8) -> Self {
        let mut bytes = [0u8; MESSAGE_SIZE];
        bytes[0] = tag;
        Self(bytes)
    }

    /// Copies a message out of a raw input report.
    ///
    /// Reports longer than [`MESSAGE_SIZE`] are truncated and shorter ones are
    /// padded with zeros.
    ///
    /// Returns [`None`] if the report is empty.
    pub fn from_report(report: &[u8]) -> Option<Self> {
        if report.is_empty() {
            return None;
        }

        let mut bytes = [0u8; MESSAGE_SIZE];
        let len = report.len().min(MESSAGE_SIZE);
        bytes[..len].copy_from_slice(&report[..len]);
        Some(Self(bytes))
    }

    /// The command/reply tag, which is the first byte of the message.
    pub const fn tag(&self) -> u8 {
        self.0[0]
    }

    /// Borrows the raw bytes of the message.
    pub const fn as_bytes(&self) -> &[u8; MESSAGE_SIZE] {
        &self.0
    }

    /// Returns the raw bytes of the message.
    pub const fn into_bytes(self) -> [u8; MESSAGE_SIZE] {
        self.0
    }
}

impl From<[u8; MESSAGE_SIZE]> for Message {
    fn from(bytes: [u8; MESSAGE_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<Message> for [u8; MESSAGE_SIZE] {
    fn from(msg: Message) -> Self {
        msg.0
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Message({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_report_truncates_long_reports() {
        let report = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let msg = Message::from_report(&report).unwrap();
        assert_eq!(msg.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn from_report_pads_short_reports() {
        let msg = Message::from_report(&[0x52, 0x01]).unwrap();
        assert_eq!(msg.into_bytes(), [0x52, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn from_report_rejects_empty_reports() {
        assert!(Message::from_report(&[]).is_none());
    }

    #[test]
    fn tag_is_first_byte() {
        assert_eq!(Message::with_tag(0x57).tag(), 0x57);
        assert_eq!(Message::new([0x51, 9, 9, 9, 9, 9, 9, 9]).tag(), 0x51);
    }
}
