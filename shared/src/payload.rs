/// An opaque byte stream travelling inside an [`Envelope`](crate::Envelope).
///
/// Decoding consumes bytes by advancing the read cursor, so a payload that
/// has been decoded once cannot be decoded again. Consequently every
/// fan-out to more than one consumer must hand each consumer its own
/// [`clone`](Clone::clone), which deep-copies both buffer and cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    buffer: Vec<u8>,
    cursor: usize,
}

impl Payload {
    pub fn from_bytes(buffer: Vec<u8>) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// The full underlying buffer, regardless of cursor position. This is
    /// what goes onto the wire.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// The unconsumed tail of the stream.
    pub fn remaining(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }

    pub fn is_consumed(&self) -> bool {
        self.cursor >= self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub(crate) fn advance(&mut self, count: usize) {
        self.cursor = (self.cursor + count).min(self.buffer.len());
    }
}
