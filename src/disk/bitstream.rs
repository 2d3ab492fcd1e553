//! A bounded, MSB-first bit reader over a byte slice.

/// Reads arbitrary-width bit fields from a byte buffer.  Reads past the end
/// of the buffer fail without consuming anything.
pub struct BitStream<'a> {
    bytes: &'a [u8],
    position: usize, // in bits
}

impl<'a> BitStream<'a> {
    pub fn new(bytes: &'a [u8]) -> BitStream<'a> {
        BitStream { bytes, position: 0 }
    }

    /// The current bit position.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// The number of unread bits.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() * 8 - self.position
    }

    /// Return the next `count` bits (at most 32) without consuming them.
    pub fn peek(&self, count: usize) -> Option<u32> {
        assert!(count <= 32);
        if count > self.remaining() {
            return None;
        }
        let mut value = 0u32;
        for i in self.position..self.position + count {
            let bit = (self.bytes[i / 8] >> (7 - (i % 8))) & 1;
            value = (value << 1) | bit as u32;
        }
        Some(value)
    }

    /// Consume and return the next `count` bits (at most 32).
    pub fn read(&mut self, count: usize) -> Option<u32> {
        let value = self.peek(count)?;
        self.position += count;
        Some(value)
    }

    #[inline]
    pub fn read_bit(&mut self) -> Option<bool> {
        self.read(1).map(|b| b == 1)
    }

    /// Step back `count` bits, stopping at the start of the stream.
    pub fn rewind(&mut self, count: usize) {
        self.position = self.position.saturating_sub(count);
    }
}
