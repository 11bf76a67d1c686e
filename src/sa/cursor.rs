//! Bounds-checked little-endian reading over a byte slice.

use thiserror::Error;

/// Input ended before a value could be read.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unexpected end of data at byte {offset} (needed {needed} more)")]
pub struct Truncated {
    pub offset: usize,
    pub needed: usize,
}

/// Copies a slice of exactly `N` bytes into an array.
pub(crate) fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(bytes);
    buf
}

pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], Truncated> {
        if n > self.remaining() {
            return Err(Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Skips up to `n` bytes, stopping at the end of input.
    pub(crate) fn skip_at_most(&mut self, n: usize) {
        self.pos += n.min(self.remaining());
    }

    pub(crate) fn u8(&mut self) -> Result<u8, Truncated> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16_le(&mut self) -> Result<u16, Truncated> {
        self.take(2).map(|b| u16::from_le_bytes(le_array(b)))
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32, Truncated> {
        self.take(4).map(|b| u32::from_le_bytes(le_array(b)))
    }

    pub(crate) fn u64_le(&mut self) -> Result<u64, Truncated> {
        self.take(8).map(|b| u64::from_le_bytes(le_array(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_and_truncation() {
        let data = [1u8, 0x34, 0x12, 0xff, 0, 0, 0];
        let mut cursor = ByteCursor::new(&data);

        assert_eq!(cursor.u8(), Ok(1));
        assert_eq!(cursor.u16_le(), Ok(0x1234));
        assert_eq!(cursor.remaining(), 4);
        assert_eq!(
            cursor.u64_le(),
            Err(Truncated {
                offset: 3,
                needed: 4
            })
        );
        assert_eq!(cursor.u32_le(), Ok(0xff));
        assert!(cursor.is_empty());

        cursor.skip_at_most(10);
        assert!(cursor.is_empty());
    }
}
