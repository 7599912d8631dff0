//! Cursor over a borrowed byte slice for decoding wire-format records.

use crate::error::WireError;
use crate::varint::read_varint;

pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn varint(&mut self) -> Result<u64, WireError> {
        read_varint(self.buf, &mut self.offset)
    }

    /// Read exactly `n` bytes.
    pub fn fixed(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    /// Read exactly `N` bytes into a fixed-size array.
    pub fn fixed_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let slice = self.fixed(N)?;
        Ok(slice.try_into().expect("fixed() returns exactly N bytes"))
    }

    /// Varint length prefix followed by exactly that many bytes.
    pub fn bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.varint()? as usize;
        self.fixed(len)
    }

    /// Varint count, then `decode_item` called once per item in order.
    pub fn list<T>(
        &mut self,
        mut decode_item: impl FnMut(&mut Self) -> Result<T, WireError>,
    ) -> Result<Vec<T>, WireError> {
        let count = self.varint()? as usize;
        let mut items = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            items.push(decode_item(self)?);
        }
        Ok(items)
    }

    /// Must be called after decoding a top-level record: any unconsumed
    /// bytes indicate a malformed or forward-incompatible payload.
    pub fn expect_exhausted(&self) -> Result<(), WireError> {
        if self.remaining() != 0 {
            return Err(WireError::TrailingGarbage {
                remaining: self.remaining(),
            });
        }
        Ok(())
    }
}

/// Validate that a field is exactly `expected` bytes, naming it in errors.
pub fn expect_field_size(field: &'static str, bytes: &[u8], expected: usize) -> Result<(), WireError> {
    if bytes.len() != expected {
        return Err(WireError::InvalidFieldSize {
            field,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;

    #[test]
    fn fixed_then_bytes_then_list_roundtrip() {
        let mut w = Writer::new();
        w.fixed(&[1, 2, 3]).bytes(b"hello").list(&[10u64, 20, 30], |w, v| {
            w.varint(*v);
        });
        let buf = w.into_bytes();

        let mut r = Reader::new(&buf);
        assert_eq!(r.fixed(3).unwrap(), &[1, 2, 3]);
        assert_eq!(r.bytes().unwrap(), b"hello");
        let list = r.list(|r| r.varint()).unwrap();
        assert_eq!(list, vec![10, 20, 30]);
        r.expect_exhausted().unwrap();
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut w = Writer::new();
        w.varint(42);
        let mut buf = w.into_bytes();
        buf.push(0xff);

        let mut r = Reader::new(&buf);
        r.varint().unwrap();
        assert!(matches!(
            r.expect_exhausted(),
            Err(WireError::TrailingGarbage { remaining: 1 })
        ));
    }
}
