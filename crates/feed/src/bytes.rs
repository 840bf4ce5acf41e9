//! Bounds-checked field extraction
//!
//! Every read names an absolute offset into the datagram so a truncated or
//! lying packet produces a `FeedError::Protocol` with the exact position.

use crate::error::FeedError;

pub struct Wire<'a> {
    buf: &'a [u8],
    feed: &'static str,
}

impl<'a> Wire<'a> {
    pub fn new(feed: &'static str, buf: &'a [u8]) -> Self {
        Self { buf, feed }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn require(&self, len: usize) -> Result<(), FeedError> {
        if self.buf.len() < len {
            return Err(FeedError::protocol(
                self.feed,
                self.buf.len(),
                format!("buffer {} shorter than required {}", self.buf.len(), len),
            ));
        }
        Ok(())
    }

    fn bytes<const N: usize>(&self, off: usize) -> Result<[u8; N], FeedError> {
        self.buf
            .get(off..off + N)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| {
                FeedError::protocol(self.feed, off, format!("read of {N} bytes past end"))
            })
    }

    pub fn u8(&self, off: usize) -> Result<u8, FeedError> {
        Ok(self.bytes::<1>(off)?[0])
    }

    pub fn char_at(&self, off: usize) -> Result<char, FeedError> {
        Ok(self.u8(off)? as char)
    }

    pub fn i16_be(&self, off: usize) -> Result<i16, FeedError> {
        Ok(i16::from_be_bytes(self.bytes(off)?))
    }

    pub fn u16_be(&self, off: usize) -> Result<u16, FeedError> {
        Ok(u16::from_be_bytes(self.bytes(off)?))
    }

    pub fn i32_be(&self, off: usize) -> Result<i32, FeedError> {
        Ok(i32::from_be_bytes(self.bytes(off)?))
    }

    pub fn u32_be(&self, off: usize) -> Result<u32, FeedError> {
        Ok(u32::from_be_bytes(self.bytes(off)?))
    }

    pub fn f64_be(&self, off: usize) -> Result<f64, FeedError> {
        Ok(f64::from_be_bytes(self.bytes(off)?))
    }

    pub fn u16_le(&self, off: usize) -> Result<u16, FeedError> {
        Ok(u16::from_le_bytes(self.bytes(off)?))
    }

    pub fn i32_le(&self, off: usize) -> Result<i32, FeedError> {
        Ok(i32::from_le_bytes(self.bytes(off)?))
    }

    pub fn i64_le(&self, off: usize) -> Result<i64, FeedError> {
        Ok(i64::from_le_bytes(self.bytes(off)?))
    }

    /// Fixed-width char field, trimmed at the first NUL and of trailing
    /// whitespace.
    pub fn fixed_str(&self, off: usize, len: usize) -> Result<String, FeedError> {
        let raw = self.buf.get(off..off + len).ok_or_else(|| {
            FeedError::protocol(self.feed, off, format!("string read of {len} bytes past end"))
        })?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&raw[..end]).trim_end().to_string())
    }
}
