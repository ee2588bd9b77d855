use byteorder::{ByteOrder, LittleEndian};
use std::io::Write;

/// Below this capacity the stream doubles when it grows, above it it grows by 1/8.
const CAPACITY_DOUBLING_MAX: usize = 1024 * 1024;
const MIN_CAPACITY: usize = 256;

/// Growable, append-only byte buffer.
///
/// `contents` is always fully initialised up to its capacity; only the first `cursor` bytes are
/// meaningful. [`reset`](Self::reset) rewinds the cursor and keeps the allocation around.
#[derive(Debug, Clone, Default)]
pub struct ByteStream {
    contents: Vec<u8>,
    cursor: usize,
}

impl ByteStream {
    pub const fn new() -> Self {
        Self {
            contents: Vec::new(),
            cursor: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contents: vec![0; capacity],
            cursor: 0,
        }
    }

    /// Number of bytes written so far.
    #[inline]
    pub const fn len(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.contents.len()
    }

    /// Rewinds the stream so its allocation can be reused.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.expand(self.cursor + 1);
        self.contents[self.cursor] = byte;
        self.cursor += 1;
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        let end = self.cursor + data.len();
        self.expand(end);
        self.contents[self.cursor..end].copy_from_slice(data);
        self.cursor = end;
    }

    /// Appends `len` bytes of `data` starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the window lies outside of `data`.
    pub fn write_bytes_view(&mut self, data: &[u8], offset: usize, len: usize) {
        self.write_bytes(&data[offset..offset + len]);
    }

    #[inline]
    pub fn write_u16_le(&mut self, value: u16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.write_bytes(&buf);
    }

    /// Owned copy of the written bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes_view().to_vec()
    }

    /// The written bytes, borrowed until the next write.
    #[inline]
    pub fn bytes_view(&self) -> &[u8] {
        &self.contents[..self.cursor]
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.contents.truncate(self.cursor);
        self.contents
    }

    fn expand(&mut self, required: usize) {
        let prev_capacity = self.contents.len();
        if prev_capacity >= required {
            return;
        }

        let grown = if prev_capacity < CAPACITY_DOUBLING_MAX {
            prev_capacity * 2
        } else {
            prev_capacity + prev_capacity / 8
        };
        let mut new_capacity = required.max(grown);
        if prev_capacity != 0 {
            new_capacity = new_capacity.max(MIN_CAPACITY);
        }

        self.contents.resize(new_capacity, 0);
    }
}

impl Write for ByteStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_writes_match_one_bulk_write() {
        let data: Vec<u8> = (0..=255u8).cycle().take(3000).collect();

        let mut bulk = ByteStream::new();
        bulk.write_bytes(&data);

        let mut single = ByteStream::with_capacity(1);
        for &b in &data {
            single.write_byte(b);
        }

        let mut mixed = ByteStream::new();
        let (head, tail) = data.split_at(1234);
        mixed.write_bytes_view(head, 0, 1000);
        mixed.write_bytes(&head[1000..]);
        for &b in &tail[..10] {
            mixed.write_byte(b);
        }
        mixed.write_bytes_view(tail, 10, tail.len() - 10);

        assert_eq!(bulk.bytes_view().len(), data.len());
        assert_eq!(bulk.bytes_view(), &data[..]);
        assert_eq!(single.bytes_view(), &data[..]);
        assert_eq!(mixed.bytes(), data);
    }

    #[test]
    fn growth_policy() {
        let mut s = ByteStream::with_capacity(1);
        s.write_bytes(&[1, 2]);
        assert_eq!(s.capacity(), 256);

        let mut s = ByteStream::with_capacity(CAPACITY_DOUBLING_MAX);
        s.write_bytes(&vec![0; CAPACITY_DOUBLING_MAX + 1]);
        assert_eq!(s.capacity(), CAPACITY_DOUBLING_MAX + CAPACITY_DOUBLING_MAX / 8);
        assert!(s.capacity() >= s.len());
    }

    #[test]
    fn reset_keeps_allocation() {
        let mut s = ByteStream::new();
        s.write_bytes(b"GIF89a");
        s.write_u16_le(0x0102);
        assert_eq!(s.bytes_view(), b"GIF89a\x02\x01");

        let capacity = s.capacity();
        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.capacity(), capacity);

        s.write_byte(0x3B);
        assert_eq!(s.into_bytes(), vec![0x3B]);
    }
}
