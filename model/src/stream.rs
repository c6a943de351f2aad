//! Client-side byte ranges over datastream content.
//!
//! The repository can only send whole content, so a range is produced by
//! reading everything and discarding bytes outside the window.

use std::io::{self, Read};

/// A lazy, one-shot iterator over the bytes `[from, from + length)` of a
/// reader, yielded in chunks of at most `chunk_size` bytes.
pub struct ByteRange {
    reader: Option<Box<dyn Read + Send>>,
    start: u64,
    end: u64,
    position: u64,
    buf: Vec<u8>,
}

impl ByteRange {
    /// Windows `reader` to `[from, from + length)`.
    #[must_use]
    pub fn new(reader: Box<dyn Read + Send>, from: u64, length: u64, chunk_size: usize) -> Self {
        Self {
            reader: (length > 0).then_some(reader),
            start: from,
            end: from.saturating_add(length),
            position: 0,
            buf: vec![0; chunk_size.max(1)],
        }
    }

    /// Reads the remaining range into one buffer.
    ///
    /// # Errors
    ///
    /// The first read error.
    pub fn collect_bytes(self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in self {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteRange")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl Iterator for ByteRange {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            if self.position >= self.end {
                self.reader = None;
                return None;
            }
            let n = match reader.read(&mut self.buf) {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e));
                }
            };
            let chunk_start = self.position;
            let chunk_end = chunk_start + n as u64;
            self.position = chunk_end;

            let lo = self.start.max(chunk_start);
            let hi = self.end.min(chunk_end);
            if lo < hi {
                let (lo, hi) = ((lo - chunk_start) as usize, (hi - chunk_start) as usize);
                return Some(Ok(self.buf[lo..hi].to_vec()));
            }
        }
    }
}

impl std::iter::FusedIterator for ByteRange {}
