//! Accumulated output of a child process.

use std::borrow::Cow;

/// Bytes read from a child's terminal, kept for after-the-fact inspection.
///
/// Output is stored raw so a UTF-8 sequence split across two reads is joined
/// back together before it is ever decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputCapture {
    bytes: Vec<u8>,
}

impl OutputCapture {
    /// Create an empty capture buffer.
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Raw captured bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Captured output decoded as UTF-8, replacing invalid sequences.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_accumulates() {
        let mut capture = OutputCapture::new();
        assert!(capture.is_empty());

        capture.push(b"hello ");
        capture.push(b"world\n");

        assert_eq!(capture.len(), 12);
        assert_eq!(capture.to_string_lossy(), "hello world\n");
    }

    #[test]
    fn test_split_utf8_sequence() {
        // "é" is 0xC3 0xA9; a read boundary can fall between the two bytes
        let mut capture = OutputCapture::new();
        capture.push(&[b'c', b'a', b'f', 0xC3]);
        capture.push(&[0xA9]);

        assert_eq!(capture.to_string_lossy(), "café");
    }

    #[test]
    fn test_clear() {
        let mut capture = OutputCapture::new();
        capture.push(b"data");
        capture.clear();

        assert!(capture.is_empty());
        assert_eq!(capture.as_bytes(), b"");
    }
}
