//! On-disk layout of a cache file.
//!
//! ```text
//! +--------+----------------------+----------------------+----------------+
//! | "NXC1" | expires_at (i64, BE) | value_len (u64, BE)  | value bytes... |
//! +--------+----------------------+----------------------+----------------+
//!   4 B            8 B                    8 B
//! ```
//!
//! A file whose size disagrees with `value_len` was cut short (or appended
//! to) and is rejected.

use bytes::{Buf, BufMut, Bytes, BytesMut};

const MAGIC: &[u8; 4] = b"NXC1";

/// Size of the fixed header preceding the value.
pub(crate) const HEADER_LEN: usize = MAGIC.len() + size_of::<i64>() + size_of::<u64>();

/// The fixed-size prefix of a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) expires_at: i64,
    pub(crate) value_len: u64,
}

impl Header {
    /// Size in bytes of a complete file carrying this header.
    pub(crate) fn file_len(&self) -> u64 {
        HEADER_LEN as u64 + self.value_len
    }

    /// An entry is live up to and including its expiry second.
    pub(crate) fn is_live(&self, now: i64) -> bool {
        self.expires_at >= now
    }
}

/// A decoded cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) expires_at: i64,
    pub(crate) value: Bytes,
}

impl Record {
    pub(crate) fn new(expires_at: i64, value: Bytes) -> Self {
        Self { expires_at, value }
    }

    /// Serializes header and value into one contiguous buffer.
    pub(crate) fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.value.len());
        buf.put_slice(MAGIC);
        buf.put_i64(self.expires_at);
        buf.put_u64(self.value.len() as u64);
        buf.put_slice(&self.value);
        buf.freeze()
    }

    /// Parses a whole cache file. Returns `None` for foreign files and for
    /// files whose length does not match their header.
    pub(crate) fn decode(mut raw: Bytes) -> Option<Self> {
        let header = decode_header(&raw)?;
        if raw.len() as u64 != header.file_len() {
            return None;
        }
        raw.advance(HEADER_LEN);
        Some(Self {
            expires_at: header.expires_at,
            value: raw,
        })
    }

    pub(crate) fn is_live(&self, now: i64) -> bool {
        self.expires_at >= now
    }
}

/// Reads the header from the first [`HEADER_LEN`] bytes of a cache file.
pub(crate) fn decode_header(mut header: &[u8]) -> Option<Header> {
    if header.len() < HEADER_LEN || &header[..MAGIC.len()] != MAGIC {
        return None;
    }
    header.advance(MAGIC.len());
    let expires_at = header.get_i64();
    let value_len = header.get_u64();
    Some(Header {
        expires_at,
        value_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let record = Record::new(1, Bytes::from_static(b"hi"));
        let encoded = record.encode();
        assert_eq!(encoded.len(), HEADER_LEN + 2);
        assert_eq!(&encoded[..4], b"NXC1");
        assert_eq!(&encoded[4..12], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&encoded[12..20], &[0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(&encoded[20..], b"hi");
    }

    #[test]
    fn decode_restores_record() {
        let record = Record::new(2_147_401_800, Bytes::from_static(b"<html></html>"));
        assert_eq!(Record::decode(record.encode()), Some(record));
    }

    #[test]
    fn empty_value_allowed() {
        let record = Record::new(-5, Bytes::new());
        let decoded = Record::decode(record.encode()).unwrap();
        assert_eq!(decoded.expires_at, -5);
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn truncated_header_rejected() {
        assert_eq!(Record::decode(Bytes::from_static(b"NXC1\0\0")), None);
        assert_eq!(Record::decode(Bytes::new()), None);
    }

    #[test]
    fn truncated_body_rejected() {
        let full = Record::new(2_147_401_800, Bytes::from_static(b"<html>full page</html>")).encode();
        assert_eq!(Record::decode(full.slice(..HEADER_LEN + 6)), None);
        assert_eq!(Record::decode(full.slice(..HEADER_LEN)), None);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut raw = BytesMut::from(&Record::new(10, Bytes::from_static(b"abc")).encode()[..]);
        raw.put_slice(b"junk");
        assert_eq!(Record::decode(raw.freeze()), None);
    }

    #[test]
    fn foreign_file_rejected() {
        assert_eq!(
            Record::decode(Bytes::from_static(b"plain old file contents")),
            None
        );
    }

    #[test]
    fn header_reports_full_length() {
        let encoded = Record::new(7, Bytes::from_static(b"value")).encode();
        let header = decode_header(&encoded).unwrap();
        assert_eq!(header.expires_at, 7);
        assert_eq!(header.value_len, 5);
        assert_eq!(header.file_len(), encoded.len() as u64);
    }

    #[test]
    fn liveness_includes_expiry_second() {
        let record = Record::new(100, Bytes::new());
        assert!(record.is_live(99));
        assert!(record.is_live(100));
        assert!(!record.is_live(101));
        assert!(decode_header(&record.encode()).unwrap().is_live(100));
    }
}
