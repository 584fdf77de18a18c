//! Owned records and a reader that assembles them from a byte stream.
//!
//! The server core never materialises records: content goes straight into the
//! connection's buffer. [`RecordReader`] is for the other side of the socket,
//! e.g. reading the engine's responses back in tests or in a web-server-side
//! client.
//!
//! # Example
//!
//! ```
//! use fcgi_engine::protocol::{build_record, Header, RecordReader, RecordType};
//!
//! let mut bytes = build_record(&Header::new(RecordType::Stdout, 1, 5), b"hello");
//! bytes.extend(build_record(&Header::new(RecordType::Stdout, 1, 0), b""));
//!
//! let mut reader = RecordReader::new();
//! let records = reader.push(&bytes);
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[0].content(), b"hello");
//! assert!(records[1].is_end_of_stream());
//! ```

use bytes::Bytes;

use super::record_parser::RecordParser;
use super::wire_format::{Header, RecordType, HEADER_SIZE};
use crate::buffer::Buffer;

/// A complete record with owned content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Decoded header.
    pub header: Header,
    /// Content bytes, padding removed.
    pub content: Bytes,
}

impl Record {
    /// Create a record from header and content.
    pub fn new(header: Header, content: Bytes) -> Self {
        Self { header, content }
    }

    /// Get a reference to the content bytes.
    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Record type, if known.
    #[inline]
    pub fn kind(&self) -> Option<RecordType> {
        self.header.kind()
    }

    /// Get the request ID.
    #[inline]
    pub fn request_id(&self) -> u16 {
        self.header.request_id
    }

    /// Zero-length content marks the end of a stream.
    #[inline]
    pub fn is_end_of_stream(&self) -> bool {
        self.header.is_end_of_stream()
    }
}

/// Assembles owned [`Record`]s from arbitrarily fragmented input.
#[derive(Debug, Default)]
pub struct RecordReader {
    parser: RecordParser,
    content: Buffer,
}

impl RecordReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push data and extract all records it completes.
    ///
    /// Partial records are kept for the next push.
    pub fn push(&mut self, mut data: &[u8]) -> Vec<Record> {
        let mut records = Vec::new();
        while !data.is_empty() {
            let (consumed, header) = self.parser.advance(data, &mut self.content);
            data = &data[consumed..];
            if let Some(header) = header {
                records.push(Record::new(
                    header,
                    Bytes::copy_from_slice(self.content.as_slice()),
                ));
                self.content.reset();
            }
        }
        records
    }

    /// True if no partial record is buffered.
    pub fn is_idle(&self) -> bool {
        self.parser.is_at_boundary() && self.content.is_empty()
    }
}

/// Build a complete record: header, content, then `padding_length` zero bytes.
///
/// The header's `content_length` is written as given; callers keep it in sync
/// with `content`.
pub fn build_record(header: &Header, content: &[u8]) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(HEADER_SIZE + content.len() + header.padding_length as usize);
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(content);
    out.resize(out.len() + header.padding_length as usize, 0);
    out
}
