//! Incremental record parser.
//!
//! Implements a state machine for records that arrive split at arbitrary byte
//! boundaries:
//! - `AwaitingHeader`: collecting the 8 header bytes into a scratch area
//! - `HeaderComplete`: appending content bytes to the caller's [`Buffer`]
//! - `ContentComplete`: discarding padding bytes
//! - `RecordComplete`: record is ready for dispatch
//!
//! The parser does not own the content buffer. Content accumulates in the
//! buffer passed to [`RecordParser::advance`], so several stream records
//! (e.g. PARAMS) can be concatenated before the application sees them.
//!
//! # Example
//!
//! ```
//! use fcgi_engine::buffer::Buffer;
//! use fcgi_engine::protocol::{build_record, Header, RecordParser, RecordType};
//!
//! let bytes = build_record(&Header::new(RecordType::Stdin, 1, 2), b"hi");
//! let mut parser = RecordParser::new();
//! let mut content = Buffer::new();
//!
//! let (consumed, record) = parser.advance(&bytes, &mut content);
//! assert_eq!(consumed, bytes.len());
//! assert_eq!(record.unwrap().kind(), Some(RecordType::Stdin));
//! assert_eq!(content.as_slice(), b"hi");
//! ```

use super::wire_format::{Header, HEADER_SIZE};
use crate::buffer::Buffer;

/// Parser states, re-entered once per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Need more header bytes.
    AwaitingHeader,
    /// Header decoded, collecting content.
    HeaderComplete,
    /// Content collected, skipping padding.
    ContentComplete,
    /// Whole record consumed; reset on the next call.
    RecordComplete,
}

/// Per-connection record parser.
#[derive(Debug, Clone)]
pub struct RecordParser {
    state: ParserState,
    /// Header bytes collected so far.
    header_buf: [u8; HEADER_SIZE],
    header_len: usize,
    /// Decoded header of the current record.
    header: Header,
    content_read: usize,
    padding_read: usize,
}

impl RecordParser {
    /// Create a parser waiting for the first header byte.
    pub fn new() -> Self {
        Self {
            state: ParserState::AwaitingHeader,
            header_buf: [0u8; HEADER_SIZE],
            header_len: 0,
            header: Header::default(),
            content_read: 0,
            padding_read: 0,
        }
    }

    /// Feed bytes until one record completes or the input runs out.
    ///
    /// Returns the number of bytes consumed and, if a record completed, its
    /// header. Content bytes of the record are appended to `content`; padding
    /// is dropped. Call again with the unconsumed tail to continue with the
    /// next record; a single transport read may hold many records.
    ///
    /// A record with no content and no padding completes in the same call
    /// that decodes its header.
    pub fn advance(&mut self, input: &[u8], content: &mut Buffer) -> (usize, Option<Header>) {
        let mut consumed = 0;

        loop {
            let rest = &input[consumed..];
            match self.state {
                ParserState::RecordComplete => self.reset(),

                ParserState::AwaitingHeader => {
                    let n = (HEADER_SIZE - self.header_len).min(rest.len());
                    self.header_buf[self.header_len..self.header_len + n]
                        .copy_from_slice(&rest[..n]);
                    self.header_len += n;
                    consumed += n;

                    if self.header_len < HEADER_SIZE {
                        return (consumed, None);
                    }
                    self.header = Header::decode(&self.header_buf).unwrap_or_default();
                    self.state = ParserState::HeaderComplete;
                }

                ParserState::HeaderComplete => {
                    let wanted = self.header.content_length as usize - self.content_read;
                    let n = wanted.min(rest.len());
                    content.append(&rest[..n]);
                    self.content_read += n;
                    consumed += n;

                    if self.content_read < self.header.content_length as usize {
                        return (consumed, None);
                    }
                    self.state = ParserState::ContentComplete;
                }

                ParserState::ContentComplete => {
                    let wanted = self.header.padding_length as usize - self.padding_read;
                    let n = wanted.min(rest.len());
                    self.padding_read += n;
                    consumed += n;

                    if self.padding_read < self.header.padding_length as usize {
                        return (consumed, None);
                    }
                    self.state = ParserState::RecordComplete;
                    return (consumed, Some(self.header));
                }
            }
        }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// True between records: no header, content or padding bytes pending.
    pub fn is_at_boundary(&self) -> bool {
        match self.state {
            ParserState::RecordComplete => true,
            ParserState::AwaitingHeader => self.header_len == 0,
            _ => false,
        }
    }

    /// Header of the record being parsed (or just completed).
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Drop partial progress and wait for a new header.
    pub fn reset(&mut self) {
        self.state = ParserState::AwaitingHeader;
        self.header_len = 0;
        self.content_read = 0;
        self.padding_read = 0;
    }
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_record, RecordType};

    /// Feed `data` in full, collecting every completed header and the content
    /// snapshot taken at completion.
    fn feed_all(
        parser: &mut RecordParser,
        content: &mut Buffer,
        mut data: &[u8],
    ) -> Vec<(Header, Vec<u8>)> {
        let mut out = Vec::new();
        while !data.is_empty() {
            let (n, record) = parser.advance(data, content);
            data = &data[n..];
            if let Some(header) = record {
                out.push((header, content.as_slice().to_vec()));
                content.reset();
            }
        }
        out
    }

    #[test]
    fn test_single_complete_record() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        let bytes = build_record(&Header::new(RecordType::Stdin, 7, 5), b"hello");

        let records = feed_all(&mut parser, &mut content, &bytes);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0.request_id, 7);
        assert_eq!(records[0].1, b"hello");
        assert_eq!(parser.state(), ParserState::RecordComplete);
    }

    #[test]
    fn test_multiple_records_in_one_read() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        let mut data = build_record(&Header::new(RecordType::Params, 1, 3), b"abc");
        data.extend(build_record(&Header::new(RecordType::Params, 1, 0), b""));
        data.extend(build_record(&Header::new(RecordType::Stdin, 1, 0), b""));

        let records = feed_all(&mut parser, &mut content, &data);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].1, b"abc");
        assert!(records[1].0.is_end_of_stream());
        assert_eq!(records[2].0.kind(), Some(RecordType::Stdin));
    }

    #[test]
    fn test_padding_is_discarded() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        let header = Header::new(RecordType::Stdin, 1, 3).with_padding(5);
        let mut data = build_record(&header, b"xyz");
        data.extend(build_record(&Header::new(RecordType::Stdin, 1, 1), b"!"));

        let records = feed_all(&mut parser, &mut content, &data);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1, b"xyz");
        assert_eq!(records[1].1, b"!");
    }

    #[test]
    fn test_empty_record_completes_with_header() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        let bytes = Header::new(RecordType::Params, 1, 0).encode();

        let (consumed, record) = parser.advance(&bytes, &mut content);

        assert_eq!(consumed, HEADER_SIZE);
        assert!(record.is_some());
        assert!(content.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        let header = Header::new(RecordType::Stdin, 0x1234, 2).with_padding(3);
        let bytes = build_record(&header, b"hi");

        let mut records = Vec::new();
        for byte in &bytes {
            records.extend(feed_all(&mut parser, &mut content, std::slice::from_ref(byte)));
        }

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, header);
        assert_eq!(records[0].1, b"hi");
    }

    #[test]
    fn test_fragmentation_transparency_all_split_points() {
        let header = Header::new(RecordType::Params, 3, 11).with_padding(5);
        let bytes = build_record(&header, b"REQUEST_URI");

        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        let whole = feed_all(&mut parser, &mut content, &bytes);

        for k in 0..bytes.len() {
            let mut parser = RecordParser::new();
            let mut content = Buffer::new();
            let mut split = feed_all(&mut parser, &mut content, &bytes[..k]);
            split.extend(feed_all(&mut parser, &mut content, &bytes[k..]));
            assert_eq!(split, whole, "split at {}", k);
        }
    }

    #[test]
    fn test_fragmented_states() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        let header = Header::new(RecordType::Stdin, 1, 4).with_padding(2);
        let bytes = build_record(&header, b"data");

        parser.advance(&bytes[..5], &mut content);
        assert_eq!(parser.state(), ParserState::AwaitingHeader);

        parser.advance(&bytes[5..10], &mut content);
        assert_eq!(parser.state(), ParserState::HeaderComplete);
        assert_eq!(content.as_slice(), b"da");

        parser.advance(&bytes[10..13], &mut content);
        assert_eq!(parser.state(), ParserState::ContentComplete);

        let (_, record) = parser.advance(&bytes[13..], &mut content);
        assert_eq!(record, Some(header));
    }

    #[test]
    fn test_unknown_type_is_framed() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        let header = Header {
            version: 1,
            record_type: 77,
            request_id: 1,
            content_length: 2,
            padding_length: 0,
        };
        let mut data = build_record(&header, b"??");
        data.extend(build_record(&Header::new(RecordType::Stdin, 1, 0), b""));

        let records = feed_all(&mut parser, &mut content, &data);
        assert_eq!(records.len(), 2);
        assert!(records[0].0.kind().is_none());
        assert_eq!(records[1].0.kind(), Some(RecordType::Stdin));
    }

    #[test]
    fn test_reset_discards_partial_header() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        parser.advance(&[1, 5, 0], &mut content);
        parser.reset();

        let bytes = build_record(&Header::new(RecordType::Stdin, 9, 0), b"");
        let (_, record) = parser.advance(&bytes, &mut content);
        assert_eq!(record.unwrap().request_id, 9);
    }

    #[test]
    fn test_boundary_tracks_partial_header() {
        let mut parser = RecordParser::new();
        let mut content = Buffer::new();
        assert!(parser.is_at_boundary());

        let bytes = build_record(&Header::new(RecordType::Stdin, 3, 2), b"ok");
        parser.advance(&bytes[..5], &mut content);
        assert_eq!(parser.state(), ParserState::AwaitingHeader);
        assert!(!parser.is_at_boundary());

        parser.advance(&bytes[5..9], &mut content);
        assert!(!parser.is_at_boundary());

        let (_, record) = parser.advance(&bytes[9..], &mut content);
        assert!(record.is_some());
        assert!(parser.is_at_boundary());
    }
}
