//! Wire format encoding and decoding.
//!
//! Implements the 8-byte FastCGI record header:
//! ```text
//! ┌─────────┬──────┬────────────┬────────────────┬─────────┬──────────┐
//! │ Version │ Type │ Request ID │ Content Length │ Padding │ Reserved │
//! │ 1 byte  │1 byte│ uint16 BE  │   uint16 BE    │ 1 byte  │  1 byte  │
//! └─────────┴──────┴────────────┴────────────────┴─────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. A record on the wire is the header,
//! `content_length` content bytes, then `padding_length` padding bytes.

use std::fmt;

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// The only protocol version in use.
pub const VERSION_1: u8 = 1;

/// Largest content a single record can carry.
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 - 1;

/// Request ID used by management records.
pub const NULL_REQUEST_ID: u16 = 0;

/// Length of the BEGIN_REQUEST and END_REQUEST bodies.
pub const BODY_SIZE: usize = 8;

/// Record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    BeginRequest = 1,
    AbortRequest = 2,
    EndRequest = 3,
    Params = 4,
    Stdin = 5,
    Stdout = 6,
    Stderr = 7,
    Data = 8,
    GetValues = 9,
    GetValuesResult = 10,
    UnknownType = 11,
}

impl RecordType {
    /// Map a wire type code to a record type.
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::BeginRequest,
            2 => Self::AbortRequest,
            3 => Self::EndRequest,
            4 => Self::Params,
            5 => Self::Stdin,
            6 => Self::Stdout,
            7 => Self::Stderr,
            8 => Self::Data,
            9 => Self::GetValues,
            10 => Self::GetValuesResult,
            11 => Self::UnknownType,
            _ => return None,
        })
    }

    /// Wire type code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Stream types end with a zero-length record instead of a length.
    #[inline]
    pub fn is_stream(self) -> bool {
        matches!(
            self,
            Self::Params | Self::Stdin | Self::Stdout | Self::Stderr | Self::Data
        )
    }

    /// Management records are sent with [`NULL_REQUEST_ID`].
    #[inline]
    pub fn is_management(self) -> bool {
        matches!(
            self,
            Self::GetValues | Self::GetValuesResult | Self::UnknownType
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeginRequest => "BEGIN_REQUEST",
            Self::AbortRequest => "ABORT_REQUEST",
            Self::EndRequest => "END_REQUEST",
            Self::Params => "PARAMS",
            Self::Stdin => "STDIN",
            Self::Stdout => "STDOUT",
            Self::Stderr => "STDERR",
            Self::Data => "DATA",
            Self::GetValues => "GET_VALUES",
            Self::GetValuesResult => "GET_VALUES_RESULT",
            Self::UnknownType => "UNKNOWN_TYPE",
        };
        f.write_str(name)
    }
}

/// Role constants from the BEGIN_REQUEST body.
pub mod role {
    /// Responder role.
    pub const RESPONDER: u16 = 1;
    /// Authorizer role.
    pub const AUTHORIZER: u16 = 2;
    /// Filter role.
    pub const FILTER: u16 = 3;
}

/// Flag constants from the BEGIN_REQUEST body.
pub mod flags {
    /// Keep the transport open after END_REQUEST.
    pub const KEEP_CONN: u8 = 0b0000_0001;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Protocol status carried in END_REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ProtocolStatus {
    #[default]
    RequestComplete = 0,
    CantMpxConn = 1,
    Overloaded = 2,
    UnknownRole = 3,
}

impl ProtocolStatus {
    /// Map a wire status code.
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::RequestComplete,
            1 => Self::CantMpxConn,
            2 => Self::Overloaded,
            3 => Self::UnknownRole,
            _ => return None,
        })
    }
}

/// Decoded record header.
///
/// The type is kept as the raw code so that records of unknown type can still
/// be framed and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Protocol version.
    pub version: u8,
    /// Raw record type code.
    pub record_type: u8,
    /// Request identifier (0 = management record).
    pub request_id: u16,
    /// Content length in bytes.
    pub content_length: u16,
    /// Padding length in bytes.
    pub padding_length: u8,
}

impl Header {
    /// Create a version 1 header with no padding.
    pub fn new(record_type: RecordType, request_id: u16, content_length: u16) -> Self {
        Self {
            version: VERSION_1,
            record_type: record_type.code(),
            request_id,
            content_length,
            padding_length: 0,
        }
    }

    /// Builder-style padding setter.
    pub fn with_padding(mut self, padding_length: u8) -> Self {
        self.padding_length = padding_length;
        self
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use fcgi_engine::protocol::{Header, RecordType};
    ///
    /// let header = Header::new(RecordType::Stdout, 1, 13);
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [1, 6, 0, 1, 0, 13, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.version;
        buf[1] = self.record_type;
        buf[2..4].copy_from_slice(&self.request_id.to_be_bytes());
        buf[4..6].copy_from_slice(&self.content_length.to_be_bytes());
        buf[6] = self.padding_length;
        buf[7] = 0;
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use fcgi_engine::protocol::{Header, RecordType};
    ///
    /// let header = Header::decode(&[1, 4, 0, 1, 0, 42, 6, 0]).unwrap();
    /// assert_eq!(header.kind(), Some(RecordType::Params));
    /// assert_eq!(header.content_length, 42);
    /// assert_eq!(header.total_length(), 8 + 42 + 6);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: buf[0],
            record_type: buf[1],
            request_id: u16::from_be_bytes([buf[2], buf[3]]),
            content_length: u16::from_be_bytes([buf[4], buf[5]]),
            padding_length: buf[6],
        })
    }

    /// Record type, if the code is known.
    #[inline]
    pub fn kind(&self) -> Option<RecordType> {
        RecordType::from_u8(self.record_type)
    }

    /// Framed length: header + content + padding.
    #[inline]
    pub fn total_length(&self) -> usize {
        HEADER_SIZE + self.content_length as usize + self.padding_length as usize
    }

    /// Zero-length content marks the end of a stream.
    #[inline]
    pub fn is_end_of_stream(&self) -> bool {
        self.content_length == 0
    }
}

/// Body of a BEGIN_REQUEST record: `role:u16, flags:u8, reserved:u8[5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeginRequestBody {
    /// Requested role.
    pub role: u16,
    /// Request flags (see [`flags`]).
    pub flags: u8,
}

impl BeginRequestBody {
    /// Decode from record content. Needs at least role and flags (3 bytes).
    pub fn decode(content: &[u8]) -> Option<Self> {
        if content.len() < 3 {
            return None;
        }
        Some(Self {
            role: u16::from_be_bytes([content[0], content[1]]),
            flags: content[2],
        })
    }

    /// Encode to the 8-byte wire body.
    pub fn encode(&self) -> [u8; BODY_SIZE] {
        let mut buf = [0u8; BODY_SIZE];
        buf[0..2].copy_from_slice(&self.role.to_be_bytes());
        buf[2] = self.flags;
        buf
    }

    /// Whether the peer asked to keep the transport open.
    #[inline]
    pub fn keep_conn(&self) -> bool {
        flags::has_flag(self.flags, flags::KEEP_CONN)
    }
}

/// Body of an END_REQUEST record: `app_status:u32, protocol_status:u8, reserved:u8[3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRequestBody {
    /// Application exit status.
    pub app_status: u32,
    /// Protocol-level status.
    pub protocol_status: ProtocolStatus,
}

impl EndRequestBody {
    /// Encode to the 8-byte wire body.
    pub fn encode(&self) -> [u8; BODY_SIZE] {
        let mut buf = [0u8; BODY_SIZE];
        buf[0..4].copy_from_slice(&self.app_status.to_be_bytes());
        buf[4] = self.protocol_status as u8;
        buf
    }

    /// Decode from record content.
    pub fn decode(content: &[u8]) -> Option<Self> {
        if content.len() < 5 {
            return None;
        }
        Some(Self {
            app_status: u32::from_be_bytes([content[0], content[1], content[2], content[3]]),
            protocol_status: ProtocolStatus::from_u8(content[4])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(RecordType::Stdout, 42, 100).with_padding(4);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header {
            version: 1,
            record_type: 5,
            request_id: 0x0102,
            content_length: 0x0304,
            padding_length: 0x05,
        };
        let bytes = header.encode();
        assert_eq!(bytes, [0x01, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05, 0x00]);
    }

    #[test]
    fn test_header_size_is_exactly_8() {
        assert_eq!(HEADER_SIZE, 8);
        assert_eq!(Header::new(RecordType::Params, 1, 0).encode().len(), 8);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[0u8; 7]).is_none());
    }

    #[test]
    fn test_reserved_byte_is_zero() {
        let mut buf = [0xFFu8; HEADER_SIZE];
        Header::new(RecordType::Stdout, 1, 1).encode_into(&mut buf);
        assert_eq!(buf[7], 0);
    }

    #[test]
    fn test_total_length() {
        let header = Header::new(RecordType::Stdin, 1, 65535).with_padding(255);
        assert_eq!(header.total_length(), 8 + 65535 + 255);
    }

    #[test]
    fn test_record_type_codes() {
        assert_eq!(RecordType::BeginRequest.code(), 1);
        assert_eq!(RecordType::EndRequest.code(), 3);
        assert_eq!(RecordType::Stdout.code(), 6);
        assert_eq!(RecordType::UnknownType.code(), 11);
        for code in 1..=11u8 {
            assert_eq!(RecordType::from_u8(code).unwrap().code(), code);
        }
        assert!(RecordType::from_u8(0).is_none());
        assert!(RecordType::from_u8(12).is_none());
    }

    #[test]
    fn test_stream_types() {
        assert!(RecordType::Stdout.is_stream());
        assert!(RecordType::Stderr.is_stream());
        assert!(RecordType::Stdin.is_stream());
        assert!(!RecordType::EndRequest.is_stream());
        assert!(!RecordType::GetValuesResult.is_stream());
    }

    #[test]
    fn test_unknown_type_header() {
        let header = Header::decode(&[1, 200, 0, 1, 0, 0, 0, 0]).unwrap();
        assert!(header.kind().is_none());
        assert!(header.is_end_of_stream());
    }

    #[test]
    fn test_begin_request_body() {
        let body = BeginRequestBody::decode(&[0, 1, 1, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(body.role, role::RESPONDER);
        assert!(body.keep_conn());
        assert_eq!(BeginRequestBody::decode(&body.encode()), Some(body));
        assert!(BeginRequestBody::decode(&[0, 1]).is_none());
    }

    #[test]
    fn test_end_request_body_layout() {
        let body = EndRequestBody {
            app_status: 0x0102_0304,
            protocol_status: ProtocolStatus::Overloaded,
        };
        assert_eq!(body.encode(), [1, 2, 3, 4, 2, 0, 0, 0]);
        assert_eq!(EndRequestBody::decode(&body.encode()), Some(body));
    }

    #[test]
    fn test_protocol_status_codes() {
        assert_eq!(ProtocolStatus::RequestComplete as u8, 0);
        assert_eq!(ProtocolStatus::UnknownRole as u8, 3);
        assert_eq!(ProtocolStatus::default(), ProtocolStatus::RequestComplete);
        assert!(ProtocolStatus::from_u8(4).is_none());
    }
}
