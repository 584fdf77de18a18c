//! Protocol module - wire format, record parsing, and name-value pairs.
//!
//! This module implements the FastCGI record layer:
//! - 8-byte header encoding/decoding and record body layouts
//! - Incremental record parser for fragmented reads
//! - Name-value pair decoder/encoder for PARAMS and GET_VALUES

mod params;
mod record;
mod record_parser;
mod values;
mod wire_format;

pub use params::{encode_length, encode_param, Param, Params, MAX_PARAM_LENGTH};
pub use record::{build_record, Record, RecordReader};
pub use record_parser::{ParserState, RecordParser};
pub use values::{ServerValues, FCGI_MAX_CONNS, FCGI_MAX_REQS, FCGI_MPXS_CONNS};
pub use wire_format::{
    flags, role, BeginRequestBody, EndRequestBody, Header, ProtocolStatus, RecordType,
    BODY_SIZE, HEADER_SIZE, MAX_CONTENT_LENGTH, NULL_REQUEST_ID, VERSION_1,
};
