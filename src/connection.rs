//! Per-connection state held in a pool slot.

use std::any::Any;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::buffer::Buffer;
use crate::protocol::{
    flags, BeginRequestBody, ProtocolStatus, RecordParser, RecordType, NULL_REQUEST_ID,
};
use crate::writer::WriteRequest;

/// Application status reported in END_REQUEST unless the handler sets one.
pub const DEFAULT_APP_STATUS: u32 = 200;

/// Handle to a pool slot for one transport binding.
///
/// The generation changes every time the slot is bound to a new transport, so
/// a handle kept past the end of its binding no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    index: usize,
    generation: u32,
}

impl ConnId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Binding generation of the slot.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

/// Identifies one in-flight write on a connection.
///
/// Transports hand it back unchanged when the write completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteToken(pub(crate) usize);

/// What an in-flight frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteStage {
    /// A content chunk; more chunks or a terminator may follow.
    Data,
    /// The empty record that ends a stream.
    EndOfStream,
}

#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) request: WriteRequest,
    pub(crate) stage: WriteStage,
}

/// State for one pooled connection.
///
/// A slot is *reclaimable* only when its transport is closed and the
/// application has finished the current request (`in_use == false`).
pub struct Connection {
    pub(crate) generation: u32,
    pub(crate) parser: RecordParser,
    pub(crate) incoming: Buffer,

    pub(crate) request_id: u16,
    pub(crate) role: u16,
    pub(crate) flags: u8,
    pub(crate) app_status: u32,
    pub(crate) protocol_status: ProtocolStatus,

    pub(crate) in_use: bool,
    pub(crate) request_started: bool,
    pub(crate) closed: bool,
    pub(crate) closing: bool,
    pub(crate) in_free_list: bool,

    pub(crate) data: Option<Box<dyn Any>>,
    pub(crate) notify_pending: Arc<AtomicBool>,

    idle_writes: Vec<WriteRequest>,
    in_flight: Vec<Option<InFlight>>,
}

impl Connection {
    pub(crate) fn new() -> Self {
        Self {
            generation: 0,
            parser: RecordParser::new(),
            incoming: Buffer::new(),
            request_id: NULL_REQUEST_ID,
            role: 0,
            flags: 0,
            app_status: DEFAULT_APP_STATUS,
            protocol_status: ProtocolStatus::RequestComplete,
            in_use: false,
            request_started: false,
            closed: true,
            closing: false,
            in_free_list: true,
            data: None,
            notify_pending: Arc::new(AtomicBool::new(false)),
            idle_writes: Vec::new(),
            in_flight: Vec::new(),
        }
    }

    /// Bind the slot to a fresh transport.
    pub(crate) fn bind(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.in_free_list = false;
        self.closed = false;
        self.closing = false;
        self.in_use = true;
        self.request_started = false;
        self.notify_pending = Arc::new(AtomicBool::new(false));
        self.parser.reset();
        self.incoming.reset();
        self.reset_request();
    }

    /// Clear everything tied to the last binding before the slot is freed.
    pub(crate) fn recycle(&mut self) {
        self.in_free_list = true;
        self.in_use = false;
        self.request_started = false;
        self.data = None;
        self.parser.reset();
        self.incoming.reset();
        self.reset_request();
    }

    /// Start a request from a BEGIN_REQUEST body.
    pub(crate) fn begin(&mut self, request_id: u16, body: BeginRequestBody) {
        self.reset_request();
        self.request_id = request_id;
        self.role = body.role;
        self.flags = body.flags;
        self.in_use = true;
        self.request_started = true;
    }

    fn reset_request(&mut self) {
        self.request_id = NULL_REQUEST_ID;
        self.role = 0;
        self.flags = 0;
        self.app_status = DEFAULT_APP_STATUS;
        self.protocol_status = ProtocolStatus::RequestComplete;
    }

    /// Take an idle write request (or allocate one) prepared for `kind`.
    ///
    /// Management records are addressed to request id 0.
    pub(crate) fn take_write_request(&mut self, kind: RecordType) -> WriteRequest {
        let request_id = if kind.is_management() {
            NULL_REQUEST_ID
        } else {
            self.request_id
        };
        let mut request = self.idle_writes.pop().unwrap_or_default();
        request.prepare(kind, request_id);
        request
    }

    /// Return a write request to the idle list.
    pub(crate) fn release_write(&mut self, mut request: WriteRequest) {
        request.clear();
        self.idle_writes.push(request);
    }

    pub(crate) fn track(&mut self, request: WriteRequest, stage: WriteStage) -> WriteToken {
        let entry = Some(InFlight { request, stage });
        match self.in_flight.iter().position(Option::is_none) {
            Some(slot) => {
                self.in_flight[slot] = entry;
                WriteToken(slot)
            }
            None => {
                self.in_flight.push(entry);
                WriteToken(self.in_flight.len() - 1)
            }
        }
    }

    pub(crate) fn complete(&mut self, token: WriteToken) -> Option<InFlight> {
        self.in_flight.get_mut(token.0).and_then(Option::take)
    }

    /// Return every in-flight write request to the idle list.
    ///
    /// Yields how many of them were stream writes, each of which owes the
    /// handler one WRITE callback.
    pub(crate) fn release_in_flight(&mut self) -> usize {
        let mut streams = 0;
        for entry in std::mem::take(&mut self.in_flight).into_iter().flatten() {
            if entry.request.record_type().is_stream() {
                streams += 1;
            }
            self.release_write(entry.request);
        }
        streams
    }

    /// Close requested or completed.
    #[inline]
    pub(crate) fn is_shut(&self) -> bool {
        self.closed || self.closing
    }

    /// Request id from the last BEGIN_REQUEST.
    #[inline]
    pub fn request_id(&self) -> u16 {
        self.request_id
    }

    #[inline]
    pub fn role(&self) -> u16 {
        self.role
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// True if the peer asked to keep the connection open after the request.
    #[inline]
    pub fn keep_conn(&self) -> bool {
        flags::has_flag(self.flags, flags::KEEP_CONN)
    }

    #[inline]
    pub fn app_status(&self) -> u32 {
        self.app_status
    }

    #[inline]
    pub fn protocol_status(&self) -> ProtocolStatus {
        self.protocol_status
    }

    /// The application still owns a request on this slot.
    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// The transport has finished closing.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn is_in_free_list(&self) -> bool {
        self.in_free_list
    }

    /// Write requests parked for reuse.
    pub fn idle_write_requests(&self) -> usize {
        self.idle_writes.len()
    }

    /// Writes handed to the transport and not yet completed.
    pub fn in_flight_writes(&self) -> usize {
        self.in_flight.iter().filter(|e| e.is_some()).count()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("generation", &self.generation)
            .field("request_id", &self.request_id)
            .field("role", &self.role)
            .field("flags", &self.flags)
            .field("in_use", &self.in_use)
            .field("closed", &self.closed)
            .field("closing", &self.closing)
            .field("in_free_list", &self.in_free_list)
            .field("has_data", &self.data.is_some())
            .field("in_flight", &self.in_flight_writes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::role;

    #[test]
    fn test_new_slot_is_free_and_closed() {
        let conn = Connection::new();
        assert!(conn.is_closed());
        assert!(conn.is_in_free_list());
        assert!(!conn.is_in_use());
    }

    #[test]
    fn test_bind_bumps_generation() {
        let mut conn = Connection::new();
        conn.bind();
        let first = conn.generation;
        conn.recycle();
        conn.bind();
        assert_eq!(conn.generation, first + 1);
        assert!(conn.is_in_use());
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_begin_resets_statuses() {
        let mut conn = Connection::new();
        conn.bind();
        conn.app_status = 500;
        conn.protocol_status = ProtocolStatus::Overloaded;

        conn.begin(
            7,
            BeginRequestBody {
                role: role::RESPONDER,
                flags: flags::KEEP_CONN,
            },
        );

        assert_eq!(conn.request_id(), 7);
        assert_eq!(conn.app_status(), DEFAULT_APP_STATUS);
        assert_eq!(conn.protocol_status(), ProtocolStatus::RequestComplete);
        assert!(conn.keep_conn());
    }

    #[test]
    fn test_management_writes_use_null_request_id() {
        let mut conn = Connection::new();
        conn.bind();
        conn.begin(9, BeginRequestBody { role: 1, flags: 0 });

        assert_eq!(conn.take_write_request(RecordType::Stdout).request_id(), 9);
        assert_eq!(
            conn.take_write_request(RecordType::GetValuesResult)
                .request_id(),
            NULL_REQUEST_ID
        );
    }

    #[test]
    fn test_write_requests_are_reused() {
        let mut conn = Connection::new();
        conn.bind();
        let request = conn.take_write_request(RecordType::Stdout);
        conn.release_write(request);
        assert_eq!(conn.idle_write_requests(), 1);

        let _again = conn.take_write_request(RecordType::Stderr);
        assert_eq!(conn.idle_write_requests(), 0);
    }

    #[test]
    fn test_in_flight_tokens_reuse_free_entries() {
        let mut conn = Connection::new();
        conn.bind();
        let first = conn.take_write_request(RecordType::Stdout);
        let second = conn.take_write_request(RecordType::Stdout);
        let a = conn.track(first, WriteStage::Data);
        let b = conn.track(second, WriteStage::Data);
        assert_ne!(a, b);

        assert!(conn.complete(a).is_some());
        assert!(conn.complete(a).is_none());

        let third = conn.take_write_request(RecordType::Stdout);
        let c = conn.track(third, WriteStage::EndOfStream);
        assert_eq!(c, a);
        assert_eq!(conn.in_flight_writes(), 2);
    }

    #[test]
    fn test_release_in_flight_counts_streams() {
        let mut conn = Connection::new();
        conn.bind();
        let stdout = conn.take_write_request(RecordType::Stdout);
        let end = conn.take_write_request(RecordType::EndRequest);
        conn.track(stdout, WriteStage::Data);
        conn.track(end, WriteStage::Data);

        assert_eq!(conn.release_in_flight(), 1);
        assert_eq!(conn.in_flight_writes(), 0);
        assert_eq!(conn.idle_write_requests(), 2);
    }
}
