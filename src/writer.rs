//! Response framing and chunked sends.
//!
//! A [`WriteRequest`] collects the bytes of one response stream (STDOUT,
//! STDERR) or one management/END_REQUEST record. Sending it walks the buffer
//! one record at a time:
//!
//! ```text
//! [hdr|≤65535 bytes] ─► complete ─► [hdr|≤65535 bytes] ─► ... ─► [hdr|empty] ─► WRITE
//! ```
//!
//! Only one frame per request is in flight at a time; the next chunk is framed
//! when the transport reports the previous one written. Stream types end with
//! an empty record of the same type, and the handler's `on_write` runs once
//! that terminator is on the wire.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::buffer::Buffer;
use crate::connection::{ConnId, WriteStage};
use crate::pool::ConnectionPool;
use crate::protocol::{Header, RecordType, HEADER_SIZE, MAX_CONTENT_LENGTH, NULL_REQUEST_ID};
use crate::transport::Transport;

/// Outgoing bytes for one record stream on a connection.
///
/// Obtained from [`RequestContext::get_write_request`] and handed back with
/// [`RequestContext::send`]; the connection keeps idle requests for reuse.
///
/// [`RequestContext::get_write_request`]: crate::handler::RequestContext::get_write_request
/// [`RequestContext::send`]: crate::handler::RequestContext::send
#[derive(Debug)]
pub struct WriteRequest {
    record_type: RecordType,
    request_id: u16,
    outgoing: Buffer,
    /// Frame assembly area sized for one full record.
    scratch: BytesMut,
    frames_sent: usize,
    /// Close the transport once this END_REQUEST is written.
    close_after: bool,
}

impl Default for WriteRequest {
    fn default() -> Self {
        Self {
            record_type: RecordType::Stdout,
            request_id: NULL_REQUEST_ID,
            outgoing: Buffer::new(),
            scratch: BytesMut::with_capacity(HEADER_SIZE + MAX_CONTENT_LENGTH),
            frames_sent: 0,
            close_after: false,
        }
    }
}

impl WriteRequest {
    pub(crate) fn prepare(&mut self, record_type: RecordType, request_id: u16) {
        self.clear();
        self.record_type = record_type;
        self.request_id = request_id;
    }

    pub(crate) fn clear(&mut self) {
        self.outgoing.reset();
        self.frames_sent = 0;
        self.close_after = false;
    }

    /// Decide, at `end_request` time, whether the transport closes after
    /// this record.
    pub(crate) fn set_close_after(&mut self, close: bool) {
        self.close_after = close;
    }

    /// Record type every frame of this request carries.
    #[inline]
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Request id every frame of this request carries.
    #[inline]
    pub fn request_id(&self) -> u16 {
        self.request_id
    }

    /// Append response bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        self.outgoing.append(bytes);
    }

    /// Direct access to the outgoing buffer.
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.outgoing
    }

    /// Bytes appended so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.outgoing.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }

    #[inline]
    pub(crate) fn has_unsent(&self) -> bool {
        self.outgoing.remaining() > 0
    }

    #[inline]
    pub(crate) fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Frame the next chunk of unsent bytes and advance past it.
    pub(crate) fn next_chunk(&mut self) -> Bytes {
        let chunk_len = self.outgoing.remaining().min(MAX_CONTENT_LENGTH);
        let header = Header::new(self.record_type, self.request_id, chunk_len as u16);

        self.scratch.reserve(HEADER_SIZE + chunk_len);
        self.scratch.put_slice(&header.encode());
        self.scratch
            .put_slice(&self.outgoing.unread()[..chunk_len]);
        self.outgoing.advance(chunk_len);
        self.frames_sent += 1;

        self.scratch.split().freeze()
    }

    /// Frame the empty record that terminates a stream.
    pub(crate) fn end_of_stream(&mut self) -> Bytes {
        let header = Header::new(self.record_type, self.request_id, 0);
        self.scratch.reserve(HEADER_SIZE);
        self.scratch.put_slice(&header.encode());
        self.frames_sent += 1;
        self.scratch.split().freeze()
    }
}

impl io::Write for WriteRequest {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Advance a write request by one step.
///
/// Called when the handler sends a request and again each time a data frame
/// completes. On a closed connection the request is released at once; stream
/// writes still owe the handler a WRITE callback, which is queued.
pub(crate) fn send(
    pool: &mut ConnectionPool,
    id: ConnId,
    mut request: WriteRequest,
    transport: &mut dyn Transport,
) {
    let Some(conn) = pool.get_mut(id) else {
        trace!(conn = %id, "dropping write for recycled connection");
        return;
    };
    let kind = request.record_type();

    if conn.is_shut() {
        trace!(conn = %id, record_type = %kind, "connection closed, releasing write");
        conn.release_write(request);
        if kind.is_stream() {
            pool.defer_write(id);
        }
        pool.reclaim_if_idle(id);
        return;
    }

    if request.has_unsent() || (!kind.is_stream() && request.frames_sent() == 0) {
        let frame = request.next_chunk();
        issue(pool, id, request, WriteStage::Data, frame, transport);
    } else if kind.is_stream() {
        let frame = request.end_of_stream();
        issue(pool, id, request, WriteStage::EndOfStream, frame, transport);
    } else {
        let close_after = request.close_after;
        conn.release_write(request);
        if kind == RecordType::EndRequest && close_after {
            debug!(conn = %id, "request ended without KEEP_CONN");
            pool.close(id, transport);
        }
    }
}

fn issue(
    pool: &mut ConnectionPool,
    id: ConnId,
    request: WriteRequest,
    stage: WriteStage,
    frame: Bytes,
    transport: &mut dyn Transport,
) {
    let Some(conn) = pool.get_mut(id) else {
        return;
    };
    let token = conn.track(request, stage);
    trace!(conn = %id, bytes = frame.len(), "writing frame");
    if let Err(e) = transport.write(id, token, frame) {
        warn!(conn = %id, error = %e, "write failed, closing connection");
        pool.close(id, transport);
    }
}
