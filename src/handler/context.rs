//! Request context for handlers.
//!
//! Provides the operations a handler may perform on its connection:
//! - `get_write_request` / `send` - queue STDOUT, STDERR or other records
//! - `end_request` - send END_REQUEST with the current statuses
//! - `notifier` - a thread-safe handle for waking the connection later
//! - `set_data` / `data_mut` - per-request application state
//!
//! # Example
//!
//! ```ignore
//! fn on_params(&mut self, ctx: &mut RequestContext<'_>, params: Params<'_>) {
//!     let mut out = ctx.get_write_request(RecordType::Stdout);
//!     out.append(b"Content-Type: text/plain\r\n\r\nHello");
//!     ctx.send(out);
//! }
//!
//! fn on_write(&mut self, ctx: &mut RequestContext<'_>) {
//!     ctx.end_request();
//! }
//! ```

use std::any::Any;

use tracing::warn;

use crate::connection::{ConnId, Connection};
use crate::notify::Notifier;
use crate::pool::ConnectionPool;
use crate::protocol::{flags, EndRequestBody, ProtocolStatus, RecordType};
use crate::transport::Transport;
use crate::writer::{self, WriteRequest};

/// Handle a handler receives for the connection it is being invoked for.
///
/// Valid only for the duration of the callback; keep the [`ConnId`] or a
/// [`Notifier`] to refer to the connection later.
pub struct RequestContext<'a> {
    id: ConnId,
    pool: &'a mut ConnectionPool,
    transport: &'a mut dyn Transport,
}

impl<'a> RequestContext<'a> {
    pub(crate) fn new(
        id: ConnId,
        pool: &'a mut ConnectionPool,
        transport: &'a mut dyn Transport,
    ) -> Self {
        Self {
            id,
            pool,
            transport,
        }
    }

    fn conn(&self) -> Option<&Connection> {
        self.pool.get(self.id)
    }

    fn conn_mut(&mut self) -> Option<&mut Connection> {
        self.pool.get_mut(self.id)
    }

    /// Handle of this connection.
    #[inline]
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Request id from BEGIN_REQUEST.
    pub fn request_id(&self) -> u16 {
        self.conn().map_or(0, Connection::request_id)
    }

    /// Role from BEGIN_REQUEST (see [`role`](crate::protocol::role)).
    pub fn role(&self) -> u16 {
        self.conn().map_or(0, Connection::role)
    }

    /// Flags from BEGIN_REQUEST.
    pub fn flags(&self) -> u8 {
        self.conn().map_or(0, Connection::flags)
    }

    /// True if the peer asked to keep the connection after this request.
    pub fn keep_conn(&self) -> bool {
        flags::has_flag(self.flags(), flags::KEEP_CONN)
    }

    /// Application status reported by [`end_request`](Self::end_request).
    pub fn app_status(&self) -> u32 {
        self.conn().map_or(0, Connection::app_status)
    }

    pub fn set_app_status(&mut self, status: u32) {
        if let Some(conn) = self.conn_mut() {
            conn.app_status = status;
        }
    }

    pub fn protocol_status(&self) -> ProtocolStatus {
        self.conn()
            .map_or(ProtocolStatus::RequestComplete, Connection::protocol_status)
    }

    pub fn set_protocol_status(&mut self, status: ProtocolStatus) {
        if let Some(conn) = self.conn_mut() {
            conn.protocol_status = status;
        }
    }

    /// Attach application state to the connection, replacing any previous
    /// value. It is dropped when the slot is reclaimed.
    pub fn set_data<T: Any>(&mut self, data: T) {
        if let Some(conn) = self.conn_mut() {
            conn.data = Some(Box::new(data));
        }
    }

    pub fn data<T: Any>(&self) -> Option<&T> {
        self.conn()?.data.as_ref()?.downcast_ref()
    }

    pub fn data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.conn_mut()?.data.as_mut()?.downcast_mut()
    }

    /// Remove and return the attached state if it has type `T`.
    pub fn take_data<T: Any>(&mut self) -> Option<T> {
        let conn = self.conn_mut()?;
        match conn.data.take()?.downcast::<T>() {
            Ok(data) => Some(*data),
            Err(other) => {
                conn.data = Some(other);
                None
            }
        }
    }

    /// Get an empty write request for records of `kind`.
    pub fn get_write_request(&mut self, kind: RecordType) -> WriteRequest {
        match self.conn_mut() {
            Some(conn) => conn.take_write_request(kind),
            None => {
                let mut request = WriteRequest::default();
                request.prepare(kind, 0);
                request
            }
        }
    }

    /// Send a write request.
    ///
    /// Stream records (STDOUT, STDERR) are followed by an empty terminator,
    /// after which the handler's `on_write` runs. If the connection is
    /// already closed, the request is dropped and `on_write` still runs.
    pub fn send(&mut self, request: WriteRequest) {
        writer::send(self.pool, self.id, request, self.transport);
    }

    /// Finish the request with END_REQUEST carrying the current statuses.
    ///
    /// The transport is closed afterwards unless KEEP_CONN was set. A second
    /// call for the same request is ignored.
    pub fn end_request(&mut self) {
        let Some(conn) = self.conn_mut() else {
            return;
        };
        if !conn.in_use {
            warn!(conn = %self.id, "end_request called with no request in progress");
            return;
        }
        conn.in_use = false;
        conn.request_started = false;

        let body = EndRequestBody {
            app_status: conn.app_status,
            protocol_status: conn.protocol_status,
        };
        let mut request = conn.take_write_request(RecordType::EndRequest);
        request.set_close_after(!conn.keep_conn());
        request.append(&body.encode());
        self.send(request);
    }

    /// Thread-safe handle that schedules `on_notify` for this connection.
    ///
    /// Returns `None` if the slot has been recycled.
    pub fn notifier(&self) -> Option<Notifier> {
        self.pool.notifier(self.id)
    }

    /// Close the transport. Any request in progress must still be ended.
    pub fn close(&mut self) {
        self.pool.close(self.id, self.transport);
    }

    /// True once the transport is closed or closing.
    pub fn is_closed(&self) -> bool {
        self.conn().map_or(true, Connection::is_shut)
    }
}
