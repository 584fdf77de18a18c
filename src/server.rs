//! Sans-io server core.
//!
//! [`Server`] owns the handler and the connection pool and reacts to
//! transport events through its `on_*` entry points. It never performs I/O
//! itself: outgoing frames and close requests go to the [`Transport`] passed
//! into each call. The [`EventLoop`](crate::EventLoop) feeds it from tokio;
//! tests feed it directly.
//!
//! Record dispatch:
//!
//! | Record | Action |
//! |---|---|
//! | BEGIN_REQUEST | start the request, `on_begin` |
//! | ABORT_REQUEST | `on_abort`, then close the transport |
//! | PARAMS / STDIN | accumulate; on the empty terminator, `on_params` / `on_stdin` |
//! | malformed PARAMS block | `on_abort`, then close the transport |
//! | GET_VALUES | reply with GET_VALUES_RESULT |
//! | anything else | dropped |
//!
//! After every entry point the server delivers any WRITE callbacks owed for
//! stream writes that were dropped on a closed transport.

use std::io;

use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::connection::{ConnId, InFlight, WriteStage, WriteToken};
use crate::error::Result;
use crate::handler::{Event, Handler, RequestContext};
use crate::notify::NotifySender;
use crate::pool::ConnectionPool;
use crate::protocol::{BeginRequestBody, Header, Params, RecordType, ServerValues};
use crate::transport::Transport;
use crate::writer;

/// Protocol engine for one listening endpoint.
#[derive(Debug)]
pub struct Server<H> {
    handler: H,
    pool: ConnectionPool,
    config: ServerConfig,
    values: ServerValues,
}

impl<H: Handler> Server<H> {
    /// Create a server with `config.max_connections` slots.
    ///
    /// Notifiers created for its connections send on `notify_tx`; the owner
    /// of the receiving end passes each id to [`on_notify`](Self::on_notify).
    pub fn new(handler: H, config: ServerConfig, notify_tx: NotifySender) -> Self {
        Self {
            handler,
            pool: ConnectionPool::new(config.max_connections, notify_tx),
            values: ServerValues::for_pool(config.max_connections),
            config,
        }
    }

    /// Bind a newly accepted transport to a free slot.
    pub fn accept(&mut self) -> Result<ConnId> {
        let id = self.pool.acquire()?;
        debug!(conn = %id, "connection accepted");
        Ok(id)
    }

    /// Feed bytes read from the connection's transport.
    ///
    /// One read may complete any number of records; leftover bytes stay in
    /// the parser for the next read.
    pub fn on_read(&mut self, id: ConnId, data: &[u8], transport: &mut dyn Transport) {
        let mut input = data;
        while !input.is_empty() {
            let Some(conn) = self.pool.get_mut(id) else {
                break;
            };
            if conn.is_shut() {
                trace!(conn = %id, discarded = input.len(), "ignoring input on closing connection");
                break;
            }
            let (consumed, header) = conn.parser.advance(input, &mut conn.incoming);
            input = &input[consumed..];
            if let Some(header) = header {
                self.dispatch_record(id, header, transport);
            }
        }
        self.run_deferred(transport);
    }

    /// The transport reached end of input or failed to read.
    pub fn on_read_end(
        &mut self,
        id: ConnId,
        error: Option<io::Error>,
        transport: &mut dyn Transport,
    ) {
        match error {
            Some(e) => warn!(conn = %id, error = %e, "read failed"),
            None => trace!(conn = %id, "peer closed"),
        }
        self.pool.close(id, transport);
        self.run_deferred(transport);
    }

    /// A frame handed to [`Transport::write`] finished.
    pub fn on_write_complete(
        &mut self,
        id: ConnId,
        token: WriteToken,
        result: io::Result<()>,
        transport: &mut dyn Transport,
    ) {
        let Some(conn) = self.pool.get_mut(id) else {
            trace!(conn = %id, "write completed on recycled connection");
            return;
        };
        let Some(InFlight { request, stage }) = conn.complete(token) else {
            return;
        };

        if let Err(e) = result {
            warn!(conn = %id, error = %e, "write failed, closing connection");
            let stream = request.record_type().is_stream();
            conn.release_write(request);
            if stream {
                self.pool.defer_write(id);
            }
            self.pool.close(id, transport);
        } else {
            match stage {
                WriteStage::Data => writer::send(&mut self.pool, id, request, transport),
                WriteStage::EndOfStream => {
                    conn.release_write(request);
                    self.invoke(id, Event::Write, transport);
                }
            }
        }
        self.run_deferred(transport);
    }

    /// The transport has finished closing.
    ///
    /// The slot is reclaimed now if the application is done with it, or later
    /// by `end_request`.
    pub fn on_closed(&mut self, id: ConnId, transport: &mut dyn Transport) {
        let Some(conn) = self.pool.get_mut(id) else {
            return;
        };
        conn.closed = true;
        conn.closing = false;
        // A peer that disconnects before BEGIN_REQUEST leaves nothing for the
        // application to finish.
        if !conn.request_started {
            conn.in_use = false;
        }
        let owed = conn.release_in_flight();
        for _ in 0..owed {
            self.pool.defer_write(id);
        }
        if !self.pool.reclaim_if_idle(id) {
            debug!(conn = %id, "transport closed, waiting for end_request");
        }
        self.run_deferred(transport);
    }

    /// A notifier for `id` fired.
    ///
    /// Notifications for slots that have since been recycled are dropped.
    pub fn on_notify(&mut self, id: ConnId, transport: &mut dyn Transport) {
        let Some(conn) = self.pool.get(id) else {
            trace!(conn = %id, "dropping stale notification");
            return;
        };
        conn.notify_pending
            .store(false, std::sync::atomic::Ordering::Release);
        self.invoke(id, Event::Notify, transport);
        self.run_deferred(transport);
    }

    fn dispatch_record(&mut self, id: ConnId, header: Header, transport: &mut dyn Transport) {
        let Some(conn) = self.pool.get_mut(id) else {
            return;
        };
        trace!(
            conn = %id,
            record_type = header.record_type,
            request_id = header.request_id,
            content_length = header.content_length,
            "record complete"
        );

        match header.kind() {
            Some(RecordType::BeginRequest) => {
                let body = BeginRequestBody::decode(conn.incoming.as_slice());
                conn.incoming.reset();
                match body {
                    Some(body) => {
                        conn.begin(header.request_id, body);
                        self.invoke(id, Event::Begin, transport);
                    }
                    None => {
                        warn!(conn = %id, "malformed BEGIN_REQUEST body");
                        self.pool.close(id, transport);
                    }
                }
            }
            Some(RecordType::AbortRequest) => {
                conn.incoming.reset();
                self.invoke(id, Event::Abort, transport);
                self.pool.close(id, transport);
            }
            Some(kind @ (RecordType::Params | RecordType::Stdin)) => {
                if !header.is_end_of_stream() {
                    return;
                }
                if kind == RecordType::Params {
                    let checked = Params::new(conn.incoming.as_slice()).validate();
                    if let Err(e) = checked {
                        warn!(conn = %id, error = %e, "malformed PARAMS block");
                        conn.incoming.reset();
                        self.invoke(id, Event::Abort, transport);
                        self.pool.close(id, transport);
                        return;
                    }
                }
                let content = std::mem::take(&mut conn.incoming);
                let event = match kind {
                    RecordType::Params => Event::Params(Params::new(content.as_slice())),
                    _ => Event::Stdin(content.as_slice()),
                };
                self.invoke(id, event, transport);
                if let Some(conn) = self.pool.get_mut(id) {
                    conn.incoming = content;
                    conn.incoming.reset();
                }
            }
            Some(RecordType::GetValues) if self.config.answer_get_values => {
                let reply = self.values.answer(conn.incoming.as_slice());
                conn.incoming.reset();
                let mut request = conn.take_write_request(RecordType::GetValuesResult);
                request.append(&reply);
                writer::send(&mut self.pool, id, request, transport);
            }
            _ => {
                warn!(
                    conn = %id,
                    record_type = header.record_type,
                    "dropping unhandled record"
                );
                conn.incoming.reset();
            }
        }
    }

    fn invoke(&mut self, id: ConnId, event: Event<'_>, transport: &mut dyn Transport) {
        trace!(conn = %id, phase = %event.phase(), "invoking handler");
        let mut ctx = RequestContext::new(id, &mut self.pool, transport);
        match event {
            Event::Begin => self.handler.on_begin(&mut ctx),
            Event::Abort => self.handler.on_abort(&mut ctx),
            Event::Params(params) => self.handler.on_params(&mut ctx, params),
            Event::Stdin(stdin) => self.handler.on_stdin(&mut ctx, stdin),
            Event::Write => self.handler.on_write(&mut ctx),
            Event::Notify => self.handler.on_notify(&mut ctx),
        }
    }

    fn run_deferred(&mut self, transport: &mut dyn Transport) {
        while let Some(id) = self.pool.pop_deferred() {
            if self.pool.get(id).is_some() {
                self.invoke(id, Event::Write, transport);
            }
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
