//! Handler module - application callbacks and their context.
//!
//! Provides:
//! - [`Handler`] - one method per request phase
//! - [`handler_fn`] - adapt a single closure over [`Event`] into a handler
//! - [`RequestContext`] - what a callback may do to its connection
//!
//! All callbacks run on the event loop thread and must not block.
//!
//! # Example
//!
//! ```
//! use fcgi_engine::handler::{handler_fn, Event};
//! use fcgi_engine::protocol::RecordType;
//!
//! let handler = handler_fn(|ctx, event| match event {
//!     Event::Params(_) => {
//!         let mut out = ctx.get_write_request(RecordType::Stdout);
//!         out.append(b"Content-Type: text/plain\r\n\r\nHello, world!");
//!         ctx.send(out);
//!     }
//!     Event::Write => ctx.end_request(),
//!     _ => {}
//! });
//! # let _ = handler;
//! ```

mod context;

use std::fmt;

pub use context::RequestContext;

use crate::protocol::Params;

/// Request lifecycle phase a callback is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// BEGIN_REQUEST received.
    Begin,
    /// ABORT_REQUEST received; the transport is closed right after.
    Abort,
    /// The PARAMS stream is complete.
    Params,
    /// The STDIN stream is complete.
    Stdin,
    /// A sent stream has been fully written, or dropped on a closed transport.
    Write,
    /// A [`Notifier`](crate::notify::Notifier) fired.
    Notify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Begin => "begin",
            Self::Abort => "abort",
            Self::Params => "params",
            Self::Stdin => "stdin",
            Self::Write => "write",
            Self::Notify => "notify",
        })
    }
}

/// A phase together with its payload.
#[derive(Debug, Clone)]
pub enum Event<'a> {
    Begin,
    Abort,
    /// Decoder over the complete PARAMS content.
    Params(Params<'a>),
    /// Complete STDIN content.
    Stdin(&'a [u8]),
    Write,
    Notify,
}

impl Event<'_> {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Begin => Phase::Begin,
            Self::Abort => Phase::Abort,
            Self::Params(_) => Phase::Params,
            Self::Stdin(_) => Phase::Stdin,
            Self::Write => Phase::Write,
            Self::Notify => Phase::Notify,
        }
    }
}

/// Application callbacks, one per request phase.
///
/// `on_params` and `on_write` must be provided: the first is where a
/// responder normally starts its reply, the second is where it usually calls
/// [`RequestContext::end_request`]. Content passed to `on_params` and
/// `on_stdin` is only valid for the duration of the call.
pub trait Handler {
    fn on_begin(&mut self, ctx: &mut RequestContext<'_>) {
        let _ = ctx;
    }

    fn on_abort(&mut self, ctx: &mut RequestContext<'_>) {
        let _ = ctx;
    }

    fn on_params(&mut self, ctx: &mut RequestContext<'_>, params: Params<'_>);

    fn on_stdin(&mut self, ctx: &mut RequestContext<'_>, stdin: &[u8]) {
        let _ = (ctx, stdin);
    }

    fn on_write(&mut self, ctx: &mut RequestContext<'_>);

    fn on_notify(&mut self, ctx: &mut RequestContext<'_>) {
        let _ = ctx;
    }
}

/// Handler built from a closure. See [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap a closure that receives every [`Event`] as a [`Handler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(&mut RequestContext<'_>, Event<'_>),
{
    FnHandler { f }
}

impl<F> Handler for FnHandler<F>
where
    F: FnMut(&mut RequestContext<'_>, Event<'_>),
{
    fn on_begin(&mut self, ctx: &mut RequestContext<'_>) {
        (self.f)(ctx, Event::Begin)
    }

    fn on_abort(&mut self, ctx: &mut RequestContext<'_>) {
        (self.f)(ctx, Event::Abort)
    }

    fn on_params(&mut self, ctx: &mut RequestContext<'_>, params: Params<'_>) {
        (self.f)(ctx, Event::Params(params))
    }

    fn on_stdin(&mut self, ctx: &mut RequestContext<'_>, stdin: &[u8]) {
        (self.f)(ctx, Event::Stdin(stdin))
    }

    fn on_write(&mut self, ctx: &mut RequestContext<'_>) {
        (self.f)(ctx, Event::Write)
    }

    fn on_notify(&mut self, ctx: &mut RequestContext<'_>) {
        (self.f)(ctx, Event::Notify)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}
