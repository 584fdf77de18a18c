//! # fcgi-engine
//!
//! FastCGI responder engine for Unix domain sockets.
//!
//! This crate terminates the FastCGI record protocol for a web server
//! (nginx, Apache, ...) talking to the application over a local socket.
//!
//! ## Architecture
//!
//! - **Pool**: a fixed arena of connection slots; a slot is reused only once
//!   the transport has closed *and* the application has ended its request
//! - **Parser**: an incremental record parser that tolerates reads split at
//!   any byte
//! - **Writer**: responses are framed into records of at most 65535 bytes and
//!   terminated with an empty record
//! - **Notifier**: the one thread-safe handle, used by background work to
//!   resume a connection on the event loop thread
//!
//! All protocol state lives in [`Server`], which performs no I/O itself;
//! [`EventLoop`] drives it on a single-threaded tokio runtime.
//!
//! ## Example
//!
//! ```no_run
//! use fcgi_engine::handler::{handler_fn, Event};
//! use fcgi_engine::protocol::RecordType;
//! use fcgi_engine::ServerBuilder;
//!
//! fn main() -> fcgi_engine::Result<()> {
//!     let handler = handler_fn(|ctx, event| match event {
//!         Event::Params(params) => {
//!             let mut out = ctx.get_write_request(RecordType::Stdout);
//!             if params.get(b"REQUEST_URI") == Some(&b"/"[..]) {
//!                 out.append(b"Content-Type: text/plain\r\n\r\nHello, World!");
//!             } else {
//!                 ctx.set_app_status(404);
//!                 out.append(b"Status: 404\r\n\r\nNot found");
//!             }
//!             ctx.send(out);
//!         }
//!         Event::Write => ctx.end_request(),
//!         _ => {}
//!     });
//!
//!     ServerBuilder::new().serve("/tmp/fcgi.sock", handler)
//! }
//! ```

pub mod buffer;
pub mod error;
pub mod handler;
pub mod notify;
pub mod protocol;
pub mod transport;

mod config;
mod connection;
mod event_loop;
mod pool;
mod server;
mod writer;

pub use config::{ServerBuilder, ServerConfig, DEFAULT_READ_BUFFER_SIZE};
pub use connection::{ConnId, Connection, WriteToken, DEFAULT_APP_STATUS};
pub use error::{FcgiError, Result};
pub use event_loop::{serve, EventLoop};
pub use handler::{Handler, RequestContext};
pub use notify::{CompletionGroup, Notifier};
pub use pool::{ConnectionPool, DEFAULT_MAX_CONNECTIONS};
pub use server::Server;
pub use writer::WriteRequest;
