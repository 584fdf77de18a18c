//! Transport module - the byte stream under each connection.
//!
//! The server core is I/O free: it hands framed records to a [`Transport`]
//! and is told about reads, write completions and closes through its
//! `on_*` entry points. [`SocketTransport`] is the tokio implementation over
//! Unix domain sockets; tests drive the core with an in-memory transport.

use std::io;

use bytes::Bytes;

use crate::connection::{ConnId, WriteToken};

mod socket;

pub(crate) use socket::LoopEvent;
pub use socket::{generate_socket_path, SocketListener, SocketTransport};

/// Outbound side of the connections the server is bound to.
///
/// Both operations are asynchronous. A successful `write` is later reported
/// to `Server::on_write_complete` with the same token; `close` is later
/// reported to `Server::on_closed`. Both are called only from the event loop
/// thread.
pub trait Transport {
    /// Queue one framed record for the connection.
    ///
    /// An error means the frame was not queued and no completion will follow.
    fn write(&mut self, conn: ConnId, token: WriteToken, frame: Bytes) -> io::Result<()>;

    /// Begin closing the connection's transport.
    ///
    /// The server calls this at most once per binding.
    fn close(&mut self, conn: ConnId);
}
