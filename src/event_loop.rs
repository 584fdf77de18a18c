//! Single-threaded tokio driver for [`Server`].
//!
//! The loop owns the server and multiplexes four sources with `select!`:
//! new connections on the listener, I/O task reports, notifier wakeups and
//! an optional shutdown future. Every handler callback therefore runs on the
//! loop's thread, one at a time.
//!
//! # Example
//!
//! ```ignore
//! let listener = SocketListener::bind("/tmp/app.sock").await?;
//! EventLoop::new(handler, ServerConfig::default()).run(listener).await;
//! ```

use std::future::Future;
use std::path::Path;

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::handler::Handler;
use crate::notify::{notify_channel, NotifyReceiver};
use crate::server::Server;
use crate::transport::{LoopEvent, SocketListener, SocketTransport};

/// A [`Server`] wired to Unix socket I/O.
///
/// The loop is not `Send`: run it on a current-thread runtime, or `await` it
/// directly inside another future.
#[derive(Debug)]
pub struct EventLoop<H> {
    server: Server<H>,
    transport: SocketTransport,
    events: mpsc::UnboundedReceiver<LoopEvent>,
    notifications: NotifyReceiver,
}

impl<H: Handler> EventLoop<H> {
    /// Create the server, its notification channel and the socket transport.
    pub fn new(handler: H, config: ServerConfig) -> Self {
        let (notify_tx, notifications) = notify_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let transport =
            SocketTransport::new(config.max_connections, config.read_buffer_size, events_tx);
        Self {
            server: Server::new(handler, config, notify_tx),
            transport,
            events,
            notifications,
        }
    }

    pub fn server(&self) -> &Server<H> {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Server<H> {
        &mut self.server
    }

    /// Serve connections from `listener` forever.
    pub async fn run(self, listener: SocketListener) {
        self.run_until(listener, std::future::pending()).await;
    }

    /// Serve connections until `shutdown` completes, then hand the loop back.
    ///
    /// Pending I/O reports are handled before the shutdown future is polled.
    /// Open connections are left as they are.
    pub async fn run_until<F>(mut self, listener: SocketListener, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;

                Some(event) = self.events.recv() => self.handle(event),
                Some(conn) = self.notifications.recv() => {
                    self.server.on_notify(conn, &mut self.transport);
                }
                accepted = listener.accept() => match accepted {
                    Ok(stream) => self.bind(stream),
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = &mut shutdown => {
                    debug!("event loop shutting down");
                    return self;
                }
            }
        }
    }

    fn bind(&mut self, stream: UnixStream) {
        match self.server.accept() {
            Ok(conn) => self.transport.attach(conn, stream),
            Err(e) => {
                error!(error = %e, "no free connection slot, aborting");
                std::process::abort();
            }
        }
    }

    fn handle(&mut self, event: LoopEvent) {
        let transport = &mut self.transport;
        match event {
            LoopEvent::Read(conn, data) => self.server.on_read(conn, &data, transport),
            LoopEvent::ReadEnd(conn, error) => self.server.on_read_end(conn, error, transport),
            LoopEvent::WriteDone(conn, token, result) => {
                self.server.on_write_complete(conn, token, result, transport)
            }
            LoopEvent::Closed(conn) => self.server.on_closed(conn, transport),
        }
    }
}

/// Bind `path` and serve `handler` on a current-thread runtime.
///
/// Returns only if the runtime or the socket cannot be set up.
pub fn serve<H: Handler>(path: impl AsRef<Path>, handler: H, config: ServerConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    runtime.block_on(async move {
        let listener = SocketListener::bind(path).await?;
        EventLoop::new(handler, config).run(listener).await;
        Ok(())
    })
}
