//! Unix domain socket listener and per-connection I/O tasks.
//!
//! Every accepted stream is split into a reader task and a writer task. Both
//! report back to the event loop over one unbounded channel, so all engine
//! state is touched from the loop alone.
//!
//! ```text
//! reader task ─► LoopEvent::Read / ReadEnd ──┐
//!                                            ├─► event loop ─► Server
//! writer task ─► LoopEvent::WriteDone ───────┘
//!      ▲
//!      └── (token, frame) ◄── SocketTransport::write
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fcgi_engine::transport::{generate_socket_path, SocketListener};
//!
//! let path = generate_socket_path();
//! let listener = SocketListener::bind(&path).await?;
//! let stream = listener.accept().await?;
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::Transport;
use crate::connection::{ConnId, WriteToken};
use crate::error::Result;

/// Generate a unique socket path for this process.
///
/// Format: `/tmp/fcgi-engine-{pid}-{random}.sock`
pub fn generate_socket_path() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let rand = rand_u64() ^ COUNTER.fetch_add(1, Ordering::Relaxed);
    PathBuf::from(format!("/tmp/fcgi-engine-{}-{:x}.sock", pid, rand))
}

/// Simple random u64 using system time and process ID.
fn rand_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let pid = std::process::id() as u64;
    nanos.wrapping_mul(0x517cc1b727220a95) ^ pid
}

/// Listening Unix domain socket.
///
/// The socket file is removed when the listener is dropped.
#[derive(Debug)]
pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
}

impl SocketListener {
    /// Bind to a Unix socket path.
    ///
    /// Removes any existing socket file at the path before binding. Must be
    /// called from within a tokio runtime.
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        debug!(path = %path.display(), "listening");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Get the socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// What the I/O tasks report to the event loop.
#[derive(Debug)]
pub(crate) enum LoopEvent {
    Read(ConnId, Bytes),
    /// End of input; `None` for an orderly EOF.
    ReadEnd(ConnId, Option<io::Error>),
    WriteDone(ConnId, WriteToken, io::Result<()>),
    Closed(ConnId),
}

#[derive(Debug)]
struct Binding {
    conn: ConnId,
    frames: mpsc::UnboundedSender<(WriteToken, Bytes)>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// [`Transport`] over tokio Unix streams, one binding per pool slot.
#[derive(Debug)]
pub struct SocketTransport {
    bindings: Vec<Option<Binding>>,
    events: mpsc::UnboundedSender<LoopEvent>,
    read_buffer_size: usize,
}

impl SocketTransport {
    pub(crate) fn new(
        capacity: usize,
        read_buffer_size: usize,
        events: mpsc::UnboundedSender<LoopEvent>,
    ) -> Self {
        let mut bindings = Vec::with_capacity(capacity);
        bindings.resize_with(capacity, || None);
        Self {
            bindings,
            events,
            read_buffer_size,
        }
    }

    /// Start the I/O tasks for a freshly accepted stream.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn attach(&mut self, conn: ConnId, stream: UnixStream) {
        let (read_half, write_half) = stream.into_split();
        let (frames, queue) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            conn,
            read_half,
            self.events.clone(),
            self.read_buffer_size,
        ));
        let writer = tokio::spawn(write_loop(conn, write_half, queue, self.events.clone()));

        if let Some(slot) = self.bindings.get_mut(conn.index()) {
            *slot = Some(Binding {
                conn,
                frames,
                reader,
                writer,
            });
        }
    }

    fn binding(&self, conn: ConnId) -> Option<&Binding> {
        self.bindings
            .get(conn.index())
            .and_then(Option::as_ref)
            .filter(|b| b.conn == conn)
    }

    /// Connections with live I/O tasks.
    pub fn active(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_some()).count()
    }
}

impl Transport for SocketTransport {
    fn write(&mut self, conn: ConnId, token: WriteToken, frame: Bytes) -> io::Result<()> {
        let binding = self
            .binding(conn)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        binding
            .frames
            .send((token, frame))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn close(&mut self, conn: ConnId) {
        let Some(slot) = self.bindings.get_mut(conn.index()) else {
            return;
        };
        if !slot.as_ref().is_some_and(|b| b.conn == conn) {
            return;
        }
        if let Some(binding) = slot.take() {
            // Dropping both halves closes the socket.
            binding.reader.abort();
            binding.writer.abort();
            trace!(conn = %conn, "socket closed");
            let _ = self.events.send(LoopEvent::Closed(conn));
        }
    }
}

async fn read_loop(
    conn: ConnId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<LoopEvent>,
    read_buffer_size: usize,
) {
    let mut buf = BytesMut::with_capacity(read_buffer_size);
    loop {
        buf.reserve(read_buffer_size);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                let _ = events.send(LoopEvent::ReadEnd(conn, None));
                return;
            }
            Ok(_) => {
                let data = buf.split().freeze();
                if events.send(LoopEvent::Read(conn, data)).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = events.send(LoopEvent::ReadEnd(conn, Some(e)));
                return;
            }
        }
    }
}

async fn write_loop(
    conn: ConnId,
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<(WriteToken, Bytes)>,
    events: mpsc::UnboundedSender<LoopEvent>,
) {
    while let Some((token, frame)) = queue.recv().await {
        let result = writer.write_all(&frame).await;
        let failed = result.is_err();
        if events.send(LoopEvent::WriteDone(conn, token, result)).is_err() || failed {
            return;
        }
    }
}
