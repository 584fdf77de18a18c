//! Server configuration and builder.
//!
//! # Example
//!
//! ```ignore
//! use fcgi_engine::ServerBuilder;
//!
//! ServerBuilder::new()
//!     .max_connections(256)
//!     .serve("/tmp/app.sock", handler)?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event_loop::EventLoop;
use crate::handler::Handler;
use crate::pool::DEFAULT_MAX_CONNECTIONS;

/// Default size of each transport read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Tunables for a [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Number of connection slots. Accepting past this aborts the process.
    pub max_connections: usize,
    /// Bytes requested from the transport per read.
    pub read_buffer_size: usize,
    /// Reply to GET_VALUES management records.
    pub answer_get_values: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            answer_get_values: true,
        }
    }
}

impl ServerConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Builder for configuring and starting a FastCGI server.
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Set the number of connection slots.
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.config.max_connections = limit;
        self
    }

    /// Set the per-read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Enable or disable GET_VALUES replies.
    pub fn answer_get_values(mut self, enabled: bool) -> Self {
        self.config.answer_get_values = enabled;
        self
    }

    /// Get the configuration built so far.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Create an event loop for `handler`.
    pub fn build<H: Handler>(self, handler: H) -> EventLoop<H> {
        EventLoop::new(handler, self.config)
    }

    /// Bind `path` and serve on a current-thread runtime until the listener
    /// fails.
    pub fn serve<H: Handler>(self, path: impl AsRef<Path>, handler: H) -> Result<()> {
        crate::event_loop::serve(path, handler, self.config)
    }
}
