//! Fixed-capacity arena of connection slots.
//!
//! Slots are addressed by [`ConnId`]; free slot indices sit on a stack so
//! acquire and reclaim are O(1). The pool also owns the queue of WRITE
//! callbacks owed to handlers for writes that never reached the wire, which
//! the server drains after each handler invocation.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::connection::{ConnId, Connection};
use crate::error::{FcgiError, Result};
use crate::notify::{Notifier, NotifySender};
use crate::transport::Transport;

/// Default number of connection slots.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Arena of [`Connection`] slots.
#[derive(Debug)]
pub struct ConnectionPool {
    slots: Vec<Connection>,
    free: Vec<usize>,
    deferred_writes: VecDeque<ConnId>,
    notify_tx: NotifySender,
}

impl ConnectionPool {
    /// Create a pool with `capacity` free slots.
    pub fn new(capacity: usize, notify_tx: NotifySender) -> Self {
        let slots = (0..capacity).map(|_| Connection::new()).collect();
        // Lowest index on top so slot 0 is handed out first.
        let free = (0..capacity).rev().collect();
        Self {
            slots,
            free,
            deferred_writes: VecDeque::new(),
            notify_tx,
        }
    }

    /// Take a free slot and bind it to a new transport.
    pub fn acquire(&mut self) -> Result<ConnId> {
        let index = self.free.pop().ok_or(FcgiError::PoolExhausted {
            capacity: self.slots.len(),
        })?;
        let conn = &mut self.slots[index];
        conn.bind();
        let id = ConnId::new(index, conn.generation);
        trace!(conn = %id, available = self.free.len(), "slot acquired");
        Ok(id)
    }

    /// Resolve a handle to its slot, if the binding is still current.
    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.slots
            .get(id.index())
            .filter(|c| c.generation == id.generation() && !c.in_free_list)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.slots
            .get_mut(id.index())
            .filter(|c| c.generation == id.generation() && !c.in_free_list)
    }

    /// Return the slot to the free list if its transport is closed and the
    /// application is done with it. Returns `true` if the slot was freed.
    pub(crate) fn reclaim_if_idle(&mut self, id: ConnId) -> bool {
        let Some(conn) = self.get_mut(id) else {
            return false;
        };
        if !conn.closed || conn.in_use {
            return false;
        }
        conn.recycle();
        self.free.push(id.index());
        debug!(conn = %id, available = self.free.len(), "slot reclaimed");
        true
    }

    /// Start closing the slot's transport unless a close is already under way.
    pub(crate) fn close(&mut self, id: ConnId, transport: &mut dyn Transport) {
        let Some(conn) = self.get_mut(id) else {
            return;
        };
        if conn.is_shut() {
            return;
        }
        conn.closing = true;
        debug!(conn = %id, "closing connection");
        transport.close(id);
    }

    pub(crate) fn notifier(&self, id: ConnId) -> Option<Notifier> {
        self.get(id)
            .map(|c| Notifier::new(id, c.notify_pending.clone(), self.notify_tx.clone()))
    }

    pub(crate) fn defer_write(&mut self, id: ConnId) {
        self.deferred_writes.push_back(id);
    }

    pub(crate) fn pop_deferred(&mut self) -> Option<ConnId> {
        self.deferred_writes.pop_front()
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots on the free list.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Slots bound to a transport or waiting for their request to finish.
    #[inline]
    pub fn active(&self) -> usize {
        self.capacity() - self.available()
    }
}
