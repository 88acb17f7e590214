use std::time::Duration;

use super::connection::Connection;
use crate::{pipeline::error::Error, protocol::Wqe, transport::Transport};

/// Opaque name of a connection in a [`ConnectionTable`].
///
/// A handle stays valid until its connection is removed. Slots are reused
/// afterwards, but with a new generation, so an old handle never reaches the
/// connection that took its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    conn: Option<Connection<T>>,
}

/// An arena of connections addressed by generation-checked [`Handle`]s.
pub struct ConnectionTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for ConnectionTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T: Transport> ConnectionTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, conn: Connection<T>) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.conn = Some(conn);
            return Handle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            conn: Some(conn),
        });
        Handle { index, generation: 0 }
    }

    pub fn get(&self, handle: Handle) -> Option<&Connection<T>> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.conn.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Connection<T>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.conn.as_mut())
    }

    /// Removes the connection, invalidating `handle`.
    pub fn remove(&mut self, handle: Handle) -> Option<Connection<T>> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)?;
        let conn = slot.conn.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(conn)
    }

    fn conn(&mut self, handle: Handle) -> Result<&mut Connection<T>, Error> {
        self.get_mut(handle).ok_or(Error::InvalidHandle)
    }

    /// [`Connection::post_read`] on the connection named by `handle`.
    pub async fn post_read(&mut self, handle: Handle, len: u32, loff: u32, roff: u32) -> Result<u32, Error> {
        self.conn(handle)?.post_read(len, loff, roff).await
    }

    /// [`Connection::post_write`] on the connection named by `handle`.
    pub async fn post_write(&mut self, handle: Handle, len: u32, loff: u32, roff: u32) -> Result<u32, Error> {
        self.conn(handle)?.post_write(len, loff, roff).await
    }

    /// [`Connection::poll`] on the connection named by `handle`.
    pub async fn poll(&mut self, handle: Handle, max: usize, timeout: Duration) -> Result<Vec<Wqe>, Error> {
        self.conn(handle)?.poll(max, timeout).await
    }
}
