use std::sync::{Arc, Mutex, MutexGuard};

use crate::{FrameSink, LinkError, Result};

/// Cloneable handle that serializes access to one link.
///
/// Fire-and-forget senders take the lock per frame through [`FrameSink`]. A programming
/// session calls [`SharedLink::lock`] and holds the guard until its cleanup has finished.
pub struct SharedLink<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedLink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedLink<T> {
    pub fn new(link: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(link)),
        }
    }

    /// Exclusive access to the link for as long as the guard lives.
    pub fn lock(&self) -> Result<MutexGuard<'_, T>> {
        self.inner
            .lock()
            .map_err(|_| LinkError::Io("link lock poisoned".to_string()))
    }

    /// The wrapped link, if this is the last handle.
    pub fn into_inner(self) -> Option<T> {
        Arc::try_unwrap(self.inner)
            .ok()
            .and_then(|m| m.into_inner().ok())
    }
}

impl<T: FrameSink> FrameSink for SharedLink<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.lock()?.send(bytes)
    }
}
