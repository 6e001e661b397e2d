//! Accumulating output buffer with a forward-only read cursor

use crate::matcher::Pattern;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    data: Vec<u8>,
    cursor: usize,
    closed: bool,
}

/// Shared byte buffer fed by a reader task and consumed by matchers.
///
/// Every successful [`Buffer::say`] moves the cursor past the match, so a
/// sequence of expectations on the same buffer is satisfied in declaration
/// order.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    inner: Arc<Mutex<Inner>>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned buffer still holds valid bytes
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn append(&self, bytes: &[u8]) {
        self.lock().data.extend_from_slice(bytes);
    }

    /// Mark the producing stream as finished (EOF)
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything captured so far, regardless of the cursor
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock().data).into_owned()
    }

    /// Captured output past the cursor
    pub fn unread(&self) -> String {
        let inner = self.lock();
        String::from_utf8_lossy(&inner.data[inner.cursor..]).into_owned()
    }

    /// Try to match `pattern` past the cursor, advancing the cursor to the end
    /// of the match on success.
    pub fn say(&self, pattern: &Pattern) -> bool {
        let mut inner = self.lock();
        let start = inner.cursor;
        let end = match pattern.find_end(&inner.data[start..]) {
            Some(end) => end,
            None => return false,
        };
        inner.cursor = start + end;
        true
    }

    /// Match `pattern` past the cursor without consuming anything
    pub fn peek(&self, pattern: &Pattern) -> bool {
        let inner = self.lock();
        pattern.is_match(&inner.data[inner.cursor..])
    }
}
