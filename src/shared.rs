//! Cross-process shared memory buffers and the single binary mutex.
//!
//! The only channels that cross process boundaries (§5): SWIs 30/31 push
//! and pop a named integer buffer, SWIs 33/34 test-and-set and release a
//! single mutex. Contention is modeled cooperatively — a failed
//! test-and-set rewinds `pc` so the process retries on its next quantum,
//! never by blocking a thread.

use std::collections::{HashMap, VecDeque};

/// The default named buffer SWI 30/31 operate on.
pub const DEFAULT_BUFFER: &str = "shared1";

/// Named integer buffers plus the one binary mutex all processes share.
#[derive(Debug, Default)]
pub struct SharedState {
    buffers: HashMap<String, VecDeque<i64>>,
    mutex_locked: bool,
}

impl SharedState {
    pub fn new() -> Self {
        SharedState {
            buffers: HashMap::new(),
            mutex_locked: false,
        }
    }

    /// `shm_open` — create the named buffer if it does not exist yet.
    pub fn shm_open(&mut self, name: &str) {
        self.buffers.entry(name.to_string()).or_default();
    }

    /// `shm_unlink` — remove the named buffer entirely.
    pub fn shm_unlink(&mut self, name: &str) {
        self.buffers.remove(name);
    }

    /// A read-only view of a buffer's contents, for the `shared_memory`
    /// command.
    pub fn peek(&self, name: &str) -> Option<&VecDeque<i64>> {
        self.buffers.get(name)
    }

    /// SWI 30 — push a value into `name`, creating it if needed.
    pub fn push(&mut self, name: &str, value: i64) {
        self.buffers.entry(name.to_string()).or_default().push_back(value);
    }

    /// SWI 31 — pop a value from `name`. `None` means the buffer was
    /// empty and the caller must rewind `pc` to retry.
    pub fn pop(&mut self, name: &str) -> Option<i64> {
        self.buffers.get_mut(name).and_then(|b| b.pop_front())
    }

    /// SWI 33 — attempt to acquire the mutex. Returns `true` on success.
    pub fn test_and_set(&mut self) -> bool {
        if self.mutex_locked {
            false
        } else {
            self.mutex_locked = true;
            true
        }
    }

    /// SWI 34 — release the mutex unconditionally.
    pub fn release(&mut self) {
        self.mutex_locked = false;
    }

    pub fn mutex_locked(&self) -> bool {
        self.mutex_locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trips() {
        let mut s = SharedState::new();
        s.push(DEFAULT_BUFFER, 42);
        assert_eq!(s.pop(DEFAULT_BUFFER), Some(42));
        assert_eq!(s.pop(DEFAULT_BUFFER), None);
    }

    #[test]
    fn mutex_is_exclusive() {
        let mut s = SharedState::new();
        assert!(s.test_and_set());
        assert!(!s.test_and_set());
        s.release();
        assert!(s.test_and_set());
    }
}
