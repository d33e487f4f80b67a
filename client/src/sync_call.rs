use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use weft_shared::Payload;

struct Slot {
    completed: bool,
    payload: Option<Payload>,
}

/// Rendezvous between a thread blocked in a synchronous call and the
/// dispatch thread that completes it. At most one completion wins; later
/// ones are ignored.
pub(crate) struct SyncCall {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl SyncCall {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                completed: false,
                payload: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// Releases the waiter with `payload`. Returns false if the call was
    /// already completed.
    pub fn complete(&self, payload: Option<Payload>) -> bool {
        let mut slot = self.slot.lock().expect("sync call poisoned");
        if slot.completed {
            return false;
        }
        slot.completed = true;
        slot.payload = payload;
        self.ready.notify_all();
        true
    }

    /// Blocks until completion or `timeout`. `None` timeout waits
    /// indefinitely. Returns `None` on expiry, otherwise the payload the
    /// completer delivered.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<Option<Payload>> {
        let mut slot = self.slot.lock().expect("sync call poisoned");
        match timeout {
            None => {
                while !slot.completed {
                    slot = self.ready.wait(slot).expect("sync call poisoned");
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !slot.completed {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return None;
                    }
                    let (guard, _) = self
                        .ready
                        .wait_timeout(slot, left)
                        .expect("sync call poisoned");
                    slot = guard;
                }
            }
        }
        Some(slot.payload.take())
    }
}
