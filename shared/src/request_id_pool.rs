use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::{OpId, RequestId, REQUEST_ID_INVALID};

/// Cancellation handle for an outstanding request or registration: the
/// operation it belongs to plus the dense request id allocated for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegId {
    pub op_id: OpId,
    pub request_id: RequestId,
}

impl RegId {
    pub fn new(op_id: OpId, request_id: RequestId) -> Self {
        Self { op_id, request_id }
    }

    pub fn is_valid(&self) -> bool {
        self.request_id != REQUEST_ID_INVALID
    }
}

/// Hands out dense request ids and takes them back when their entry dies.
///
/// Fresh ids are monotonically non-decreasing; reclaimed ids return to
/// circulation only after a cool-down, so an id observed in-flight cannot
/// be re-issued while a late message carrying it could still arrive.
/// Reclaiming on completion is mandatory to bound memory. Owners guard the
/// pool with their own lock; the pool itself is single-threaded state.
pub struct RequestIdPool {
    next_id: RequestId,
    recycled: VecDeque<(Instant, RequestId)>,
    cool_down: Duration,
}

impl RequestIdPool {
    pub fn new(cool_down: Duration) -> Self {
        Self {
            next_id: 0,
            recycled: VecDeque::new(),
            cool_down,
        }
    }

    pub fn allocate(&mut self) -> RequestId {
        if let Some(&(reclaimed_at, id)) = self.recycled.front() {
            if reclaimed_at.elapsed() >= self.cool_down {
                self.recycled.pop_front();
                return id;
            }
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == REQUEST_ID_INVALID {
            self.next_id = 0;
        }
        id
    }

    pub fn reclaim(&mut self, id: RequestId) {
        if id != REQUEST_ID_INVALID {
            self.recycled.push_back((Instant::now(), id));
        }
    }
}
