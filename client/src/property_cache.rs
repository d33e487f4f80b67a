use std::collections::HashMap;
use std::sync::Mutex;

use weft_shared::{OpId, Payload};

/// Last known property payload per operation, populated by
/// `StatusRegister` replies and `StatusUpdate` notifications.
///
/// Reads hand out clones: decoding a payload consumes its stream, and the
/// cached copy must stay replayable for the next reader.
pub struct PropertyCache {
    entries: Mutex<HashMap<OpId, Payload>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self, op_id: OpId, payload: Payload) {
        self.entries
            .lock()
            .expect("property cache poisoned")
            .insert(op_id, payload);
    }

    pub fn get_clone(&self, op_id: &OpId) -> Option<Payload> {
        self.entries
            .lock()
            .expect("property cache poisoned")
            .get(op_id)
            .cloned()
    }

    pub fn remove(&self, op_id: &OpId) {
        self.entries
            .lock()
            .expect("property cache poisoned")
            .remove(op_id);
    }

    pub fn clear(&self) {
        self.entries.lock().expect("property cache poisoned").clear();
    }
}

impl Default for PropertyCache {
    fn default() -> Self {
        Self::new()
    }
}
