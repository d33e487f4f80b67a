use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::warn;

use weft_shared::{ActionError, ActionResult, Availability, Envelope, ServiceId};

use crate::requester::ServiceRequester;

/// The client half of a router keeps one requester per service and routes
/// inbound envelopes and availability notices to it.
pub struct ClientRegistry {
    requesters: Mutex<HashMap<ServiceId, Arc<ServiceRequester>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            requesters: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a requester for its service. Only one requester per
    /// service id may be registered at a time.
    pub fn register(&self, requester: Arc<ServiceRequester>) -> bool {
        let mut requesters = self.requesters.lock().expect("requester registry poisoned");
        let service_id = requester.service_id().clone();
        if requesters.contains_key(&service_id) {
            warn!("A requester for service '{service_id}' is already registered");
            return false;
        }
        requesters.insert(service_id, requester);
        true
    }

    pub fn unregister(&self, service_id: &ServiceId) -> Option<Arc<ServiceRequester>> {
        self.requesters
            .lock()
            .expect("requester registry poisoned")
            .remove(service_id)
    }

    pub fn get(&self, service_id: &ServiceId) -> Option<Arc<ServiceRequester>> {
        self.requesters
            .lock()
            .expect("requester registry poisoned")
            .get(service_id)
            .cloned()
    }

    /// Routes a server-originated envelope to the matching requester.
    pub fn on_incoming_message(&self, msg: Envelope) -> ActionResult {
        match self.get(&msg.service_id) {
            Some(requester) => {
                if requester.on_incoming_message(msg) {
                    Ok(())
                } else {
                    Err(ActionError::ReceiverUnavailable)
                }
            }
            None => {
                warn!(
                    "No requester registered for service '{}', dropping message",
                    msg.service_id
                );
                Err(ActionError::ReceiverUnavailable)
            }
        }
    }

    /// Forwards a provider availability transition to the matching
    /// requester.
    pub fn on_service_status_changed(&self, service_id: &ServiceId, new: Availability) {
        if let Some(requester) = self.get(service_id) {
            requester.on_service_status_changed(service_id, new);
        }
    }

    /// Drops every requester, exactly once per registered service.
    pub fn clear(&self) {
        self.requesters
            .lock()
            .expect("requester registry poisoned")
            .clear();
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
