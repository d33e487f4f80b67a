use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::warn;

use weft_shared::{ActionError, ActionResult, Address, Envelope, OpCode, ServiceId};

use crate::provider::ServiceProvider;

/// The server half of a router keeps one provider per service and routes
/// inbound envelopes to it. `ClientGoesOff` fans out to every provider,
/// since a vanished client may have had business with any of them.
pub struct ServerRegistry {
    providers: Mutex<HashMap<ServiceId, Arc<ServiceProvider>>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a provider for its service. Only one provider per
    /// service id may be registered at a time.
    pub fn register(&self, provider: Arc<ServiceProvider>) -> bool {
        let mut providers = self.providers.lock().expect("provider registry poisoned");
        let service_id = provider.service_id().clone();
        if providers.contains_key(&service_id) {
            warn!("A provider for service '{service_id}' is already registered");
            return false;
        }
        providers.insert(service_id, provider);
        true
    }

    pub fn unregister(&self, service_id: &ServiceId) -> Option<Arc<ServiceProvider>> {
        self.providers
            .lock()
            .expect("provider registry poisoned")
            .remove(service_id)
    }

    pub fn get(&self, service_id: &ServiceId) -> Option<Arc<ServiceProvider>> {
        self.providers
            .lock()
            .expect("provider registry poisoned")
            .get(service_id)
            .cloned()
    }

    pub fn has_provider(&self, service_id: &ServiceId) -> bool {
        self.providers
            .lock()
            .expect("provider registry poisoned")
            .contains_key(service_id)
    }

    /// Routes a client-originated envelope to the matching provider.
    pub fn on_incoming_message(&self, msg: Envelope) -> ActionResult {
        if msg.op_code == OpCode::ClientGoesOff {
            self.on_client_goes_off(&msg.source);
            return Ok(());
        }

        match self.get(&msg.service_id) {
            Some(provider) => {
                if provider.on_incoming_message(msg) {
                    Ok(())
                } else {
                    Err(ActionError::ReceiverUnavailable)
                }
            }
            None => {
                warn!(
                    "No provider registered for service '{}', dropping message",
                    msg.service_id
                );
                Err(ActionError::ReceiverUnavailable)
            }
        }
    }

    /// Tells every provider that the client at `address` is gone.
    pub fn on_client_goes_off(&self, address: &Address) {
        let providers: Vec<Arc<ServiceProvider>> = self
            .providers
            .lock()
            .expect("provider registry poisoned")
            .values()
            .cloned()
            .collect();
        for provider in providers {
            provider.on_client_goes_off(address);
        }
    }

    /// Drops every provider, exactly once per registered service.
    pub fn clear(&self) {
        self.providers
            .lock()
            .expect("provider registry poisoned")
            .clear();
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
