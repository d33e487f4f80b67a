use std::sync::Arc;

use log::warn;

use weft_client::{ClientRegistry, ServiceRequester};
use weft_server::{ServerRegistry, ServiceProvider};
use weft_shared::{
    ActionError, ActionResult, Address, Availability, ClientTransport, Envelope, ServerTransport,
    ServiceId,
};

/// In-process router: requesters and providers live in the same process
/// and envelopes move between them as direct calls, no serialization.
///
/// The router stamps its canonical local address on every envelope bound
/// for the server half and refuses envelopes that remain unaddressed, so
/// a provider always sees a usable reply address.
pub struct DirectRouter {
    clients: ClientRegistry,
    servers: ServerRegistry,
    local_address: Address,
}

impl DirectRouter {
    pub fn new() -> Arc<Self> {
        Self::with_local_address(Address::new("local", 0))
    }

    pub fn with_local_address(local_address: Address) -> Arc<Self> {
        Arc::new(Self {
            clients: ClientRegistry::new(),
            servers: ServerRegistry::new(),
            local_address,
        })
    }

    /// Creates and registers a requester for `service_id`. If a matching
    /// provider is already registered the requester immediately observes
    /// a synthetic `Unavailable -> Available` transition.
    pub fn create_requester(self: &Arc<Self>, service_id: ServiceId) -> Arc<ServiceRequester> {
        let client: std::sync::Weak<dyn ClientTransport> =
            Arc::downgrade(&(self.clone() as Arc<dyn ClientTransport>));
        let requester = ServiceRequester::new(service_id.clone(), client);
        self.clients.register(Arc::clone(&requester));

        if self.servers.has_provider(&service_id) {
            requester.on_service_status_changed(&service_id, Availability::Available);
        }
        requester
    }

    /// Creates and registers a provider for `service_id`. The provider
    /// starts out `Unavailable`; call `start_serving` to go live.
    pub fn create_provider(self: &Arc<Self>, service_id: ServiceId) -> Arc<ServiceProvider> {
        let server: std::sync::Weak<dyn ServerTransport> =
            Arc::downgrade(&(self.clone() as Arc<dyn ServerTransport>));
        let provider = ServiceProvider::new(service_id, server);
        self.servers.register(Arc::clone(&provider));
        provider
    }

    pub fn remove_requester(&self, service_id: &ServiceId) -> Option<Arc<ServiceRequester>> {
        self.clients.unregister(service_id)
    }

    pub fn remove_provider(&self, service_id: &ServiceId) -> Option<Arc<ServiceProvider>> {
        self.servers.unregister(service_id)
    }

    /// Tears down the client and server halves, each exactly once.
    pub fn shutdown(&self) {
        self.clients.clear();
        self.servers.clear();
    }
}

impl ClientTransport for DirectRouter {
    fn send_message_to_server(&self, mut msg: Envelope) -> ActionResult {
        if msg.source.is_unspecified() {
            msg.source = self.local_address.clone();
        }
        if msg.source.is_unspecified() {
            warn!("Rejecting envelope with no source address at router boundary");
            return Err(ActionError::InvalidParam);
        }
        self.servers.on_incoming_message(msg)
    }
}

impl ServerTransport for DirectRouter {
    fn send_message_to_client(&self, msg: Envelope, _to: &Address) -> ActionResult {
        self.clients.on_incoming_message(msg)
    }

    fn notify_service_status_to_client(
        &self,
        service_id: &ServiceId,
        _old: Availability,
        new: Availability,
    ) {
        self.clients.on_service_status_changed(service_id, new);
    }
}
