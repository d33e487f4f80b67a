use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::{error, warn};

use weft_client::{ClientRegistry, ServiceRequester};
use weft_server::{ServerRegistry, ServiceProvider};
use weft_shared::{
    decode_content_logged, encode_content, ActionError, ActionResult, Address, Availability,
    AvailabilityUpdate, ByteReader, ByteWriter, ClientTransport, Envelope, OpCode, OpId,
    PacketEndpoint, PacketSender, Serde, ServerTransport, ServiceId,
};

fn encode_envelope(msg: &Envelope) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    msg.ser(&mut writer);
    writer.to_bytes()
}

fn decode_envelope(bytes: &[u8]) -> Option<Envelope> {
    let mut reader = ByteReader::new(bytes);
    match Envelope::de(&mut reader) {
        Ok(msg) => Some(msg),
        Err(err) => {
            error!("Dropping malformed packet ({} bytes): {err}", bytes.len());
            None
        }
    }
}

/// Client half of the IPC router: envelopes go out through the wire codec
/// to a collaborator packet transport, inbound packets are decoded and
/// dispatched to the local requesters.
pub struct IpcClientRouter {
    registry: ClientRegistry,
    sender: Arc<dyn PacketSender>,
    local_address: Address,
}

impl IpcClientRouter {
    pub fn new(sender: Arc<dyn PacketSender>, local_address: Address) -> Arc<Self> {
        Arc::new(Self {
            registry: ClientRegistry::new(),
            sender,
            local_address,
        })
    }

    /// Creates and registers a requester, then introduces this client to
    /// the server side with a status inquiry; the server answers with the
    /// service's current availability.
    pub fn create_requester(self: &Arc<Self>, service_id: ServiceId) -> Arc<ServiceRequester> {
        let client: std::sync::Weak<dyn ClientTransport> =
            Arc::downgrade(&(self.clone() as Arc<dyn ClientTransport>));
        let requester = ServiceRequester::new(service_id.clone(), client);
        self.registry.register(Arc::clone(&requester));

        let mut inquiry = Envelope::new(
            service_id,
            OpId::from("service-status"),
            OpCode::ServiceStatusUpdate,
        );
        inquiry.source = self.local_address.clone();
        if self.sender.send(encode_envelope(&inquiry)).is_err() {
            warn!("Could not announce requester to the server side");
        }
        requester
    }

    pub fn remove_requester(&self, service_id: &ServiceId) -> Option<Arc<ServiceRequester>> {
        self.registry.unregister(service_id)
    }

    /// Entry point for the transport's receive loop.
    pub fn on_incoming_packet(&self, bytes: &[u8]) -> ActionResult {
        let mut msg = decode_envelope(bytes).ok_or(ActionError::FailedUnknown)?;

        if msg.op_code == OpCode::ServiceStatusUpdate {
            let update =
                decode_content_logged::<AvailabilityUpdate>(msg.payload.as_mut(), "service status");
            if let Some(update) = update {
                self.registry.on_service_status_changed(&msg.service_id, update.new);
            }
            return Ok(());
        }

        self.registry.on_incoming_message(msg)
    }

    /// Announces this client's departure to the server side, so providers
    /// can drop its registrations and abort its in-flight requests.
    pub fn send_client_goes_off(&self) -> ActionResult {
        let mut notice = Envelope::new(
            ServiceId::from(""),
            OpId::from(""),
            OpCode::ClientGoesOff,
        );
        notice.source = self.local_address.clone();
        self.sender
            .send(encode_envelope(&notice))
            .map_err(|_| ActionError::ReceiverUnavailable)
    }

    pub fn shutdown(&self) {
        let _ = self.send_client_goes_off();
        self.registry.clear();
    }
}

impl ClientTransport for IpcClientRouter {
    fn send_message_to_server(&self, mut msg: Envelope) -> ActionResult {
        if msg.source.is_unspecified() {
            msg.source = self.local_address.clone();
        }
        if msg.source.is_unspecified() {
            warn!("Rejecting envelope with no source address at router boundary");
            return Err(ActionError::InvalidParam);
        }
        self.sender
            .send(encode_envelope(&msg))
            .map_err(|_| ActionError::ReceiverUnavailable)
    }
}

/// Server half of the IPC router. Client addresses are learned from the
/// source stamps of inbound packets; availability transitions are pushed
/// to every known client as `ServiceStatusUpdate` envelopes.
pub struct IpcServerRouter {
    registry: ServerRegistry,
    endpoint: Arc<dyn PacketEndpoint>,
    known_clients: Mutex<HashSet<Address>>,
}

impl IpcServerRouter {
    pub fn new(endpoint: Arc<dyn PacketEndpoint>) -> Arc<Self> {
        Arc::new(Self {
            registry: ServerRegistry::new(),
            endpoint,
            known_clients: Mutex::new(HashSet::new()),
        })
    }

    pub fn create_provider(self: &Arc<Self>, service_id: ServiceId) -> Arc<ServiceProvider> {
        let server: std::sync::Weak<dyn ServerTransport> =
            Arc::downgrade(&(self.clone() as Arc<dyn ServerTransport>));
        let provider = ServiceProvider::new(service_id, server);
        self.registry.register(Arc::clone(&provider));
        provider
    }

    pub fn remove_provider(&self, service_id: &ServiceId) -> Option<Arc<ServiceProvider>> {
        self.registry.unregister(service_id)
    }

    /// Entry point for the transport's receive loop.
    pub fn on_incoming_packet(&self, bytes: &[u8]) -> ActionResult {
        let msg = decode_envelope(bytes).ok_or(ActionError::FailedUnknown)?;
        if msg.source.is_unspecified() {
            warn!("Rejecting packet with no source address at router boundary");
            return Err(ActionError::InvalidParam);
        }

        if msg.op_code == OpCode::ClientGoesOff {
            self.known_clients
                .lock()
                .expect("known clients poisoned")
                .remove(&msg.source);
        } else {
            self.known_clients
                .lock()
                .expect("known clients poisoned")
                .insert(msg.source.clone());
        }

        // a status inquiry is answered by the router itself: the client
        // wants the service's current availability, not an operation
        if msg.op_code == OpCode::ServiceStatusUpdate {
            let availability = self
                .registry
                .get(&msg.service_id)
                .map(|provider| provider.availability())
                .unwrap_or(Availability::Unavailable);
            let notice = Envelope::new(
                msg.service_id.clone(),
                OpId::from("service-status"),
                OpCode::ServiceStatusUpdate,
            )
            .with_payload(Some(encode_content(&AvailabilityUpdate {
                old: Availability::Unknown,
                new: availability,
            })));
            return self
                .endpoint
                .send_to(&msg.source, encode_envelope(&notice))
                .map_err(|_| ActionError::ReceiverUnavailable);
        }

        self.registry.on_incoming_message(msg)
    }

    pub fn shutdown(&self) {
        self.registry.clear();
        self.known_clients
            .lock()
            .expect("known clients poisoned")
            .clear();
    }
}

impl ServerTransport for IpcServerRouter {
    fn send_message_to_client(&self, msg: Envelope, to: &Address) -> ActionResult {
        self.endpoint
            .send_to(to, encode_envelope(&msg))
            .map_err(|_| ActionError::ReceiverUnavailable)
    }

    fn notify_service_status_to_client(
        &self,
        service_id: &ServiceId,
        old: Availability,
        new: Availability,
    ) {
        let receivers: Vec<Address> = self
            .known_clients
            .lock()
            .expect("known clients poisoned")
            .iter()
            .cloned()
            .collect();

        let notice = Envelope::new(
            service_id.clone(),
            OpId::from("service-status"),
            OpCode::ServiceStatusUpdate,
        )
        .with_payload(Some(encode_content(&AvailabilityUpdate { old, new })));

        for address in receivers {
            if let Err(err) = self
                .endpoint
                .send_to(&address, encode_envelope(&notice))
            {
                warn!("Could not deliver service status of '{service_id}' to {address}: {err}");
            }
        }
    }
}
