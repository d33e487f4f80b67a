use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use log::{info, warn};

use weft_shared::{
    encode_content, ActionError, ActionResult, Address, Availability, CsError, Envelope, OpCode,
    OpId, Payload, RequestId, ServerTransport, ServiceId,
};

use crate::request_keeper::RequestKeeper;

pub type RequestHandler = Arc<dyn Fn(Arc<RequestKeeper>) + Send + Sync>;

/// Server-side state machine for one service: registers handlers per
/// operation, dispatches inbound requests, broadcasts signals, maintains
/// property state and tracks subscribers by client address.
///
/// Each map has its own lock; handlers, abort callbacks and transport
/// sends always run with every lock released.
pub struct ServiceProvider {
    service_id: ServiceId,
    server: Weak<dyn ServerTransport>,
    availability: Mutex<Availability>,
    request_handlers: Mutex<HashMap<OpId, RequestHandler>>,
    requests: Mutex<HashMap<OpId, Vec<Arc<RequestKeeper>>>>,
    subscribers: Mutex<HashMap<Address, HashSet<OpId>>>,
    properties: Mutex<HashMap<OpId, Payload>>,
}

impl ServiceProvider {
    pub fn new(service_id: ServiceId, server: Weak<dyn ServerTransport>) -> Arc<Self> {
        Arc::new(Self {
            service_id,
            server,
            availability: Mutex::new(Availability::Unavailable),
            request_handlers: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            properties: Mutex::new(HashMap::new()),
        })
    }

    pub fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    pub fn availability(&self) -> Availability {
        *self.availability.lock().expect("availability poisoned")
    }

    /// Registers the handler invoked for inbound requests on `op_id`.
    /// Fails when a handler is already registered for it.
    pub fn register_request_handler(
        &self,
        op_id: OpId,
        handler: impl Fn(Arc<RequestKeeper>) + Send + Sync + 'static,
    ) -> bool {
        let mut handlers = self.request_handlers.lock().expect("handlers poisoned");
        if handlers.contains_key(&op_id) {
            warn!("A request handler for OpID [{op_id}] is already registered");
            return false;
        }
        handlers.insert(op_id, Arc::new(handler));
        true
    }

    pub fn unregister_request_handler(&self, op_id: &OpId) -> bool {
        self.request_handlers
            .lock()
            .expect("handlers poisoned")
            .remove(op_id)
            .is_some()
    }

    /// Stores a property value and pushes a `StatusUpdate` carrying it to
    /// every subscriber of `op_id`. Every call broadcasts, equal payloads
    /// included.
    pub fn set_status(&self, op_id: OpId, payload: Payload) -> ActionResult {
        self.properties
            .lock()
            .expect("properties poisoned")
            .insert(op_id.clone(), payload.clone());
        self.broadcast(&op_id, OpCode::StatusUpdate, payload)
    }

    /// Pushes a `SignalBroadcast` to every subscriber of `op_id`. No
    /// property state is written.
    pub fn broadcast_signal(&self, op_id: &OpId, payload: Payload) -> ActionResult {
        self.broadcast(op_id, OpCode::SignalBroadcast, payload)
    }

    /// The last stored property value, if any.
    pub fn get_status(&self, op_id: &OpId) -> Option<Payload> {
        self.properties
            .lock()
            .expect("properties poisoned")
            .get(op_id)
            .cloned()
    }

    /// Makes the service available and announces the transition to every
    /// requester.
    pub fn start_serving(&self) {
        if let Some(old) = self.flip_availability(Availability::Available) {
            info!("Service '{}' starts serving", self.service_id);
            self.notify_status(old, Availability::Available);
        }
    }

    /// Stops serving: every in-flight request keeper is invalidated and
    /// dropped, subscribers are forgotten (clients re-register when the
    /// service returns), and the transition is announced.
    pub fn stop_serving(&self) {
        if let Some(old) = self.flip_availability(Availability::Unavailable) {
            info!("Service '{}' stops serving", self.service_id);
            self.invalidate_and_remove_all_requests();
            self.subscribers.lock().expect("subscribers poisoned").clear();
            self.notify_status(old, Availability::Unavailable);
        }
    }

    /// Dispatches one inbound envelope addressed to this provider's
    /// service. Returns false when the envelope could not be consumed.
    pub fn on_incoming_message(self: &Arc<Self>, msg: Envelope) -> bool {
        if msg.service_id != self.service_id {
            return false;
        }
        if self.availability() != Availability::Available {
            warn!(
                "Service '{}' is not serving, dropping {} for OpID [{}]",
                self.service_id, msg.op_code, msg.op_id
            );
            return false;
        }

        match msg.op_code {
            OpCode::Request => self.on_action_request(msg),
            OpCode::StatusGet => self.on_status_get_request(msg),
            OpCode::Abort => self.on_abort_request(&msg),
            OpCode::StatusRegister => {
                self.save_register_info(&msg);
                self.update_latest_status(&msg);
            }
            OpCode::SignalRegister => self.save_register_info(&msg),
            OpCode::Unregister => self.remove_register_info(&msg),
            OpCode::ClientGoesOff => self.on_client_goes_off(&msg.source),
            other => {
                warn!("Unhandled operation code [{other}] for service '{}'", self.service_id);
                return false;
            }
        }
        true
    }

    // Inbound handling

    fn on_action_request(self: &Arc<Self>, msg: Envelope) {
        let handler = self
            .request_handlers
            .lock()
            .expect("handlers poisoned")
            .get(&msg.op_id)
            .cloned();

        let Some(handler) = handler else {
            self.respond_op_not_supported(&msg);
            return;
        };

        let keeper = RequestKeeper::new(msg, Arc::downgrade(self));
        self.requests
            .lock()
            .expect("requests poisoned")
            .entry(keeper.op_id().clone())
            .or_default()
            .push(Arc::clone(&keeper));

        handler(keeper);
    }

    // A property get is answered from the property map unless a handler
    // chose to compute it.
    fn on_status_get_request(self: &Arc<Self>, msg: Envelope) {
        let has_handler = self
            .request_handlers
            .lock()
            .expect("handlers poisoned")
            .contains_key(&msg.op_id);
        if has_handler {
            self.on_action_request(msg);
            return;
        }

        let current = self.get_status(&msg.op_id);
        let reply = msg.reply().with_payload(current);
        let _ = self.send_back_to_client(reply, &msg.source);
    }

    fn on_abort_request(&self, msg: &Envelope) {
        let keeper = self.pick_out_request(&msg.op_id, msg.request_id);
        if let Some(keeper) = keeper {
            keeper.invalidate();
            if let Some(abort_callback) = keeper.take_abort_callback() {
                abort_callback();
            }
            info!(
                "Aborted request OpID [{}] - RequestID [{}]",
                msg.op_id, msg.request_id
            );
        }
    }

    fn save_register_info(&self, msg: &Envelope) {
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .entry(msg.source.clone())
            .or_default()
            .insert(msg.op_id.clone());
    }

    fn remove_register_info(&self, msg: &Envelope) {
        let mut subscribers = self.subscribers.lock().expect("subscribers poisoned");
        if let Some(ops) = subscribers.get_mut(&msg.source) {
            ops.remove(&msg.op_id);
            if ops.is_empty() {
                subscribers.remove(&msg.source);
            }
        }
    }

    /// Answers a fresh property registration with the current value, so
    /// the registrant's cache starts out coherent.
    fn update_latest_status(&self, register_msg: &Envelope) {
        let current = self.get_status(&register_msg.op_id);
        let reply = register_msg.reply().with_payload(current);
        let _ = self.send_back_to_client(reply, &register_msg.source);
    }

    pub(crate) fn on_client_goes_off(&self, address: &Address) {
        info!("Client {address} went off, dropping its registrations and requests");
        self.subscribers
            .lock()
            .expect("subscribers poisoned")
            .remove(address);

        let orphaned: Vec<Arc<RequestKeeper>> = {
            let mut requests = self.requests.lock().expect("requests poisoned");
            let mut orphaned = Vec::new();
            for list in requests.values_mut() {
                let mut index = 0;
                while index < list.len() {
                    if list[index].source() == address {
                        orphaned.push(list.remove(index));
                    } else {
                        index += 1;
                    }
                }
            }
            requests.retain(|_, list| !list.is_empty());
            orphaned
        };

        for keeper in orphaned {
            keeper.invalidate();
            if let Some(abort_callback) = keeper.take_abort_callback() {
                abort_callback();
            }
        }
    }

    // Internals

    fn broadcast(&self, op_id: &OpId, op_code: OpCode, payload: Payload) -> ActionResult {
        let receivers: Vec<Address> = {
            let subscribers = self.subscribers.lock().expect("subscribers poisoned");
            subscribers
                .iter()
                .filter(|(_, ops)| ops.contains(op_id))
                .map(|(address, _)| address.clone())
                .collect()
        };

        for address in receivers {
            let msg = Envelope::new(self.service_id.clone(), op_id.clone(), op_code)
                // every subscriber decodes its own copy of the stream
                .with_payload(Some(payload.clone()));
            if let Err(err) = self.send_back_to_client(msg, &address) {
                warn!("Could not deliver {op_code} for OpID [{op_id}] to {address}: {err}");
            }
        }
        Ok(())
    }

    fn respond_op_not_supported(&self, msg: &Envelope) {
        warn!(
            "No request handler for OpID [{}] of service '{}'",
            msg.op_id, self.service_id
        );
        let payload = encode_content(&CsError::new(
            CsError::OP_NOT_SUPPORTED,
            format!("operation '{}' is not supported", msg.op_id),
        ));
        let reply = msg.reply().with_payload(Some(payload));
        let _ = self.send_back_to_client(reply, &msg.source);
    }

    fn pick_out_request(
        &self,
        op_id: &OpId,
        request_id: RequestId,
    ) -> Option<Arc<RequestKeeper>> {
        let mut requests = self.requests.lock().expect("requests poisoned");
        let list = requests.get_mut(op_id)?;
        let position = list
            .iter()
            .position(|keeper| keeper.request_id() == request_id)?;
        let keeper = list.remove(position);
        if list.is_empty() {
            requests.remove(op_id);
        }
        Some(keeper)
    }

    /// Called by a keeper completing its request.
    pub(crate) fn forget_request(&self, op_id: &OpId, request_id: RequestId) {
        let _ = self.pick_out_request(op_id, request_id);
    }

    fn invalidate_and_remove_all_requests(&self) {
        let drained: Vec<Arc<RequestKeeper>> = {
            let mut requests = self.requests.lock().expect("requests poisoned");
            requests.drain().flat_map(|(_, list)| list).collect()
        };
        for keeper in &drained {
            keeper.invalidate();
        }
    }

    fn flip_availability(&self, new: Availability) -> Option<Availability> {
        let mut availability = self.availability.lock().expect("availability poisoned");
        let old = *availability;
        if old == new {
            return None;
        }
        *availability = new;
        Some(old)
    }

    pub(crate) fn send_back_to_client(&self, msg: Envelope, to: &Address) -> ActionResult {
        match self.server.upgrade() {
            Some(server) => server.send_message_to_client(msg, to),
            None => Err(ActionError::ReceiverUnavailable),
        }
    }

    fn notify_status(&self, old: Availability, new: Availability) {
        if let Some(server) = self.server.upgrade() {
            server.notify_service_status_to_client(&self.service_id, old, new);
        }
    }
}
