use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::{error, info, warn};

use weft_shared::{
    ActionError, ActionResult, Availability, ClientTransport, Component, Envelope, OpCode, OpId,
    Payload, RegId, RequestId, RequestIdPool, ServiceId,
};

use crate::{property_cache::PropertyCache, sync_call::SyncCall};

/// How long a reclaimed request id stays out of circulation, so a late
/// message stamped with it cannot be paired with a new entry.
const REQUEST_ID_COOL_DOWN: Duration = Duration::from_secs(1);

pub type PayloadCallback = Arc<dyn Fn(Option<Payload>) + Send + Sync>;

/// What an observer reports back from a notification. `Defunct` asks the
/// requester to drop the observer; anything it needs to say beyond that
/// is its own business.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserverStatus {
    Active,
    Defunct,
}

/// Watches the availability of one service as seen by a requester.
pub trait ServiceStatusObserver: Send + Sync {
    fn on_service_status_changed(
        &self,
        service_id: &ServiceId,
        old: Availability,
        new: Availability,
    ) -> ObserverStatus;
}

struct RegEntry {
    request_id: RequestId,
    callback: PayloadCallback,
}

type RegEntriesMap = Mutex<HashMap<OpId, Vec<RegEntry>>>;

/// Client-side state machine for one service: issues requests (sync and
/// async), manages signal/property registrations, observes availability.
///
/// Every map is guarded by its own lock and callbacks are never invoked
/// while any of them is held, so operations on different maps proceed
/// concurrently and a callback may freely call back into the requester.
pub struct ServiceRequester {
    service_id: ServiceId,
    client: Weak<dyn ClientTransport>,
    service_status: Mutex<Availability>,
    id_pool: Mutex<RequestIdPool>,
    register_entries: RegEntriesMap,
    request_entries: RegEntriesMap,
    properties: PropertyCache,
    status_observers: Mutex<Vec<Arc<dyn ServiceStatusObserver>>>,
    sync_calls: Mutex<Vec<Arc<SyncCall>>>,
}

impl ServiceRequester {
    pub fn new(service_id: ServiceId, client: Weak<dyn ClientTransport>) -> Arc<Self> {
        Arc::new(Self {
            service_id,
            client,
            service_status: Mutex::new(Availability::Unknown),
            id_pool: Mutex::new(RequestIdPool::new(REQUEST_ID_COOL_DOWN)),
            register_entries: Mutex::new(HashMap::new()),
            request_entries: Mutex::new(HashMap::new()),
            properties: PropertyCache::new(),
            status_observers: Mutex::new(Vec::new()),
            sync_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    pub fn service_status(&self) -> Availability {
        *self.service_status.lock().expect("service status poisoned")
    }

    fn service_unavailable(&self) -> bool {
        self.service_status() != Availability::Available
    }

    // Requests

    /// Issues a one-shot request. The callback fires exactly once: with
    /// the reply payload on success, or with `None` if the service goes
    /// down first. It is delivered through the mailbox of the component
    /// this call was made from, if any.
    pub fn send_request_async(
        &self,
        op_id: OpId,
        payload: Option<Payload>,
        callback: impl Fn(Option<Payload>) + Send + Sync + 'static,
    ) -> ActionResult<RegId> {
        if self.service_unavailable() {
            return Err(ActionError::ServiceUnavailable);
        }
        self.send_message_async(op_id, OpCode::Request, payload, bind_to_component(callback))
    }

    /// Issues a request and blocks until the reply, `timeout` expiry, or
    /// service loss. `None` waits indefinitely. On expiry the provider is
    /// asked to abort; on service loss `Ok(None)` is returned.
    pub fn send_request(
        self: &Arc<Self>,
        op_id: OpId,
        payload: Option<Payload>,
        timeout: Option<Duration>,
    ) -> ActionResult<Option<Payload>> {
        if self.service_unavailable() {
            return Err(ActionError::ServiceUnavailable);
        }
        self.send_message_sync(op_id, OpCode::Request, payload, timeout)
    }

    /// Removes the local entry for an outstanding request, then asks the
    /// provider to abort it. Aborting an already-completed request is a
    /// no-op.
    pub fn abort_request(&self, reg_id: &RegId) -> ActionResult {
        if !reg_id.is_valid() {
            return Err(ActionError::InvalidParam);
        }

        let found = {
            let mut entries = self.request_entries.lock().expect("request entries poisoned");
            remove_entry_from(&mut entries, reg_id)
        };

        if found {
            let mut msg = self.create_envelope(reg_id.op_id.clone(), OpCode::Abort, None);
            msg.request_id = reg_id.request_id;
            let sent = self.send_to_server(msg);
            if sent.is_ok() {
                self.reclaim_id(reg_id.request_id);
            }
            sent
        } else {
            Ok(())
        }
    }

    // Registrations

    /// Subscribes a callback to a signal. The first registration for an
    /// operation is announced to the provider; later ones are local.
    pub fn register_signal(
        &self,
        op_id: OpId,
        callback: impl Fn(Option<Payload>) + Send + Sync + 'static,
    ) -> ActionResult<RegId> {
        if self.service_unavailable() {
            return Err(ActionError::ServiceUnavailable);
        }
        self.register_notification(op_id, OpCode::SignalRegister, bind_to_component(callback))
    }

    /// Subscribes a callback to a property. If the property is already
    /// cached the callback is invoked immediately with a clone of the
    /// cached value.
    pub fn register_status(
        &self,
        op_id: OpId,
        callback: impl Fn(Option<Payload>) + Send + Sync + 'static,
    ) -> ActionResult<RegId> {
        if self.service_unavailable() {
            return Err(ActionError::ServiceUnavailable);
        }
        self.register_notification(op_id, OpCode::StatusRegister, bind_to_component(callback))
    }

    /// Drops one registration. When the last registration for the
    /// operation goes away, the provider is told to forget this client
    /// and the cached property is dropped.
    pub fn unregister(&self, reg_id: &RegId) -> ActionResult {
        if self.service_unavailable() {
            return Err(ActionError::ServiceUnavailable);
        }
        if !reg_id.is_valid() {
            warn!("Tried to unregister an invalid RegID");
            return Err(ActionError::InvalidParam);
        }

        let (found, remaining) = {
            let mut entries = self.register_entries.lock().expect("register entries poisoned");
            let found = remove_entry_from(&mut entries, reg_id);
            let remaining = entries.get(&reg_id.op_id).map_or(0, Vec::len);
            (found, remaining)
        };
        if !found {
            warn!("Tried to unregister an unknown RegID for OpID [{}]", reg_id.op_id);
            return Err(ActionError::InvalidParam);
        }
        self.reclaim_id(reg_id.request_id);

        if remaining == 0 {
            // no one on the client side cares about this operation anymore
            self.properties.remove(&reg_id.op_id);
            self.send_to_server(self.create_envelope(
                reg_id.op_id.clone(),
                OpCode::Unregister,
                None,
            ))?;
        }
        Ok(())
    }

    /// Drops every registration for `op_id` at once.
    pub fn unregister_all(&self, op_id: &OpId) -> ActionResult {
        if self.service_unavailable() {
            return Err(ActionError::ServiceUnavailable);
        }

        let removed = self
            .register_entries
            .lock()
            .expect("register entries poisoned")
            .remove(op_id);
        if let Some(entries) = removed {
            for entry in &entries {
                self.reclaim_id(entry.request_id);
            }
        }

        self.properties.remove(op_id);
        self.send_to_server(self.create_envelope(op_id.clone(), OpCode::Unregister, None))
    }

    // Properties

    /// Fetches a property value. Subscribed and cached values are
    /// answered synchronously from the cache; otherwise this is a
    /// blocking `StatusGet` round-trip.
    pub fn get_status(
        self: &Arc<Self>,
        op_id: OpId,
        timeout: Option<Duration>,
    ) -> ActionResult<Option<Payload>> {
        if self.cached_property_up_to_date(&op_id) {
            return Ok(self.properties.get_clone(&op_id));
        }
        if self.service_unavailable() {
            return Err(ActionError::ServiceUnavailable);
        }
        self.send_message_sync(op_id, OpCode::StatusGet, None, timeout)
    }

    /// Non-blocking property fetch: the callback receives the cached
    /// value synchronously when up to date, otherwise the `StatusGet`
    /// reply when it arrives.
    pub fn get_status_async(
        &self,
        op_id: OpId,
        callback: impl Fn(Option<Payload>) + Send + Sync + 'static,
    ) -> ActionResult {
        let callback = bind_to_component(callback);
        if self.cached_property_up_to_date(&op_id) {
            callback(self.properties.get_clone(&op_id));
            return Ok(());
        }
        self.send_message_async(op_id, OpCode::StatusGet, None, callback)
            .map(|_| ())
    }

    // Observers

    /// Registers an availability observer. If the service is already
    /// available the observer is told so immediately, as the transition
    /// `Unknown -> Available`; a status change can never slip between
    /// registration and that first notification.
    pub fn register_service_status_observer(&self, observer: Arc<dyn ServiceStatusObserver>) {
        let current = {
            let mut observers = self.status_observers.lock().expect("status observers poisoned");
            let current = self.service_status();
            observers.push(Arc::clone(&observer));
            current
        };

        if current == Availability::Available {
            // outside the lock: a notification must never block status updates
            let status = observer.on_service_status_changed(
                &self.service_id,
                Availability::Unknown,
                Availability::Available,
            );
            if status == ObserverStatus::Defunct {
                self.unregister_service_status_observer(&observer);
            }
        }
    }

    pub fn unregister_service_status_observer(&self, observer: &Arc<dyn ServiceStatusObserver>) {
        self.status_observers
            .lock()
            .expect("status observers poisoned")
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }

    // Transport-side entry points

    /// Dispatches one inbound envelope addressed to this requester's
    /// service. Returns false when nothing could consume it.
    pub fn on_incoming_message(&self, mut msg: Envelope) -> bool {
        info!(
            "ServiceRequester - incoming message from server: sid = {}, opID = {}, opCode = {}",
            msg.service_id, msg.op_id, msg.op_code
        );

        if msg.service_id != self.service_id {
            return false;
        }

        match msg.op_code {
            OpCode::SignalRegister | OpCode::SignalBroadcast => {
                self.on_registers_updated(&mut msg);
                true
            }
            OpCode::StatusRegister | OpCode::StatusUpdate => {
                if self.on_registers_updated(&mut msg) {
                    if let Some(payload) = msg.take_payload() {
                        self.properties.store(msg.op_id.clone(), payload);
                    }
                }
                true
            }
            OpCode::Request | OpCode::StatusGet => {
                self.on_request_result(msg);
                true
            }
            other => {
                error!("Invalid RESPONSE operation code, cannot match any INPUT code [{other}]");
                false
            }
        }
    }

    /// Applies a provider availability transition. Equal-state
    /// transitions are no-ops; a drop to `Unavailable` releases every
    /// blocked caller, fails every in-flight request and clears all
    /// registrations and cached properties before observers hear of it.
    pub fn on_service_status_changed(&self, service_id: &ServiceId, new: Availability) {
        if *service_id != self.service_id {
            return;
        }

        let old = {
            let mut status = self.service_status.lock().expect("service status poisoned");
            let old = *status;
            if old == new {
                return;
            }
            *status = new;
            old
        };
        info!("Service '{service_id}' status change from {old} to {new}");

        if new == Availability::Unavailable {
            self.abort_all_sync_calls();
            self.fail_all_async_requests();
            self.clear_all_register_entries();
            self.properties.clear();
        }
        self.forward_status_to_observers(old, new);
    }

    // Internals

    fn send_message_async(
        &self,
        op_id: OpId,
        op_code: OpCode,
        payload: Option<Payload>,
        callback: PayloadCallback,
    ) -> ActionResult<RegId> {
        let (reg_id, _) = self.store_reg_entry(&self.request_entries, &op_id, callback);

        let mut msg = self.create_envelope(op_id, op_code, payload);
        msg.request_id = reg_id.request_id;

        if let Err(err) = self.send_to_server(msg) {
            let mut entries = self.request_entries.lock().expect("request entries poisoned");
            remove_entry_from(&mut entries, &reg_id);
            drop(entries);
            self.reclaim_id(reg_id.request_id);
            return Err(err);
        }
        Ok(reg_id)
    }

    fn send_message_sync(
        self: &Arc<Self>,
        op_id: OpId,
        op_code: OpCode,
        payload: Option<Payload>,
        timeout: Option<Duration>,
    ) -> ActionResult<Option<Payload>> {
        let call = Arc::new(SyncCall::new());
        self.sync_calls
            .lock()
            .expect("sync calls poisoned")
            .push(Arc::clone(&call));

        let weak_self = Arc::downgrade(self);
        let completer = Arc::clone(&call);
        // completes the rendezvous directly: the waiter is a blocked
        // thread, not a component mailbox
        let on_reply: PayloadCallback = Arc::new(move |payload| {
            if let Some(requester) = weak_self.upgrade() {
                requester.remove_sync_call(&completer);
            }
            completer.complete(payload);
        });

        let reg_id = match self.send_message_async(op_id, op_code, payload, on_reply) {
            Ok(reg_id) => reg_id,
            Err(err) => {
                self.remove_sync_call(&call);
                return Err(err);
            }
        };

        match call.wait(timeout) {
            Some(payload) => Ok(payload),
            None => {
                warn!(
                    "Request id {} has expired, asking server to abort the action",
                    reg_id.request_id
                );
                let _ = self.abort_request(&reg_id);
                self.remove_sync_call(&call);
                Err(ActionError::Timeout)
            }
        }
    }

    fn register_notification(
        &self,
        op_id: OpId,
        op_code: OpCode,
        callback: PayloadCallback,
    ) -> ActionResult<RegId> {
        let (reg_id, same_op_count) =
            self.store_reg_entry(&self.register_entries, &op_id, Arc::clone(&callback));

        if same_op_count == 1 {
            // first interest in this operation: announce it to the provider
            let mut register_msg = self.create_envelope(op_id, op_code, None);
            register_msg.request_id = reg_id.request_id;

            if let Err(err) = self.send_to_server(register_msg) {
                let mut entries = self.register_entries.lock().expect("register entries poisoned");
                remove_entry_from(&mut entries, &reg_id);
                drop(entries);
                self.reclaim_id(reg_id.request_id);
                return Err(err);
            }
        } else if op_code == OpCode::StatusRegister {
            if let Some(cached) = self.properties.get_clone(&reg_id.op_id) {
                callback(Some(cached));
            }
        }

        Ok(reg_id)
    }

    fn on_registers_updated(&self, msg: &mut Envelope) -> bool {
        let callbacks: Vec<PayloadCallback> = {
            let entries = self.register_entries.lock().expect("register entries poisoned");
            match entries.get(&msg.op_id) {
                Some(list) => list.iter().map(|entry| Arc::clone(&entry.callback)).collect(),
                None => Vec::new(),
            }
        };

        let payload = msg.payload.clone();
        for callback in &callbacks {
            // every consumer gets its own copy: decoding consumes the stream
            callback(payload.clone());
        }
        !callbacks.is_empty()
    }

    fn on_request_result(&self, mut msg: Envelope) {
        let callback = {
            let mut entries = self.request_entries.lock().expect("request entries poisoned");
            take_entry_callback(&mut entries, &msg.op_id, msg.request_id)
        };

        match callback {
            Some(callback) => {
                self.reclaim_id(msg.request_id);
                callback(msg.take_payload());
            }
            None => {
                warn!(
                    "The request entry for OpID [{}] - RequestID [{}] could not be found",
                    msg.op_id, msg.request_id
                );
            }
        }
    }

    fn forward_status_to_observers(&self, old: Availability, new: Availability) {
        let observers: Vec<Arc<dyn ServiceStatusObserver>> = self
            .status_observers
            .lock()
            .expect("status observers poisoned")
            .clone();

        let mut defunct = Vec::new();
        for observer in &observers {
            let status = observer.on_service_status_changed(&self.service_id, old, new);
            if status == ObserverStatus::Defunct {
                warn!(
                    "An observer of {} is no longer available, removing it",
                    self.service_id
                );
                defunct.push(Arc::clone(observer));
            }
        }

        if !defunct.is_empty() {
            let mut observers = self.status_observers.lock().expect("status observers poisoned");
            observers.retain(|existing| !defunct.iter().any(|gone| Arc::ptr_eq(existing, gone)));
        }
    }

    fn abort_all_sync_calls(&self) {
        let drained: Vec<Arc<SyncCall>> = {
            let mut calls = self.sync_calls.lock().expect("sync calls poisoned");
            calls.drain(..).collect()
        };
        let total_aborted = drained.len();
        for call in drained {
            call.complete(None);
        }
        if total_aborted > 0 {
            info!("Aborting {total_aborted} sync requests");
        }
    }

    fn fail_all_async_requests(&self) {
        let drained: Vec<RegEntry> = {
            let mut entries = self.request_entries.lock().expect("request entries poisoned");
            entries.drain().flat_map(|(_, list)| list).collect()
        };
        for entry in drained {
            self.reclaim_id(entry.request_id);
            (entry.callback)(None);
        }
    }

    fn clear_all_register_entries(&self) {
        let drained: Vec<RegEntry> = {
            let mut entries = self.register_entries.lock().expect("register entries poisoned");
            entries.drain().flat_map(|(_, list)| list).collect()
        };
        for entry in drained {
            self.reclaim_id(entry.request_id);
        }
    }

    fn store_reg_entry(
        &self,
        map: &RegEntriesMap,
        op_id: &OpId,
        callback: PayloadCallback,
    ) -> (RegId, usize) {
        let request_id = self.id_pool.lock().expect("id pool poisoned").allocate();
        let mut entries = map.lock().expect("entries poisoned");
        let list = entries.entry(op_id.clone()).or_default();
        list.push(RegEntry {
            request_id,
            callback,
        });
        (RegId::new(op_id.clone(), request_id), list.len())
    }

    fn remove_sync_call(&self, call: &Arc<SyncCall>) {
        let mut calls = self.sync_calls.lock().expect("sync calls poisoned");
        if let Some(position) = calls.iter().position(|existing| Arc::ptr_eq(existing, call)) {
            calls.remove(position);
        }
    }

    fn reclaim_id(&self, request_id: RequestId) {
        self.id_pool.lock().expect("id pool poisoned").reclaim(request_id);
    }

    fn cached_property_up_to_date(&self, op_id: &OpId) -> bool {
        self.register_entries
            .lock()
            .expect("register entries poisoned")
            .contains_key(op_id)
    }

    fn create_envelope(&self, op_id: OpId, op_code: OpCode, payload: Option<Payload>) -> Envelope {
        Envelope::new(self.service_id.clone(), op_id, op_code).with_payload(payload)
    }

    fn send_to_server(&self, msg: Envelope) -> ActionResult {
        match self.client.upgrade() {
            Some(client) => client.send_message_to_server(msg),
            None => Err(ActionError::ReceiverUnavailable),
        }
    }
}

/// Removes the entry matching `reg_id`, reporting whether it was found.
fn remove_entry_from(entries: &mut HashMap<OpId, Vec<RegEntry>>, reg_id: &RegId) -> bool {
    let Some(list) = entries.get_mut(&reg_id.op_id) else {
        return false;
    };
    let Some(position) = list
        .iter()
        .position(|entry| entry.request_id == reg_id.request_id)
    else {
        return false;
    };
    list.remove(position);
    if list.is_empty() {
        entries.remove(&reg_id.op_id);
    }
    true
}

fn take_entry_callback(
    entries: &mut HashMap<OpId, Vec<RegEntry>>,
    op_id: &OpId,
    request_id: RequestId,
) -> Option<PayloadCallback> {
    let list = entries.get_mut(op_id)?;
    let position = list.iter().position(|entry| entry.request_id == request_id)?;
    let entry = list.remove(position);
    if list.is_empty() {
        entries.remove(op_id);
    }
    Some(entry.callback)
}

/// Binds a user callback to the component it was created from: when the
/// result arrives, it is posted into that component's mailbox instead of
/// running on the dispatch thread. A callback created outside any
/// component runs inline; a callback whose component has stopped is
/// skipped.
fn bind_to_component(
    callback: impl Fn(Option<Payload>) + Send + Sync + 'static,
) -> PayloadCallback {
    let callback: PayloadCallback = Arc::new(callback);
    let Some(owner) = Component::current() else {
        return callback;
    };

    Arc::new(move |payload: Option<Payload>| {
        let callback = Arc::clone(&callback);
        let posted = owner.post(move || callback(payload));
        if !posted {
            log::trace!("Skipping callback delivery, owning component is gone");
        }
    })
}
