/// Contract tests for ServiceRequester against a scripted transport:
/// availability gating, entry bookkeeping, registration announcement
/// rules, cache coherence and observer notification.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weft_client::{ObserverStatus, ServiceRequester, ServiceStatusObserver};
use weft_shared::{
    ActionError, ActionResult, Availability, ClientTransport, Envelope, OpCode, OpId, Payload,
    ServiceId,
};

/// Records every envelope the requester hands to the router, and can be
/// told to refuse sends.
struct ScriptedTransport {
    sent: Mutex<Vec<Envelope>>,
    refuse: AtomicBool,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            refuse: AtomicBool::new(false),
        })
    }

    fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    fn refuse_sends(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl ClientTransport for ScriptedTransport {
    fn send_message_to_server(&self, msg: Envelope) -> ActionResult {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ActionError::ReceiverUnavailable);
        }
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
}

fn available_requester(transport: &Arc<ScriptedTransport>) -> Arc<ServiceRequester> {
    let client: std::sync::Weak<dyn ClientTransport> =
        Arc::downgrade(&(transport.clone() as Arc<dyn ClientTransport>));
    let requester = ServiceRequester::new(ServiceId::from("media"), client);
    requester.on_service_status_changed(&ServiceId::from("media"), Availability::Available);
    requester
}

#[test]
fn requests_fail_while_service_is_not_available() {
    let transport = ScriptedTransport::new();
    let client: std::sync::Weak<dyn ClientTransport> =
        Arc::downgrade(&(transport.clone() as Arc<dyn ClientTransport>));
    let requester = ServiceRequester::new(ServiceId::from("media"), client);

    let result = requester.send_request_async(OpId::from("sum"), None, |_| {});
    assert_eq!(result.unwrap_err(), ActionError::ServiceUnavailable);

    let result = requester.register_signal(OpId::from("evt"), |_| {});
    assert_eq!(result.unwrap_err(), ActionError::ServiceUnavailable);

    assert!(transport.sent().is_empty(), "nothing may reach the transport");
}

#[test]
fn async_request_carries_a_fresh_request_id() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let first = requester
        .send_request_async(OpId::from("sum"), None, |_| {})
        .unwrap();
    let second = requester
        .send_request_async(OpId::from("sum"), None, |_| {})
        .unwrap();

    assert_ne!(first.request_id, second.request_id);

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].op_code, OpCode::Request);
    assert_eq!(sent[0].request_id, first.request_id);
    assert_eq!(sent[1].request_id, second.request_id);
}

#[test]
fn transport_failure_rolls_the_entry_back() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);
    transport.refuse_sends(true);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let result = requester.send_request_async(OpId::from("sum"), None, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(result.unwrap_err(), ActionError::ReceiverUnavailable);

    // a rolled-back entry must not match any later reply
    transport.refuse_sends(false);
    let mut stray = Envelope::new(ServiceId::from("media"), OpId::from("sum"), OpCode::Request);
    stray.request_id = 0;
    requester.on_incoming_message(stray);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn reply_fires_the_callback_exactly_once() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let reg_id = requester
        .send_request_async(OpId::from("sum"), None, move |payload| {
            assert_eq!(payload.unwrap().bytes(), &[3]);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let mut reply = Envelope::new(ServiceId::from("media"), OpId::from("sum"), OpCode::Request)
        .with_payload(Some(Payload::from_bytes(vec![3])));
    reply.request_id = reg_id.request_id;

    assert!(requester.on_incoming_message(reply.clone()));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // the entry is gone; a duplicate reply is dropped silently
    requester.on_incoming_message(reply);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn abort_request_removes_the_entry_then_transmits_abort() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let reg_id = requester
        .send_request_async(OpId::from("slow"), None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    requester.abort_request(&reg_id).unwrap();

    let sent = transport.sent();
    assert_eq!(sent.last().unwrap().op_code, OpCode::Abort);
    assert_eq!(sent.last().unwrap().request_id, reg_id.request_id);

    // a late reply must not reach user code
    let mut late = Envelope::new(ServiceId::from("media"), OpId::from("slow"), OpCode::Request);
    late.request_id = reg_id.request_id;
    requester.on_incoming_message(late);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn only_the_first_registration_is_announced() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let first = requester.register_signal(OpId::from("evt"), |_| {}).unwrap();
    let second = requester.register_signal(OpId::from("evt"), |_| {}).unwrap();
    assert_ne!(first.request_id, second.request_id);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1, "the second registration is local-only");
    assert_eq!(sent[0].op_code, OpCode::SignalRegister);
}

#[test]
fn signal_notification_fans_out_to_every_registration() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let hits_a = Arc::new(AtomicUsize::new(0));
    let hits_b = Arc::new(AtomicUsize::new(0));
    let counter_a = Arc::clone(&hits_a);
    let counter_b = Arc::clone(&hits_b);
    requester
        .register_signal(OpId::from("evt"), move |_| {
            counter_a.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    requester
        .register_signal(OpId::from("evt"), move |_| {
            counter_b.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let notification =
        Envelope::new(ServiceId::from("media"), OpId::from("evt"), OpCode::SignalRegister)
            .with_payload(Some(Payload::from_bytes(vec![7])));
    requester.on_incoming_message(notification);

    assert_eq!(hits_a.load(Ordering::SeqCst), 1);
    assert_eq!(hits_b.load(Ordering::SeqCst), 1);
}

#[test]
fn second_status_registration_gets_the_cached_value_synchronously() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    requester.register_status(OpId::from("vol"), |_| {}).unwrap();

    // the provider's answer to the announcement populates the cache
    let update =
        Envelope::new(ServiceId::from("media"), OpId::from("vol"), OpCode::StatusRegister)
            .with_payload(Some(Payload::from_bytes(vec![50])));
    requester.on_incoming_message(update);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    requester
        .register_status(OpId::from("vol"), move |payload| {
            sink.lock().unwrap().push(payload.unwrap().bytes().to_vec());
        })
        .unwrap();

    assert_eq!(*observed.lock().unwrap(), vec![vec![50]]);
    assert_eq!(
        transport.sent().len(),
        1,
        "only the first status registration is announced"
    );
}

#[test]
fn get_status_answers_from_cache_when_subscribed() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    requester.register_status(OpId::from("vol"), |_| {}).unwrap();
    let update =
        Envelope::new(ServiceId::from("media"), OpId::from("vol"), OpCode::StatusUpdate)
            .with_payload(Some(Payload::from_bytes(vec![60])));
    requester.on_incoming_message(update);

    let value = requester
        .get_status(OpId::from("vol"), Some(Duration::from_millis(10)))
        .unwrap();
    assert_eq!(value.unwrap().bytes(), &[60]);
    assert_eq!(
        transport.sent().len(),
        1,
        "a cached read must not produce a StatusGet round-trip"
    );
}

#[test]
fn unregistering_the_last_entry_tells_the_provider_and_drops_the_cache() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let first = requester.register_status(OpId::from("vol"), |_| {}).unwrap();
    let second = requester.register_status(OpId::from("vol"), |_| {}).unwrap();

    let update =
        Envelope::new(ServiceId::from("media"), OpId::from("vol"), OpCode::StatusRegister)
            .with_payload(Some(Payload::from_bytes(vec![50])));
    requester.on_incoming_message(update);

    requester.unregister(&first).unwrap();
    assert!(
        !transport.sent().iter().any(|msg| msg.op_code == OpCode::Unregister),
        "an Unregister must not go out while entries remain"
    );

    requester.unregister(&second).unwrap();
    let sent = transport.sent();
    assert_eq!(sent.last().unwrap().op_code, OpCode::Unregister);

    // the cache entry died with the last registration
    let result = requester.get_status(OpId::from("vol"), Some(Duration::from_millis(10)));
    assert_eq!(result.unwrap_err(), ActionError::Timeout);
}

#[test]
fn unregister_with_a_stale_reg_id_reports_invalid_param() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let reg_id = requester.register_signal(OpId::from("evt"), |_| {}).unwrap();
    requester.unregister(&reg_id).unwrap();

    assert_eq!(
        requester.unregister(&reg_id).unwrap_err(),
        ActionError::InvalidParam
    );
}

struct CountingObserver {
    notifications: Mutex<Vec<(Availability, Availability)>>,
    defunct: AtomicBool,
}

impl CountingObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            notifications: Mutex::new(Vec::new()),
            defunct: AtomicBool::new(false),
        })
    }
}

impl ServiceStatusObserver for CountingObserver {
    fn on_service_status_changed(
        &self,
        _service_id: &ServiceId,
        old: Availability,
        new: Availability,
    ) -> ObserverStatus {
        self.notifications.lock().unwrap().push((old, new));
        if self.defunct.load(Ordering::SeqCst) {
            ObserverStatus::Defunct
        } else {
            ObserverStatus::Active
        }
    }
}

#[test]
fn observer_registered_on_available_service_hears_unknown_to_available() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let observer = CountingObserver::new();
    requester.register_service_status_observer(observer.clone());

    assert_eq!(
        *observer.notifications.lock().unwrap(),
        vec![(Availability::Unknown, Availability::Available)]
    );
}

#[test]
fn equal_state_transition_is_a_no_op() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let observer = CountingObserver::new();
    requester.register_service_status_observer(observer.clone());
    observer.notifications.lock().unwrap().clear();

    requester.on_service_status_changed(&ServiceId::from("media"), Availability::Available);
    assert!(observer.notifications.lock().unwrap().is_empty());
}

#[test]
fn defunct_observers_are_removed_after_notification() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let observer = CountingObserver::new();
    requester.register_service_status_observer(observer.clone());
    observer.notifications.lock().unwrap().clear();
    observer.defunct.store(true, Ordering::SeqCst);

    requester.on_service_status_changed(&ServiceId::from("media"), Availability::Unavailable);
    assert_eq!(observer.notifications.lock().unwrap().len(), 1);

    // the defunct observer must not hear this one
    requester.on_service_status_changed(&ServiceId::from("media"), Availability::Available);
    assert_eq!(observer.notifications.lock().unwrap().len(), 1);
}

#[test]
fn service_loss_fails_every_in_flight_request_and_clears_registrations() {
    let transport = ScriptedTransport::new();
    let requester = available_requester(&transport);

    let failures = Arc::new(AtomicUsize::new(0));
    for op in ["sum", "mul"] {
        let counter = Arc::clone(&failures);
        requester
            .send_request_async(OpId::from(op), None, move |payload| {
                assert!(payload.is_none(), "service loss completes with empty payload");
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    requester.register_status(OpId::from("vol"), |_| {}).unwrap();

    requester.on_service_status_changed(&ServiceId::from("media"), Availability::Unavailable);
    assert_eq!(failures.load(Ordering::SeqCst), 2);

    // registrations and cache are gone: a new registration is announced again
    requester.on_service_status_changed(&ServiceId::from("media"), Availability::Available);
    requester.register_status(OpId::from("vol"), |_| {}).unwrap();
    let announcements = transport
        .sent()
        .iter()
        .filter(|msg| msg.op_code == OpCode::StatusRegister)
        .count();
    assert_eq!(announcements, 2);
}
