/// Scenario: the service goes down while requests are in flight; every
/// async callback fires empty, state is cleared, observers hear of it.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weft_client::{ObserverStatus, ServiceStatusObserver};
use weft_router::DirectRouter;
use weft_server::RequestKeeper;
use weft_shared::{Availability, OpId, ServiceId};

struct RecordingObserver {
    transitions: Mutex<Vec<(Availability, Availability)>>,
}

impl ServiceStatusObserver for RecordingObserver {
    fn on_service_status_changed(
        &self,
        _service_id: &ServiceId,
        old: Availability,
        new: Availability,
    ) -> ObserverStatus {
        self.transitions.lock().unwrap().push((old, new));
        ObserverStatus::Active
    }
}

#[test]
fn two_in_flight_requests_both_fail_empty_when_the_service_goes_down() {
    let router = DirectRouter::new();

    let provider = router.create_provider(ServiceId::from("calc"));
    provider.register_request_handler(OpId::from("slow"), |_keeper: Arc<RequestKeeper>| {
        // keep the request pending forever
    });
    provider.start_serving();

    let requester = router.create_requester(ServiceId::from("calc"));
    let observer = Arc::new(RecordingObserver {
        transitions: Mutex::new(Vec::new()),
    });
    requester.register_service_status_observer(observer.clone());

    let failures = Arc::new(AtomicUsize::new(0));
    let mut reg_ids = Vec::new();
    for _ in 0..2 {
        let counter = Arc::clone(&failures);
        let reg_id = requester
            .send_request_async(OpId::from("slow"), None, move |payload| {
                assert!(payload.is_none());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        reg_ids.push(reg_id);
    }

    provider.stop_serving();

    assert_eq!(failures.load(Ordering::SeqCst), 2);
    assert_eq!(requester.service_status(), Availability::Unavailable);

    // the entries died with the service: aborting them finds nothing and
    // sends nothing, and new requests are refused outright
    for reg_id in &reg_ids {
        assert_eq!(requester.abort_request(reg_id), Ok(()));
    }
    assert!(requester
        .send_request_async(OpId::from("slow"), None, |_| {})
        .is_err());

    assert_eq!(
        *observer.transitions.lock().unwrap(),
        vec![
            (Availability::Unknown, Availability::Available),
            (Availability::Available, Availability::Unavailable),
        ],
        "observers hear the exact transition pairing, in order"
    );
}

#[test]
fn registrations_do_not_survive_a_service_bounce() {
    let router = DirectRouter::new();

    let provider = router.create_provider(ServiceId::from("calc"));
    provider.start_serving();

    let requester = router.create_requester(ServiceId::from("calc"));
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    requester
        .register_signal(OpId::from("evt"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    provider.stop_serving();
    provider.start_serving();

    // the bounce cleared the subscription on both sides
    provider
        .broadcast_signal(&OpId::from("evt"), weft_shared::Payload::from_bytes(vec![1]))
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
