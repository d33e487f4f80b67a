/// Tests for the timer manager: expiry delivery into the owning
/// component's mailbox, cyclic re-arming, stop/restart, and auto-stop of
/// timers whose component has gone away.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use std::sync::Mutex;

use weft_shared::{Component, Timer, TimerManager, TIMER_JOB_INVALID};

/// Arms a timer from inside `component`, so the timer captures it as
/// owner, and hands back the job id.
fn start_from_component(
    component: &Arc<Component>,
    manager: &Arc<TimerManager>,
    duration: Duration,
    cyclic: bool,
    on_fire: impl Fn() + Send + Sync + 'static,
) -> u64 {
    let (send_id, receive_id) = mpsc::channel();
    let manager = Arc::clone(manager);
    component.post(move || {
        let id = manager.start(duration, on_fire, cyclic);
        send_id.send(id).unwrap();
    });
    receive_id.recv_timeout(Duration::from_secs(5)).unwrap()
}

#[test]
fn one_shot_timer_fires_once_in_the_owning_component() {
    let manager = TimerManager::new();
    let component = Component::spawn("timer-owner");
    let fired = Arc::new(AtomicUsize::new(0));
    let (done, observed) = mpsc::channel();

    let counter = Arc::clone(&fired);
    let id = start_from_component(
        &component,
        &manager,
        Duration::from_millis(20),
        false,
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            done.send(Component::current().is_some()).unwrap();
        },
    );
    assert_ne!(id, TIMER_JOB_INVALID);

    let ran_in_component = observed.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(ran_in_component, "expiry must run inside the component loop");

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(fired.load(Ordering::SeqCst), 1, "one-shot fires exactly once");
    assert!(!manager.is_running(id), "a fired one-shot is no longer running");
    component.stop();
}

#[test]
fn cyclic_timer_fires_repeatedly_until_stopped() {
    let manager = TimerManager::new();
    let component = Component::spawn("cyclic-owner");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    let id = start_from_component(
        &component,
        &manager,
        Duration::from_millis(15),
        true,
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    std::thread::sleep(Duration::from_millis(100));
    assert!(manager.is_running(id));
    let count_at_stop = fired.load(Ordering::SeqCst);
    assert!(count_at_stop >= 3, "cyclic timer fired only {count_at_stop} times");

    assert!(manager.stop(id));
    std::thread::sleep(Duration::from_millis(50));
    let count_after_stop = fired.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(
        fired.load(Ordering::SeqCst),
        count_after_stop,
        "a stopped timer must not fire again"
    );
    component.stop();
}

#[test]
fn restart_pushes_the_deadline_out() {
    let manager = TimerManager::new();
    let component = Component::spawn("restart-owner");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    let id = start_from_component(
        &component,
        &manager,
        Duration::from_millis(80),
        false,
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    // keep rewinding before expiry; the timer must stay silent
    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(40));
        assert!(manager.restart(id));
    }
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    component.stop();
}

#[test]
fn stopping_an_unknown_job_reports_false() {
    let manager = TimerManager::new();
    assert!(!manager.stop(9999));
    assert!(!manager.restart(9999));
    assert!(!manager.set_cyclic(9999, true));
    assert!(!manager.is_running(9999));
    assert!(!manager.is_running(TIMER_JOB_INVALID));
}

#[test]
fn timer_wrapper_arms_and_reports_its_own_job() {
    let manager = TimerManager::new();
    let component = Component::spawn("wrapper-owner");
    let fired = Arc::new(AtomicUsize::new(0));
    let parked: Arc<Mutex<Option<Timer>>> = Arc::new(Mutex::new(None));

    let counter = Arc::clone(&fired);
    let stash = Arc::clone(&parked);
    let timer_manager = Arc::clone(&manager);
    let (armed, wait_armed) = mpsc::channel();
    component.post(move || {
        let mut timer = Timer::new(&timer_manager, false);
        timer.start(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.running());
        // keep the timer alive past this closure; dropping it would stop it
        *stash.lock().unwrap() = Some(timer);
        armed.send(()).unwrap();
    });
    wait_armed.recv_timeout(Duration::from_secs(5)).unwrap();

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!parked.lock().unwrap().as_ref().unwrap().running());
    component.stop();
}

#[test]
fn dropping_a_timer_stops_its_job() {
    let manager = TimerManager::new();
    let component = Component::spawn("drop-owner");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    let timer_manager = Arc::clone(&manager);
    let (armed, wait_armed) = mpsc::channel();
    component.post(move || {
        let mut timer = Timer::new(&timer_manager, false);
        timer.start(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        armed.send(()).unwrap();
        // timer drops here, taking the armed job with it
    });
    wait_armed.recv_timeout(Duration::from_secs(5)).unwrap();

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    component.stop();
}

#[test]
fn cyclic_timer_with_dead_component_auto_stops() {
    let manager = TimerManager::new();
    let component = Component::spawn("doomed");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    let id = start_from_component(
        &component,
        &manager,
        Duration::from_millis(20),
        true,
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    component.stop();
    drop(component);

    // the next fire notices the dead owner and stops the job
    std::thread::sleep(Duration::from_millis(80));
    assert!(!manager.is_running(id));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
