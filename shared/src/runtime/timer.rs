use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::component::{Component, WeakComponent, TIMEOUT_PRIORITY};

pub type TimerJobId = u64;

pub const TIMER_JOB_INVALID: TimerJobId = 0;

type FireCallback = Arc<dyn Fn() + Send + Sync>;

struct TimerJob {
    deadline: Instant,
    period: Duration,
    cyclic: bool,
    on_fire: FireCallback,
    // component that started the timer; expiry posts back into it
    owner: Option<WeakComponent>,
}

struct TimerState {
    jobs: Mutex<HashMap<TimerJobId, TimerJob>>,
    rescheduled: Condvar,
    running: AtomicBool,
    next_job_id: AtomicU64,
}

/// Drives one-shot and cyclic timers from a dedicated scheduling thread.
///
/// On expiry the user callback is not run on the scheduling thread: a
/// timeout message (priority [`TIMEOUT_PRIORITY`]) is posted to the
/// component that started the timer. A cyclic timer whose component is
/// gone is auto-stopped on its next fire; a one-shot in the same position
/// is simply dropped.
pub struct TimerManager {
    state: Arc<TimerState>,
    scheduler: Mutex<Option<thread::JoinHandle<()>>>,
}

impl TimerManager {
    pub fn new() -> Arc<Self> {
        let state = Arc::new(TimerState {
            jobs: Mutex::new(HashMap::new()),
            rescheduled: Condvar::new(),
            running: AtomicBool::new(true),
            next_job_id: AtomicU64::new(1),
        });

        let loop_state = Arc::clone(&state);
        let scheduler = thread::Builder::new()
            .name("weft-timer".to_string())
            .spawn(move || run_scheduler(loop_state))
            .expect("failed to spawn timer thread");

        Arc::new(Self {
            state,
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    /// Arms a timer. The owning component is captured from the calling
    /// thread's context now, not at fire time.
    pub fn start(
        &self,
        duration: Duration,
        on_fire: impl Fn() + Send + Sync + 'static,
        cyclic: bool,
    ) -> TimerJobId {
        let id = self.state.next_job_id.fetch_add(1, AtomicOrdering::Relaxed);
        let job = TimerJob {
            deadline: Instant::now() + duration,
            period: duration,
            cyclic,
            on_fire: Arc::new(on_fire),
            owner: Component::current(),
        };
        self.state
            .jobs
            .lock()
            .expect("timer jobs poisoned")
            .insert(id, job);
        self.state.rescheduled.notify_one();
        debug!("Started timer job {id} ({duration:?}, cyclic: {cyclic})");
        id
    }

    /// Rewinds a live job's deadline to a full period from now.
    pub fn restart(&self, id: TimerJobId) -> bool {
        let mut jobs = self.state.jobs.lock().expect("timer jobs poisoned");
        match jobs.get_mut(&id) {
            Some(job) => {
                job.deadline = Instant::now() + job.period;
                self.state.rescheduled.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn stop(&self, id: TimerJobId) -> bool {
        let removed = self
            .state
            .jobs
            .lock()
            .expect("timer jobs poisoned")
            .remove(&id)
            .is_some();
        if removed {
            self.state.rescheduled.notify_one();
        }
        removed
    }

    pub fn set_cyclic(&self, id: TimerJobId, cyclic: bool) -> bool {
        let mut jobs = self.state.jobs.lock().expect("timer jobs poisoned");
        match jobs.get_mut(&id) {
            Some(job) => {
                job.cyclic = cyclic;
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: TimerJobId) -> bool {
        id != TIMER_JOB_INVALID
            && self
                .state
                .jobs
                .lock()
                .expect("timer jobs poisoned")
                .contains_key(&id)
    }

    pub fn shutdown(&self) {
        self.state.running.store(false, AtomicOrdering::Release);
        self.state.rescheduled.notify_all();
        let scheduler = self
            .scheduler
            .lock()
            .expect("timer scheduler poisoned")
            .take();
        if let Some(handle) = scheduler {
            let _ = handle.join();
        }
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_scheduler(state: Arc<TimerState>) {
    let mut jobs = state.jobs.lock().expect("timer jobs poisoned");
    while state.running.load(AtomicOrdering::Acquire) {
        let now = Instant::now();

        // Collect everything due, re-arming cyclic jobs in place.
        let mut fired = Vec::new();
        let mut finished = Vec::new();
        for (&id, job) in jobs.iter_mut() {
            if job.deadline <= now {
                fired.push((id, job.on_fire.clone(), job.owner.clone(), job.cyclic));
                if job.cyclic {
                    job.deadline = now + job.period;
                } else {
                    finished.push(id);
                }
            }
        }
        for id in &finished {
            jobs.remove(id);
        }

        let next_deadline = jobs.values().map(|job| job.deadline).min();

        if !fired.is_empty() {
            drop(jobs);
            for (id, on_fire, owner, cyclic) in fired {
                deliver_expiry(&state, id, on_fire, owner, cyclic);
            }
            jobs = state.jobs.lock().expect("timer jobs poisoned");
            continue;
        }

        jobs = match next_deadline {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                state
                    .rescheduled
                    .wait_timeout(jobs, wait)
                    .expect("timer jobs poisoned")
                    .0
            }
            None => state
                .rescheduled
                .wait(jobs)
                .expect("timer jobs poisoned"),
        };
    }
}

fn deliver_expiry(
    state: &Arc<TimerState>,
    id: TimerJobId,
    on_fire: FireCallback,
    owner: Option<WeakComponent>,
    cyclic: bool,
) {
    let posted = match owner {
        Some(owner) => owner.post_with_priority(TIMEOUT_PRIORITY, move || on_fire()),
        None => {
            warn!("Timer job {id} has no owning component, expiry dropped");
            false
        }
    };
    if !posted && cyclic {
        info!("Component owning cyclic timer job {id} is gone, stopping it");
        state
            .jobs
            .lock()
            .expect("timer jobs poisoned")
            .remove(&id);
    }
}

/// User-facing timer bound to one manager: start it with a callback, and
/// the callback lands in the mailbox of the component that called
/// [`Timer::start`].
pub struct Timer {
    manager: Arc<TimerManager>,
    id: TimerJobId,
    cyclic: bool,
}

impl Timer {
    pub fn new(manager: &Arc<TimerManager>, cyclic: bool) -> Self {
        Self {
            manager: Arc::clone(manager),
            id: TIMER_JOB_INVALID,
            cyclic,
        }
    }

    /// Arms the timer. A timer already running is stopped first.
    pub fn start(&mut self, duration: Duration, on_fire: impl Fn() + Send + Sync + 'static) {
        if self.running() {
            info!("Timer is still running, stopping it before restart");
            self.stop();
        }
        self.id = self.manager.start(duration, on_fire, self.cyclic);
    }

    pub fn restart(&self) -> bool {
        self.manager.restart(self.id)
    }

    pub fn stop(&mut self) {
        if self.id != TIMER_JOB_INVALID {
            self.manager.stop(self.id);
            self.id = TIMER_JOB_INVALID;
        }
    }

    pub fn set_cyclic(&mut self, cyclic: bool) {
        if cyclic != self.cyclic {
            self.cyclic = cyclic;
            self.manager.set_cyclic(self.id, cyclic);
        }
    }

    pub fn running(&self) -> bool {
        self.manager.is_running(self.id)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
