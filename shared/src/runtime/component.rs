use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;

use log::{debug, trace};

/// Priority of plain callback-execution messages.
pub const NORMAL_PRIORITY: i32 = 0;

/// Priority of timer expiry messages; dequeued ahead of everything posted
/// at normal priority.
pub const TIMEOUT_PRIORITY: i32 = 1000;

type Task = Box<dyn FnOnce() + Send>;

struct QueuedMessage {
    priority: i32,
    seq: u64,
    task: Task,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Max-heap: higher priority first, FIFO (lower seq) within a priority.
impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Mailbox {
    name: String,
    queue: Mutex<BinaryHeap<QueuedMessage>>,
    available: Condvar,
    running: AtomicBool,
    next_seq: AtomicU64,
}

impl Mailbox {
    fn post(&self, priority: i32, task: Task) -> bool {
        if !self.running.load(AtomicOrdering::Acquire) {
            trace!("Dropping message posted to stopped component '{}'", self.name);
            return false;
        }
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.queue
            .lock()
            .expect("component mailbox poisoned")
            .push(QueuedMessage {
                priority,
                seq,
                task,
            });
        self.available.notify_one();
        true
    }
}

thread_local! {
    static CURRENT_COMPONENT: RefCell<Option<Weak<Mailbox>>> = const { RefCell::new(None) };
}

/// A named component: one mailbox with priority FIFO semantics, serviced
/// by its own thread. Messages of higher numeric priority are dequeued
/// first; equal priorities preserve insertion order.
///
/// While a message runs, the component is installed as the thread's
/// current component, so callbacks started from inside it (requests,
/// timers) can capture it and post their results back.
pub struct Component {
    mailbox: Arc<Mailbox>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Component {
    /// Creates the component and starts its message loop thread.
    pub fn spawn(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let mailbox = Arc::new(Mailbox {
            name: name.clone(),
            queue: Mutex::new(BinaryHeap::new()),
            available: Condvar::new(),
            running: AtomicBool::new(true),
            next_seq: AtomicU64::new(0),
        });

        let loop_mailbox = Arc::clone(&mailbox);
        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || run_message_loop(loop_mailbox))
            .expect("failed to spawn component thread");

        Arc::new(Self {
            mailbox,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.mailbox.name
    }

    /// Posts a callback-execution message at normal priority. Returns
    /// false if the component has stopped (the message is discarded).
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) -> bool {
        self.mailbox.post(NORMAL_PRIORITY, Box::new(callback))
    }

    pub fn post_with_priority(
        &self,
        priority: i32,
        callback: impl FnOnce() + Send + 'static,
    ) -> bool {
        self.mailbox.post(priority, Box::new(callback))
    }

    /// The component currently executing on this thread, if any. Captured
    /// by requesters and timers at call time so results can be posted back
    /// to the initiating component's mailbox.
    pub fn current() -> Option<WeakComponent> {
        CURRENT_COMPONENT.with(|current| current.borrow().clone().map(WeakComponent))
    }

    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent(Arc::downgrade(&self.mailbox))
    }

    /// Stops the message loop. The message being processed finishes;
    /// everything still queued is dropped.
    pub fn stop(&self) {
        self.mailbox.running.store(false, AtomicOrdering::Release);
        self.mailbox.available.notify_all();
        let worker = self.worker.lock().expect("component worker poisoned").take();
        if let Some(handle) = worker {
            if thread::current().id() != handle.thread().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Non-owning, lifetime-checked handle to a component. Posting through a
/// handle whose component is gone is a silent no-op returning false.
#[derive(Clone)]
pub struct WeakComponent(Weak<Mailbox>);

impl WeakComponent {
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) -> bool {
        self.post_with_priority(NORMAL_PRIORITY, callback)
    }

    pub fn post_with_priority(
        &self,
        priority: i32,
        callback: impl FnOnce() + Send + 'static,
    ) -> bool {
        match self.0.upgrade() {
            Some(mailbox) => mailbox.post(priority, Box::new(callback)),
            None => false,
        }
    }

    pub fn is_gone(&self) -> bool {
        self.0.strong_count() == 0
    }
}

fn run_message_loop(mailbox: Arc<Mailbox>) {
    debug!("Component '{}' message loop started", mailbox.name);
    CURRENT_COMPONENT.with(|current| {
        *current.borrow_mut() = Some(Arc::downgrade(&mailbox));
    });

    loop {
        let message = {
            let mut queue = mailbox.queue.lock().expect("component mailbox poisoned");
            loop {
                if !mailbox.running.load(AtomicOrdering::Acquire) {
                    break None;
                }
                if let Some(message) = queue.pop() {
                    break Some(message);
                }
                queue = mailbox
                    .available
                    .wait(queue)
                    .expect("component mailbox poisoned");
            }
        };

        match message {
            Some(message) => (message.task)(),
            None => break,
        }
    }

    CURRENT_COMPONENT.with(|current| {
        *current.borrow_mut() = None;
    });
    debug!("Component '{}' message loop stopped", mailbox.name);
}
