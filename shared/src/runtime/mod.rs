//! Cooperative per-component message loop and the timer manager that
//! feeds it. Asynchronous results are handed back to user code by posting
//! callback messages into the mailbox of the component that initiated the
//! operation.

mod component;
mod timer;

pub use component::{Component, WeakComponent, NORMAL_PRIORITY, TIMEOUT_PRIORITY};
pub use timer::{Timer, TimerJobId, TimerManager, TIMER_JOB_INVALID};
