//! # Weft Client
//! The client-side half of the weft messaging fabric: a
//! [`ServiceRequester`] issues requests against a named service, manages
//! signal and property registrations, and observes service availability,
//! all through whichever router realization it is wired to.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub mod shared {
    pub use weft_shared::{
        decode_content, encode_content, ActionError, ActionResult, Address, Availability,
        Component, Envelope, OpCode, OpId, Payload, RegId, ServiceId, Timer, TimerManager,
    };
}

mod property_cache;
mod registry;
mod requester;
mod sync_call;

pub use property_cache::PropertyCache;
pub use registry::ClientRegistry;
pub use requester::{ObserverStatus, PayloadCallback, ServiceRequester, ServiceStatusObserver};
