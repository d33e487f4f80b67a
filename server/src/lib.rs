//! # Weft Server
//! The server-side half of the weft messaging fabric: a
//! [`ServiceProvider`] registers request handlers per operation, answers
//! inbound requests through [`RequestKeeper`] handles, broadcasts signals
//! and maintains observable property state for its subscribers.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub mod shared {
    pub use weft_shared::{
        decode_content, encode_content, ActionError, ActionResult, Address, Availability, CsError,
        Envelope, OpCode, OpId, Payload, ServiceId, TranslateError,
    };
}

mod provider;
mod registry;
mod request_keeper;

pub use provider::{RequestHandler, ServiceProvider};
pub use registry::ServerRegistry;
pub use request_keeper::{AbortCallback, RequestKeeper, ResponseStatus};
