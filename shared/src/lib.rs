//! # Weft Shared
//! Common functionality shared between weft-client & weft-server crates:
//! the message envelope and opcodes, payloads and the payload codec,
//! request-id allocation, transport interfaces, and the component/timer
//! runtime that delivers asynchronous results back to user code.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use weft_serde::{ByteReader, ByteWriter, Serde, SerdeErr};

mod address;
mod content;
mod envelope;
mod error;
mod payload;
mod request_id_pool;
mod runtime;
mod transport;
mod types;

pub use address::Address;
pub use content::{
    decode_content, decode_content_logged, encode_content, AvailabilityUpdate, CsError,
    TranslateError,
};
pub use envelope::{Envelope, OpCode};
pub use error::{ActionError, ActionResult};
pub use payload::Payload;
pub use request_id_pool::{RegId, RequestIdPool};
pub use runtime::{
    Component, Timer, TimerJobId, TimerManager, WeakComponent, NORMAL_PRIORITY, TIMEOUT_PRIORITY,
    TIMER_JOB_INVALID,
};
pub use transport::{ClientTransport, PacketEndpoint, PacketSender, ServerTransport};
pub use types::{Availability, OpId, RequestId, ServiceId, REQUEST_ID_INVALID};
