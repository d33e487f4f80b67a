//! # Weft Router
//! Moves envelopes between service requesters and providers and tells
//! requesters when provider availability changes. Two realizations share
//! the same capability set: [`DirectRouter`] bridges endpoints living in
//! one process with direct calls; [`IpcClientRouter`] / [`IpcServerRouter`]
//! bridge processes through the wire codec over a pluggable packet
//! transport.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod direct;
mod ipc;

pub use direct::DirectRouter;
pub use ipc::{IpcClientRouter, IpcServerRouter};
