//! # Weft Serde
//! Byte-oriented serialization for weft's wire types. Everything on the
//! wire is byte-aligned; integers are little-endian, strings and byte
//! buffers are length-prefixed.

mod byte_reader;
mod byte_writer;
mod error;
mod serde;

pub use byte_reader::ByteReader;
pub use byte_writer::ByteWriter;
pub use error::SerdeErr;
pub use serde::Serde;
