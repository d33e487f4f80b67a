use log::error;
use thiserror::Error;
use weft_serde::{ByteReader, ByteWriter, Serde, SerdeErr};

use crate::payload::Payload;

/// Why a payload could not be turned into typed content. Decoding never
/// panics out of this boundary; every failure maps to one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// There was no payload, or no bytes left in it
    #[error("payload carries no source bytes to decode")]
    NoSource,

    /// The payload ended before the content was fully read
    #[error("payload bytes ended before the content was fully decoded")]
    SourceCorrupted,

    /// The requested type does not match the payload's layout
    #[error("decoded content does not match the payload layout ({trailing} bytes left unread)")]
    DestSrcMismatch { trailing: usize },
}

/// Decodes the unconsumed tail of `payload` into a `T`, consuming the
/// bytes it reads. A decode that succeeds but leaves bytes behind is
/// reported as [`TranslateError::DestSrcMismatch`]: the caller asked for
/// the wrong content type.
pub fn decode_content<T: Serde>(payload: Option<&mut Payload>) -> Result<T, TranslateError> {
    let payload = payload.ok_or(TranslateError::NoSource)?;
    if payload.is_consumed() {
        return Err(TranslateError::NoSource);
    }

    let (result, consumed, trailing) = {
        let mut reader = ByteReader::new(payload.remaining());
        let result = T::de(&mut reader);
        (result, reader.bytes_read(), reader.remaining())
    };

    match result {
        Ok(content) => {
            payload.advance(consumed);
            if trailing > 0 {
                return Err(TranslateError::DestSrcMismatch { trailing });
            }
            Ok(content)
        }
        Err(SerdeErr) => Err(TranslateError::SourceCorrupted),
    }
}

/// Serializes `content` into an outgoing payload buffer.
///
/// Contract: `decode_content(encode_content(&x)) == x` for every `x` whose
/// `Serde` impl honors the write/read symmetry.
pub fn encode_content<T: Serde>(content: &T) -> Payload {
    let mut writer = ByteWriter::new();
    content.ser(&mut writer);
    Payload::from_bytes(writer.to_bytes())
}

/// Structured error content a provider sends in place of a normal reply,
/// e.g. when a request names an operation no handler was registered for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsError {
    pub code: i32,
    pub description: String,
}

impl CsError {
    /// The requested operation has no registered handler.
    pub const OP_NOT_SUPPORTED: i32 = -100;

    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

impl Serde for CsError {
    fn ser(&self, writer: &mut ByteWriter) {
        self.code.ser(writer);
        self.description.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let code = i32::de(reader)?;
        let description = String::de(reader)?;
        Ok(Self { code, description })
    }
}

/// Availability transition notice carried by `ServiceStatusUpdate`
/// envelopes on the IPC path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AvailabilityUpdate {
    pub old: crate::Availability,
    pub new: crate::Availability,
}

impl Serde for AvailabilityUpdate {
    fn ser(&self, writer: &mut ByteWriter) {
        self.old.ser(writer);
        self.new.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let old = crate::Availability::de(reader)?;
        let new = crate::Availability::de(reader)?;
        Ok(Self { old, new })
    }
}

/// `decode_content` with the failure logged, for dispatch paths that
/// swallow the error and continue with an empty result.
pub fn decode_content_logged<T: Serde>(
    payload: Option<&mut Payload>,
    context: &str,
) -> Option<T> {
    match decode_content::<T>(payload) {
        Ok(content) => Some(content),
        Err(err) => {
            error!("Could not translate {context} payload: {err}");
            None
        }
    }
}
