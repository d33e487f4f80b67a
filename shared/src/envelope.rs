use std::fmt;

use weft_serde::{ByteReader, ByteWriter, Serde, SerdeErr};

use crate::{
    address::Address,
    payload::Payload,
    types::{OpId, RequestId, ServiceId, REQUEST_ID_INVALID},
};

/// Encodes both the client's intent and the kind of reply the server
/// sends back: a response carries the same opcode as the request that
/// triggered it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    Request,
    Abort,
    StatusRegister,
    SignalRegister,
    Unregister,
    StatusGet,
    StatusUpdate,
    SignalBroadcast,
    ServiceStatusUpdate,
    ClientGoesOff,
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Serde for OpCode {
    fn ser(&self, writer: &mut ByteWriter) {
        let byte = match self {
            OpCode::Request => 0u8,
            OpCode::Abort => 1,
            OpCode::StatusRegister => 2,
            OpCode::SignalRegister => 3,
            OpCode::Unregister => 4,
            OpCode::StatusGet => 5,
            OpCode::StatusUpdate => 6,
            OpCode::SignalBroadcast => 7,
            OpCode::ServiceStatusUpdate => 8,
            OpCode::ClientGoesOff => 9,
        };
        byte.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        match u8::de(reader)? {
            0 => Ok(OpCode::Request),
            1 => Ok(OpCode::Abort),
            2 => Ok(OpCode::StatusRegister),
            3 => Ok(OpCode::SignalRegister),
            4 => Ok(OpCode::Unregister),
            5 => Ok(OpCode::StatusGet),
            6 => Ok(OpCode::StatusUpdate),
            7 => Ok(OpCode::SignalBroadcast),
            8 => Ok(OpCode::ServiceStatusUpdate),
            9 => Ok(OpCode::ClientGoesOff),
            _ => Err(SerdeErr),
        }
    }
}

/// The transport-neutral message envelope exchanged between requesters and
/// providers.
///
/// The requester stamps `request_id` before transmission; a provider reply
/// preserves it unchanged so the requester can pair response to request.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub service_id: ServiceId,
    pub op_id: OpId,
    pub op_code: OpCode,
    pub request_id: RequestId,
    pub source: Address,
    pub payload: Option<Payload>,
}

impl Envelope {
    pub fn new(service_id: ServiceId, op_id: OpId, op_code: OpCode) -> Self {
        Self {
            service_id,
            op_id,
            op_code,
            request_id: REQUEST_ID_INVALID,
            source: Address::unspecified(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Option<Payload>) -> Self {
        self.payload = payload;
        self
    }

    /// Builds the reply skeleton for this envelope: same service,
    /// operation, opcode and request id, empty payload.
    pub fn reply(&self) -> Self {
        Self {
            service_id: self.service_id.clone(),
            op_id: self.op_id.clone(),
            op_code: self.op_code,
            request_id: self.request_id,
            source: Address::unspecified(),
            payload: None,
        }
    }

    pub fn take_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }
}

// Wire field order: serviceID, opID, opCode, requestID, sourceAddress,
// payload (length-prefixed opaque bytes; zero length means no payload).
impl Serde for Envelope {
    fn ser(&self, writer: &mut ByteWriter) {
        self.service_id.ser(writer);
        self.op_id.ser(writer);
        self.op_code.ser(writer);
        self.request_id.ser(writer);
        self.source.ser(writer);
        match &self.payload {
            Some(payload) => payload.bytes().to_vec().ser(writer),
            None => Vec::<u8>::new().ser(writer),
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let service_id = ServiceId::de(reader)?;
        let op_id = OpId::de(reader)?;
        let op_code = OpCode::de(reader)?;
        let request_id = RequestId::de(reader)?;
        let source = Address::de(reader)?;
        let bytes = Vec::<u8>::de(reader)?;
        let payload = if bytes.is_empty() {
            None
        } else {
            Some(Payload::from_bytes(bytes))
        };
        Ok(Self {
            service_id,
            op_id,
            op_code,
            request_id,
            source,
            payload,
        })
    }
}
