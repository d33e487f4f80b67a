use std::fmt;

use weft_serde::{ByteReader, ByteWriter, Serde, SerdeErr};

/// Dense numeric id stamped on every request envelope, unique among the
/// live requests of one requester.
pub type RequestId = u32;

/// The id carried by envelopes that do not belong to an outstanding
/// request or registration.
pub const REQUEST_ID_INVALID: RequestId = u32::MAX;

/// Names one service within a router instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serde for ServiceId {
    fn ser(&self, writer: &mut ByteWriter) {
        self.0.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self(String::de(reader)?))
    }
}

/// Names one operation (request, signal or property) within a service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(String);

impl OpId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OpId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serde for OpId {
    fn ser(&self, writer: &mut ByteWriter) {
        self.0.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self(String::de(reader)?))
    }
}

/// What a requester currently knows about its service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Availability {
    Unknown,
    Unavailable,
    Available,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Availability::Unknown => "Unknown",
            Availability::Unavailable => "Unavailable",
            Availability::Available => "Available",
        };
        write!(f, "{name}")
    }
}

impl Serde for Availability {
    fn ser(&self, writer: &mut ByteWriter) {
        let byte = match self {
            Availability::Unknown => 0u8,
            Availability::Unavailable => 1,
            Availability::Available => 2,
        };
        byte.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        match u8::de(reader)? {
            0 => Ok(Availability::Unknown),
            1 => Ok(Availability::Unavailable),
            2 => Ok(Availability::Available),
            _ => Err(SerdeErr),
        }
    }
}
