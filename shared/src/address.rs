use std::fmt;

use weft_serde::{ByteReader, ByteWriter, Serde, SerdeErr};

/// Identifies one peer endpoint as a `(name, port)` pair. `("", 0)` is the
/// unspecified address, meaning "local / not yet stamped by a router".
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    name: String,
    port: u16,
}

impl Address {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }

    pub fn unspecified() -> Self {
        Self {
            name: String::new(),
            port: 0,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.name.is_empty() && self.port == 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

impl Serde for Address {
    fn ser(&self, writer: &mut ByteWriter) {
        self.name.ser(writer);
        self.port.ser(writer);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let name = String::de(reader)?;
        let port = u16::de(reader)?;
        Ok(Self { name, port })
    }
}
