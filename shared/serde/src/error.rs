use std::fmt;

/// The error returned when a value cannot be read back from wire bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerdeErr;

impl fmt::Display for SerdeErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "serde error: ran out of bytes or read malformed data")
    }
}

impl std::error::Error for SerdeErr {}
