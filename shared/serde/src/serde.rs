use crate::{byte_reader::ByteReader, byte_writer::ByteWriter, error::SerdeErr};

/// A type that can serialize itself to wire bytes and read itself back.
///
/// Contract: for any value `v`, writing `v` and reading it back yields a
/// value equal to `v`, consuming exactly the bytes that were written.
pub trait Serde: Sized {
    fn ser(&self, writer: &mut ByteWriter);
    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr>;
}

impl Serde for bool {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u8(u8::from(*self));
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerdeErr),
        }
    }
}

impl Serde for u8 {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_u8(*self);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        reader.read_u8()
    }
}

impl Serde for u16 {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_bytes(&self.to_le_bytes());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let bytes = reader.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

impl Serde for u32 {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_bytes(&self.to_le_bytes());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let bytes = reader.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl Serde for u64 {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_bytes(&self.to_le_bytes());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let bytes = reader.read_bytes(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(array))
    }
}

impl Serde for i32 {
    fn ser(&self, writer: &mut ByteWriter) {
        writer.write_bytes(&self.to_le_bytes());
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let bytes = reader.read_bytes(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

// Strings are u16-length-prefixed UTF-8; anything longer cannot be
// represented on the wire.
impl Serde for String {
    fn ser(&self, writer: &mut ByteWriter) {
        let len = u16::try_from(self.len()).unwrap_or(u16::MAX);
        len.ser(writer);
        writer.write_bytes(&self.as_bytes()[..usize::from(len)]);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let len = u16::de(reader)?;
        let bytes = reader.read_bytes(usize::from(len))?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerdeErr)
    }
}

// Byte buffers are u32-length-prefixed.
impl Serde for Vec<u8> {
    fn ser(&self, writer: &mut ByteWriter) {
        let len = u32::try_from(self.len()).unwrap_or(u32::MAX);
        len.ser(writer);
        writer.write_bytes(&self[..len as usize]);
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        let len = u32::de(reader)?;
        Ok(reader.read_bytes(len as usize)?.to_vec())
    }
}
