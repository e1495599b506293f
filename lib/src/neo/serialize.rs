use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside NEF files
///
/// The NEF container has some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - all fixed-width integers are little-endian
///   - sequences and byte strings carry a variable-length integer prefix
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(*self)
    }
}

impl Serialize for u64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Serialize for i16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i16::<LittleEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<LittleEndian>(*self)
    }
}

impl Serialize for i64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<LittleEndian>(*self)
    }
}

/// Length as a var-int is the first thing serialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        write_var_int(self.len() as u64, writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

/// Variable-length integer: one byte below `0xFD`, then a `0xFD`/`0xFE`/`0xFF` marker followed by
/// the value as a little-endian `u16`/`u32`/`u64`
pub fn write_var_int<W: WriteBytesExt>(value: u64, writer: &mut W) -> Result<()> {
    if value < 0xFD {
        writer.write_u8(value as u8)
    } else if value <= 0xFFFF {
        writer.write_u8(0xFD)?;
        writer.write_u16::<LittleEndian>(value as u16)
    } else if value <= 0xFFFF_FFFF {
        writer.write_u8(0xFE)?;
        writer.write_u32::<LittleEndian>(value as u32)
    } else {
        writer.write_u8(0xFF)?;
        writer.write_u64::<LittleEndian>(value)
    }
}

/// Byte string with a var-int length prefix
pub fn write_var_bytes<W: WriteBytesExt>(bytes: &[u8], writer: &mut W) -> Result<()> {
    write_var_int(bytes.len() as u64, writer)?;
    writer.write_all(bytes)
}

/// UTF-8 string with a var-int length prefix
pub fn write_var_string<W: WriteBytesExt>(string: &str, writer: &mut W) -> Result<()> {
    write_var_bytes(string.as_bytes(), writer)
}
