//! The NEF3 executable container
//!
//! A [`NefFile`] wraps the assembled script together with the compiler identification, an
//! optional source URL and the method token table used by `CALLT`. The serialized layout is
//!
//! ```text
//! magic       u32, little-endian, spells "NEF3"
//! compiler    64 bytes, UTF-8 name padded with zeros
//! source url  var-length string, at most 255 bytes
//! reserved    1 zero byte
//! tokens      var-length list of method tokens
//! reserved    2 zero bytes
//! script      var-length bytes
//! checksum    first 4 bytes of SHA-256(SHA-256(everything above))
//! ```

use bitflags::bitflags;
use byteorder::{LittleEndian, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::io;

use super::serialize::{write_var_bytes, write_var_int, write_var_string, Serialize};

/// First four bytes of every NEF file, "NEF3" when read as ASCII
pub const MAGIC: u32 = 0x3346454E;

/// Fixed size of the compiler name field
pub const COMPILER_FIELD_LEN: usize = 64;

/// Longest admissible source URL, in UTF-8 bytes
pub const MAX_SOURCE_URL_LEN: usize = 255;

/// Longest admissible script
pub const MAX_SCRIPT_LENGTH: usize = 512 * 1024;

bitflags! {
    /// Permission mask a cross-contract call is performed with
    pub struct CallFlags: u8 {
        /// Read blockchain state
        const READ_STATES = 0b0001;

        /// Write blockchain state
        const WRITE_STATES = 0b0010;

        /// Call into other contracts
        const ALLOW_CALL = 0b0100;

        /// Send notifications
        const ALLOW_NOTIFY = 0b1000;

        const STATES = Self::READ_STATES.bits | Self::WRITE_STATES.bits;
        const READ_ONLY = Self::READ_STATES.bits | Self::ALLOW_CALL.bits;
        const ALL = Self::STATES.bits | Self::ALLOW_CALL.bits | Self::ALLOW_NOTIFY.bits;
    }
}

/// One entry of the method token table
///
/// `CALLT` instructions name their callee through an index into this table instead of carrying
/// the full target description inline.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MethodToken {
    /// Script hash of the called contract, in little-endian byte order
    pub hash: [u8; 20],

    /// Name of the called method
    pub method: String,

    /// Number of parameters the called method takes
    pub params: u16,

    /// Whether the called method leaves a return value on the stack
    pub has_return: bool,

    /// Permissions the call is performed with
    pub call_flags: CallFlags,
}

impl Serialize for MethodToken {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.hash)?;
        write_var_string(&self.method, writer)?;
        self.params.serialize(writer)?;
        (self.has_return as u8).serialize(writer)?;
        self.call_flags.bits().serialize(writer)
    }
}

/// A complete NEF file
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct NefFile {
    /// Name and version of the producing compiler, at most 64 UTF-8 bytes
    pub compiler: String,

    /// Where the source of the contract can be found, possibly empty
    pub source_url: String,

    /// Method token table referenced by `CALLT` instructions, in operand index order
    pub tokens: Vec<MethodToken>,

    /// The assembled script
    pub script: Vec<u8>,
}

impl NefFile {
    /// Serialized file, checksum included
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        bytes.extend_from_slice(&checksum(&bytes));
        Ok(bytes)
    }
}

impl Serialize for NefFile {
    /// Writes the file without its checksum
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        if self.compiler.len() > COMPILER_FIELD_LEN {
            return Err(invalid_data("compiler name exceeds 64 bytes"));
        }
        if self.source_url.len() > MAX_SOURCE_URL_LEN {
            return Err(invalid_data("source URL exceeds 255 bytes"));
        }
        if self.script.is_empty() {
            return Err(invalid_data("script is empty"));
        }
        if self.script.len() > MAX_SCRIPT_LENGTH {
            return Err(invalid_data("script exceeds the maximum length"));
        }

        writer.write_u32::<LittleEndian>(MAGIC)?;
        writer.write_all(self.compiler.as_bytes())?;
        for _ in self.compiler.len()..COMPILER_FIELD_LEN {
            writer.write_u8(0)?;
        }
        write_var_string(&self.source_url, writer)?;
        writer.write_u8(0)?;
        write_var_int(self.tokens.len() as u64, writer)?;
        for token in &self.tokens {
            token.serialize(writer)?;
        }
        writer.write_u16::<LittleEndian>(0)?;
        write_var_bytes(&self.script, writer)
    }
}

/// First four bytes of the double SHA-256 hash
pub fn checksum(bytes: &[u8]) -> [u8; 4] {
    let inner = Sha256::digest(bytes);
    let outer = Sha256::digest(inner);
    let mut first = [0u8; 4];
    first.copy_from_slice(&outer[..4]);
    first
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn method_token_layout() {
        let token = MethodToken {
            hash: [0x11; 20],
            method: "transfer".to_string(),
            params: 3,
            has_return: true,
            call_flags: CallFlags::ALL,
        };

        let mut bytes = vec![];
        token.serialize(&mut bytes).unwrap();

        let mut expected = vec![0x11; 20];
        expected.push(8);
        expected.extend_from_slice(b"transfer");
        expected.extend_from_slice(&[0x03, 0x00, 0x01, 0x0F]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn nef_layout() {
        let nef = NefFile {
            compiler: "test".to_string(),
            source_url: String::new(),
            tokens: vec![],
            script: vec![0x40],
        };
        let bytes = nef.to_bytes().unwrap();

        assert_eq!(bytes.len(), 4 + 64 + 1 + 1 + 1 + 2 + 2 + 4);
        assert_eq!(&bytes[..4], b"NEF3");
        assert_eq!(&bytes[4..8], b"test");
        assert!(bytes[8..68].iter().all(|byte| *byte == 0));
        // source url, reserved byte, token count, reserved word
        assert_eq!(&bytes[68..73], &[0, 0, 0, 0, 0]);
        assert_eq!(&bytes[73..75], &[1, 0x40]);

        let tail = bytes.len() - 4;
        assert_eq!(&bytes[tail..], &checksum(&bytes[..tail]));
    }

    #[test]
    fn checksum_is_double_sha256() {
        // SHA-256(SHA-256(b"")) starts with 5d f6 e0 e2
        assert_eq!(checksum(b""), [0x5D, 0xF6, 0xE0, 0xE2]);
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let nef = NefFile {
            compiler: "x".repeat(65),
            source_url: String::new(),
            tokens: vec![],
            script: vec![0x40],
        };
        assert!(nef.to_bytes().is_err());

        let nef = NefFile {
            compiler: String::new(),
            source_url: String::new(),
            tokens: vec![],
            script: vec![],
        };
        assert!(nef.to_bytes().is_err());
    }

    #[test]
    fn call_flag_bits() {
        assert_eq!(CallFlags::ALL.bits(), 0b1111);
        assert_eq!(CallFlags::READ_ONLY.bits(), 0b0101);
        assert_eq!(CallFlags::STATES.bits(), 0b0011);
    }
}
