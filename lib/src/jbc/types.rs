//! Recognition of source level type names
//!
//! The source language's types are mapped onto the target ABI's fixed type enumeration by
//! name convention. Chain specific types (script hashes, public keys, signatures) have no
//! counterpart in the source type system and are recognized purely by their canonical names.

use crate::neo::ParamType;

/// Map a source level type name onto the ABI type enumeration
///
/// Names are matched case-insensitively. An array of any recognized element type maps to the
/// plain `Array` type. Returns `None` for a name outside the convention, which callers report
/// as a manifest generation failure.
pub fn abi_type(source: &str) -> Option<ParamType> {
    let name = source.trim().to_ascii_lowercase();
    if let Some(element) = name.strip_suffix("[]") {
        // Byte arrays are a bytestring on chain, every other element type is opaque
        return match element {
            "byte" => Some(ParamType::ByteArray),
            _ => abi_type(element).map(|_| ParamType::Array),
        };
    }

    match name.as_str() {
        "void" => Some(ParamType::Void),
        "int" | "long" | "short" | "byte" | "char" | "integer" => Some(ParamType::Integer),
        "bool" | "boolean" => Some(ParamType::Boolean),
        "string" => Some(ParamType::String),
        "bytes" | "bytestring" => Some(ParamType::ByteArray),
        "hash160" => Some(ParamType::Hash160),
        "hash256" => Some(ParamType::Hash256),
        "pubkey" | "publickey" => Some(ParamType::PublicKey),
        "signature" => Some(ParamType::Signature),
        "array" | "list" => Some(ParamType::Array),
        "map" => Some(ParamType::Map),
        "iterator" | "interopinterface" => Some(ParamType::InteropInterface),
        "any" | "object" => Some(ParamType::Any),
        _ => None,
    }
}

/// Decode a hex string of the exact expected byte length
pub fn hex_of_len(text: &str, len: usize) -> Option<Vec<u8>> {
    let bytes = hex::decode(text).ok()?;
    if bytes.len() == len {
        Some(bytes)
    } else {
        None
    }
}

/// Whether the string names a contract for a permission or trust declaration: the wildcard,
/// a 20 byte contract hash or a 33 byte group public key
pub fn is_contract_pattern(text: &str) -> bool {
    text == "*" || hex_of_len(text, 20).is_some() || hex_of_len(text, 33).is_some()
}
