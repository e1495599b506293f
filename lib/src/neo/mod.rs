//! Model of the target virtual machine's executable artifacts
//!
//! This module knows nothing about where a script came from. It provides the opcode table of
//! the stack machine, an instruction representation whose branch and call operands may still be
//! symbolic, and the two deployment artifacts every contract ships as: the binary NEF container
//! and the JSON manifest describing the contract's interface.
//!
//! ### Simple example
//!
//! ```
//! use jbc2nef::neo::{NefFile, Op};
//!
//! let nef = NefFile {
//!     compiler: "jbc2nef".to_string(),
//!     source_url: String::new(),
//!     tokens: vec![],
//!     script: vec![Op::Push1.code(), Op::Ret.code()],
//! };
//!
//! let bytes = nef.to_bytes()?;
//! assert_eq!(&bytes[..4], b"NEF3");
//! # Ok::<(), std::io::Error>(())
//! ```

mod insn;
mod manifest;
mod nef;
mod opcode;
mod serialize;

pub use insn::*;
pub use manifest::*;
pub use nef::*;
pub use opcode::*;
pub use serialize::*;
