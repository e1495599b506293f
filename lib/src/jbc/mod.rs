//! Model of the source bytecode
//!
//! The compiler does not read the managed binary class format itself; an external class reader
//! produces the structured [`UnitDescriptor`] consumed here. This module defines that input
//! contract together with the name conventions tying source level types to the target ABI.

mod descriptor;
mod types;

pub use descriptor::*;
pub use types::*;
