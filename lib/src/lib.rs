//! Compiler from JVM style stack bytecode units to NeoVM contract artifacts
//!
//! The [`jbc`] module models the source input as produced by an external class reader, [`neo`]
//! models the target machine and its two deployment artifacts, and [`translate`] is the
//! pipeline between them. [`translate::compile`] compiles one unit.

pub mod jbc;
pub mod neo;
pub mod translate;
pub mod util;
