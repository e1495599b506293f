mod assemble;
mod errors;
mod layout;
mod linker;
mod manifest;
mod method;
mod selector;
mod settings;
mod unit;

pub use assemble::*;
pub use errors::*;
pub use layout::*;
pub use linker::*;
pub use manifest::*;
pub use method::*;
pub use selector::*;
pub use settings::*;
pub use unit::*;
