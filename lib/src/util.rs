mod offset_vec;

pub use offset_vec::{Offset, OffsetResult, OffsetVec, Width};
