//! Streaming results: row formats, decoders, and the views wrapping each decoded record.

mod decoder;
mod format;
mod iterator;
mod object;
mod row;

pub use decoder::*;
pub use format::*;
pub use iterator::*;
pub use object::*;
pub use row::*;
