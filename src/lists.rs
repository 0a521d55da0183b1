//! Lists: named sets of objects stored on a mine.

mod content;
mod list;
mod manager;

pub use content::*;
pub use list::*;
pub use manager::*;
