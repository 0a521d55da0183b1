/// Primitive InterMine data types and NewType-patterns.
mod service_root;
mod strings;
mod view;

pub use service_root::*;
pub use strings::*;
pub use view::*;
