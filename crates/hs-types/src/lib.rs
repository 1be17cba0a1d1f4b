pub mod errors;
pub mod evaluation;
pub mod space;

pub use errors::*;
pub use evaluation::*;
pub use space::*;
