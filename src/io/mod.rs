pub mod input;
pub mod output;
pub mod sink;

pub use input::*;
pub use output::*;
pub use sink::*;
