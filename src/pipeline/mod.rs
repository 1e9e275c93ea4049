pub mod aggregate;
pub mod chunk;
pub mod dialogs;
pub mod meeting;
pub mod packer;
pub mod reduce;

pub use aggregate::*;
pub use chunk::*;
pub use dialogs::*;
pub use meeting::*;
pub use packer::*;
pub use reduce::*;
