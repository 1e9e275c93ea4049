pub mod article;
pub mod dialog;
pub mod pack;
pub mod summary;

pub use article::*;
pub use dialog::*;
pub use pack::*;
pub use summary::*;
