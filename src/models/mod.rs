pub mod alert;
pub mod locator;
pub mod photo;
pub mod row_model;

pub use alert::*;
pub use locator::*;
pub use photo::*;
pub use row_model::*;
