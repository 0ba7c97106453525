pub mod controls;
pub mod row_widget;

pub use row_widget::RowWidget;
