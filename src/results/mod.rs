//! Rows and result sets returned by a batch execution.

mod convert;
mod result_set;
mod row;

pub use convert::FromRowValue;
pub use result_set::ResultSet;
pub use row::{CustomDbRow, FromRow};
