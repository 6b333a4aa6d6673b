pub mod column;
pub mod field;
pub mod row;
pub mod schema;

pub use column::Column;
pub use field::{CmpBool, Field, TypeId};
pub use row::{Row, RowId};
pub use schema::Schema;
