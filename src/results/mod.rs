mod cursor;
mod row;
mod rows;

pub use cursor::{BufferedCursor, Cursor};
pub use row::Row;
pub use rows::Rows;
