//! SQLite backend on top of a single `rusqlite` connection.
//!
//! - `connection`: the [`Connection`](crate::connection::Connection) and its transactions
//! - `params`: converting [`Value`](crate::Value) into `rusqlite` values
//! - `query`: reading rows back into buffered cursors

mod connection;
pub mod params;
pub mod query;

pub use connection::{SqliteConnection, SqlitePrepared, SqliteTx};
