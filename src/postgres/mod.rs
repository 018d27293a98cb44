//! PostgreSQL backend on top of a `deadpool_postgres` pool.
//!
//! - `connection`: pooled [`Connection`](crate::connection::Connection) and its transactions
//! - `params`: binding [`Value`](crate::Value) to Postgres types
//! - `query`: reading rows back into buffered cursors

mod connection;
pub mod params;
pub mod query;

pub use connection::{PostgresConnection, PostgresPrepared, PostgresTx, begin_statement};
