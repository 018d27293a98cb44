//! Column mapping for plain structs.
//!
//! A [`Record`] describes its columns once; the resulting schema is cached per type and used
//! to scan rows into the struct and to build `INSERT`/`UPDATE` statements from it.
//!
//! Precedence: when scanning or updating, a column declared directly on the record wins over
//! the same column reached through an embedded record. When inserting, the first declaration
//! wins. Embedded records never replace a mapping that already exists.

mod mapper;
mod schema;

pub use mapper::{column_names, insert_struct, scan_into, update_struct};
pub use schema::SchemaBuilder;

use crate::types::Value;

pub(crate) use schema::schema_for;

/// A struct whose fields map to columns.
///
/// ```rust
/// use sql_transactor::prelude::*;
///
/// #[derive(Default)]
/// struct Audit {
///     created_by: String,
/// }
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     name: Option<String>,
///     audit: Audit,
/// }
///
/// impl Record for Audit {
///     fn describe(schema: &mut SchemaBuilder<Self>) {
///         schema.column("created_by", |a| &a.created_by, |a| &mut a.created_by);
///     }
/// }
///
/// impl Record for User {
///     fn describe(schema: &mut SchemaBuilder<Self>) {
///         schema
///             .column("id", |u| &u.id, |u| &mut u.id)
///             .column("name", |u| &u.name, |u| &mut u.name)
///             .embed(|u| &u.audit, |u| &mut u.audit);
///     }
/// }
///
/// assert_eq!(column_names::<User>("u."), ["u.id", "u.name", "u.created_by"]);
/// ```
pub trait Record: Send + Sync + Sized + 'static {
    fn describe(schema: &mut SchemaBuilder<Self>);
}

/// Object-safe view of a record used to build statements from mixed record types.
pub trait InsertSource: Send + Sync {
    /// Columns and values, first declaration winning.
    fn insert_values(&self) -> Vec<(String, Value)>;

    /// Columns and values, direct declarations winning over embedded ones.
    fn update_values(&self) -> Vec<(String, Value)>;
}

impl<R: Record> InsertSource for R {
    fn insert_values(&self) -> Vec<(String, Value)> {
        schema_for::<R>().insert.values(self)
    }

    fn update_values(&self) -> Vec<(String, Value)> {
        schema_for::<R>().scan.values(self)
    }
}

/// Implement [`Record`] from a field list.
///
/// ```rust
/// use sql_transactor::impl_record;
///
/// #[derive(Default)]
/// struct Meta {
///     version: i64,
/// }
/// impl_record!(Meta { version => "version" });
///
/// #[derive(Default)]
/// struct Doc {
///     id: i64,
///     body: String,
///     cache: Vec<u8>,
///     meta: Option<Box<Meta>>,
/// }
/// impl_record!(Doc {
///     id => "id",
///     body => "body",
///     skip cache,
///     embed_boxed meta,
/// });
///
/// assert_eq!(sql_transactor::record::column_names::<Doc>(""), ["id", "body", "version"]);
/// ```
#[macro_export]
macro_rules! impl_record {
    (@fields $schema:ident;) => {};
    (@fields $schema:ident; embed $field:ident $(, $($rest:tt)*)?) => {
        $schema.embed(|r| &r.$field, |r| &mut r.$field);
        $crate::impl_record!(@fields $schema; $($($rest)*)?);
    };
    (@fields $schema:ident; embed_boxed $field:ident $(, $($rest:tt)*)?) => {
        $schema.embed_boxed(|r| &r.$field, |r| &mut r.$field);
        $crate::impl_record!(@fields $schema; $($($rest)*)?);
    };
    (@fields $schema:ident; skip $field:ident $(, $($rest:tt)*)?) => {
        $schema.skip(stringify!($field));
        $crate::impl_record!(@fields $schema; $($($rest)*)?);
    };
    (@fields $schema:ident; $field:ident => $column:literal $(, $($rest:tt)*)?) => {
        $schema.column($column, |r| &r.$field, |r| &mut r.$field);
        $crate::impl_record!(@fields $schema; $($($rest)*)?);
    };
    ($record:ident { $($body:tt)* }) => {
        impl $crate::record::Record for $record {
            fn describe(schema: &mut $crate::record::SchemaBuilder<Self>) {
                $crate::impl_record!(@fields schema; $($body)*);
            }
        }
    };
}
