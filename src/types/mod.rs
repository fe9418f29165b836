//! Traits dealing with SQLite data types.
//!
//! Arguments reach a function as [`ValueRef`]s borrowed from the host for the
//! duration of the call. A function hands its result back as a
//! [`ToSqlOutput`], whose variant records who owns the result's memory:
//!
//! * [`ToSqlOutput::Static`] data lives for the whole program, so SQLite is
//!   told `SQLITE_STATIC` and uses it in place.
//! * [`ToSqlOutput::Borrowed`] and [`ToSqlOutput::Owned`] data is released
//!   once the call returns, so SQLite is told `SQLITE_TRANSIENT` and takes a
//!   copy first.
//!
//! Only `'static` data can be tagged static, so a result that is about to be
//! freed can never be handed to SQLite without a copy.
//!
//! A result may also carry a subtype ([`ToSqlOutput::with_subtype`]); JSON
//! values are tagged with [`JSON_SUBTYPE`] so that SQLite's JSON functions
//! embed them as JSON rather than as strings.

pub use self::from_sql::{FromSql, FromSqlError, FromSqlResult};
pub use self::to_sql::{PointerValue, ToSql, ToSqlOutput};
pub use self::value::Value;
pub use self::value_ref::ValueRef;

use std::fmt;

mod from_sql;
#[cfg(feature = "serde_json")]
mod serde_json;
mod to_sql;
mod value;
mod value_ref;

/// Subtype SQLite's JSON functions give to (and look for on) JSON text.
pub const JSON_SUBTYPE: u8 = b'J';

/// Empty struct that can be used to fill in a function result as `NULL`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Null;

/// SQLite data types.
/// See [Fundamental Datatypes](https://sqlite.org/c3ref/c_blob.html).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    /// NULL
    Null,
    /// 64-bit signed integer
    Integer,
    /// 64-bit IEEE floating point number
    Real,
    /// String
    Text,
    /// BLOB
    Blob,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Type::Null => f.pad("Null"),
            Type::Integer => f.pad("Integer"),
            Type::Real => f.pad("Real"),
            Type::Text => f.pad("Text"),
            Type::Blob => f.pad("Blob"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Type;

    #[test]
    fn test_display() {
        assert_eq!(Type::Null.to_string(), "Null");
        assert_eq!(Type::Integer.to_string(), "Integer");
        assert_eq!(Type::Real.to_string(), "Real");
        assert_eq!(Type::Text.to_string(), "Text");
        assert_eq!(Type::Blob.to_string(), "Blob");
    }
}
