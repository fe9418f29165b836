//! sqlfn is a scalar function registry for [SQLite](https://sqlite.org).
//!
//! Functions are registered under a `(name, arity)` key together with their
//! [`FunctionFlags`](functions::FunctionFlags). A [`FunctionRegistry`] can
//! dispatch calls itself, or bind its contents onto a SQLite [`Connection`]
//! so that SQLite's own dispatcher calls back into them.
//!
//! ```rust
//! use sqlfn::functions::{Arity, FunctionFlags};
//! use sqlfn::types::{ToSqlOutput, Value, ValueRef};
//! use sqlfn::{Connection, FunctionRegistry, Result};
//!
//! fn main() -> Result<()> {
//!     let mut registry = FunctionRegistry::new();
//!     registry.register("add", Arity::Exact(2), FunctionFlags::default(), |ctx| {
//!         Ok(ctx.get::<i64>(0)? + ctx.get::<i64>(1)?)
//!     })?;
//!     registry.register("yo", Arity::Exact(0), FunctionFlags::default(), |_| {
//!         Ok(ToSqlOutput::static_text("yo"))
//!     })?;
//!
//!     let sum = registry.invoke("add", &[ValueRef::Integer(3), ValueRef::Integer(4)])?;
//!     assert_eq!(sum, ToSqlOutput::Owned(Value::Integer(7)));
//!
//!     let db = Connection::open_in_memory()?;
//!     db.bind_registry(&registry)?;
//!     assert_eq!(db.query_value("SELECT yo()")?, Value::Text("yo".to_owned()));
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use libsqlite3_sys as ffi;

use std::ffi::{c_int, CString};
use std::result;

pub use crate::connection::Connection;
pub use crate::error::{to_sqlite_error, Error};
pub use crate::registry::{FunctionKey, FunctionRegistry, SharedRegistry};

#[macro_use]
mod error;

pub mod auto_extension;
pub mod config;
mod connection;
mod context;
pub mod functions;
mod registry;
pub mod trace;
pub mod types;
mod util;

/// A typedef of the result returned by many methods.
pub type Result<T, E = Error> = result::Result<T, E>;

fn str_to_cstring(s: &str) -> Result<CString> {
    Ok(CString::new(s)?)
}

/// Returns `Ok((string ptr, len as c_int, SQLITE_STATIC | SQLITE_TRANSIENT))`
/// normally.
/// The `sqlite3_destructor_type` item is always `SQLITE_TRANSIENT` unless
/// the string was empty (in which case it's `SQLITE_STATIC`, and the ptr is
/// static).
fn str_for_sqlite(s: &[u8]) -> Result<(*const std::ffi::c_char, c_int, ffi::sqlite3_destructor_type)> {
    let len = len_as_c_int(s.len())?;
    let (ptr, dtor_info) = if len != 0 {
        (s.as_ptr().cast(), ffi::SQLITE_TRANSIENT())
    } else {
        // Return a pointer guaranteed to live forever
        ("".as_ptr().cast(), ffi::SQLITE_STATIC())
    };
    Ok((ptr, len, dtor_info))
}

// Helper to cast to c_int safely, returning the correct error type if the cast
// failed.
fn len_as_c_int(len: usize) -> Result<c_int> {
    if len >= (c_int::MAX as usize) {
        Err(err!(ffi::SQLITE_TOOBIG))
    } else {
        Ok(len as c_int)
    }
}
