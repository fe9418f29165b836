//! Marshaling of function results into `sqlite3_result_*` calls.

use std::any::Any;
use std::ffi::{c_int, c_uchar, c_uint, c_void};
use std::sync::Arc;

use crate::ffi;
use crate::ffi::sqlite3_context;
use crate::str_for_sqlite;
use crate::types::{ToSqlOutput, ValueRef};
use crate::util::free_boxed_value;

/// Hand `result` to SQLite.
///
/// `Static` text and blobs are passed with `SQLITE_STATIC` and used in place;
/// everything else is passed with `SQLITE_TRANSIENT` so SQLite copies it
/// before this call returns. A subtype is attached after the inner value is
/// set, and pointers are handed over with a destructor releasing their
/// reference.
pub(super) unsafe fn set_result(ctx: *mut sqlite3_context, result: &ToSqlOutput<'_>) {
    let (value, is_static) = match *result {
        ToSqlOutput::Borrowed(v) => (v, false),
        ToSqlOutput::Owned(ref v) => (ValueRef::from(v), false),
        ToSqlOutput::Static(v) => (v, true),
        ToSqlOutput::Subtyped(subtype, ref inner) => {
            set_result(ctx, inner);
            ffi::sqlite3_result_subtype(ctx, c_uint::from(subtype));
            return;
        }
        ToSqlOutput::Pointer(ref p) => {
            let inner: Arc<dyn Any + Send + Sync> = Arc::clone(p.inner());
            let raw = Box::into_raw(Box::new(inner));
            ffi::sqlite3_result_pointer(
                ctx,
                raw.cast::<c_void>(),
                p.type_name().as_ptr(),
                Some(free_boxed_value::<Arc<dyn Any + Send + Sync>>),
            );
            return;
        }
    };

    match value {
        ValueRef::Null => ffi::sqlite3_result_null(ctx),
        ValueRef::Integer(i) => ffi::sqlite3_result_int64(ctx, i),
        ValueRef::Real(r) => ffi::sqlite3_result_double(ctx, r),
        ValueRef::Text(s) => {
            let length = s.len();
            if length > c_int::MAX as usize {
                ffi::sqlite3_result_error_toobig(ctx);
            } else {
                let (c_str, len, destructor) = match str_for_sqlite(s) {
                    Ok(c_str) => c_str,
                    Err(_) => return ffi::sqlite3_result_error_toobig(ctx),
                };
                let destructor = if is_static {
                    ffi::SQLITE_STATIC()
                } else {
                    destructor
                };
                ffi::sqlite3_result_text64(
                    ctx,
                    c_str,
                    len as ffi::sqlite3_uint64,
                    destructor,
                    ffi::SQLITE_UTF8 as c_uchar,
                );
            }
        }
        ValueRef::Blob(b) => {
            let length = b.len();
            if length > c_int::MAX as usize {
                ffi::sqlite3_result_error_toobig(ctx);
            } else if length == 0 {
                ffi::sqlite3_result_zeroblob(ctx, 0);
            } else {
                let destructor = if is_static {
                    ffi::SQLITE_STATIC()
                } else {
                    ffi::SQLITE_TRANSIENT()
                };
                ffi::sqlite3_result_blob(
                    ctx,
                    b.as_ptr().cast::<c_void>(),
                    length as c_int,
                    destructor,
                );
            }
        }
    }
}
