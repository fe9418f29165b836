use std::ffi::{c_char, c_int, CStr, CString};
use std::fmt;
use std::path::Path;
use std::ptr;

use tracing::debug;

use crate::error::{error_from_handle, error_from_sqlite_code, errmsg_to_string};
use crate::ffi;
use crate::types::Value;
use crate::{str_to_cstring, Error, Result};

// libsqlite3-sys 0.36 omits `sqlite3_close_v2` from its generated bindings;
// the symbol is still exported by the linked SQLite library.
extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

/// A connection to a SQLite database, used as the host for bound functions.
///
/// Only what the function layer needs is exposed: opening a database,
/// running SQL, and reading a single value back.
pub struct Connection {
    db: *mut ffi::sqlite3,
    owned: bool,
}

impl Connection {
    /// Open a new connection to a SQLite database. If a database does not
    /// exist at the path, one is created.
    ///
    /// # Failure
    ///
    /// Will return `Err` if `path` cannot be converted to a C-compatible
    /// string, if SQLite runs in single-thread mode, or if the underlying
    /// SQLite open call fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
        let c_path = path_to_cstring(path.as_ref())?;
        Connection::open_with_cstr(&c_path)
    }

    /// Open a new connection to an in-memory SQLite database.
    ///
    /// # Failure
    ///
    /// Will return `Err` if the underlying SQLite open call fails.
    pub fn open_in_memory() -> Result<Connection> {
        Connection::open_with_cstr(c":memory:")
    }

    fn open_with_cstr(c_path: &CStr) -> Result<Connection> {
        ensure_safe_sqlite_threading_mode()?;
        let flags = ffi::SQLITE_OPEN_READWRITE
            | ffi::SQLITE_OPEN_CREATE
            | ffi::SQLITE_OPEN_URI
            | ffi::SQLITE_OPEN_FULLMUTEX;
        unsafe {
            let mut db: *mut ffi::sqlite3 = ptr::null_mut();
            let r = ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null());
            if r != ffi::SQLITE_OK {
                let e = if db.is_null() {
                    error_from_sqlite_code(r, Some(c_path.to_string_lossy().to_string()))
                } else {
                    let e = error_from_handle(db, r);
                    ffi::sqlite3_close(db);
                    e
                };
                return Err(e);
            }
            // Full-mutex connections only lack a mutex when SQLite was configured
            // single-threaded after compilation.
            if ffi::sqlite3_db_mutex(db).is_null() {
                ffi::sqlite3_close(db);
                return Err(Error::SqliteSingleThreadedMode);
            }
            ffi::sqlite3_extended_result_codes(db, 1);
            debug!(path = %c_path.to_string_lossy(), "opened connection");
            Ok(Connection { db, owned: true })
        }
    }

    /// Create a `Connection` from a raw handle.
    ///
    /// The returned connection does not close the handle when dropped; this
    /// is how extension entry points receive the database they initialize.
    ///
    /// # Safety
    ///
    /// This function is unsafe because improper use may impact the Connection.
    /// In particular, it is the caller's responsibility to ensure that the
    /// handle outlives the returned `Connection`.
    pub unsafe fn from_handle(db: *mut ffi::sqlite3) -> Result<Connection> {
        if db.is_null() {
            return Err(error_from_sqlite_code(
                ffi::SQLITE_MISUSE,
                Some("Invalid database handle (null)".to_owned()),
            ));
        }
        Ok(Connection { db, owned: false })
    }

    /// Get access to the underlying SQLite database connection handle.
    ///
    /// # Warning
    ///
    /// You should not need to use this function. If you do need to, please
    /// [open an issue on the project repository](https://github.com/sqlfn/sqlfn/issues) and describe
    /// your use case.
    ///
    /// # Safety
    ///
    /// This function is unsafe because it gives you raw access
    /// to the SQLite connection, and what you do with it could impact the
    /// safety of this `Connection`.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> *mut ffi::sqlite3 {
        self.db
    }

    /// Convenience method to run multiple SQL statements (that cannot take any
    /// parameters).
    ///
    /// # Failure
    ///
    /// Will return `Err` if `sql` cannot be converted to a C-compatible string
    /// or if the underlying SQLite call fails.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let c_sql = str_to_cstring(sql)?;
        unsafe {
            let mut errmsg: *mut c_char = ptr::null_mut();
            let r = ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg);
            if r == ffi::SQLITE_OK {
                return Ok(());
            }
            let message = if errmsg.is_null() {
                None
            } else {
                let message = errmsg_to_string(errmsg);
                ffi::sqlite3_free(errmsg.cast());
                Some(message)
            };
            Err(error_from_sqlite_code(r, message))
        }
    }

    /// Run a single statement and return the first column of its first row.
    ///
    /// # Failure
    ///
    /// Will return `Err` if the statement fails to prepare or step, if it
    /// returns no rows ([`Error::QueryReturnedNoRows`]) or if it returns no
    /// columns ([`Error::InvalidColumnIndex`]).
    pub fn query_value(&self, sql: &str) -> Result<Value> {
        let c_sql = str_to_cstring(sql)?;
        let stmt = unsafe {
            let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
            let r = ffi::sqlite3_prepare_v2(self.db, c_sql.as_ptr(), -1, &mut stmt, ptr::null_mut());
            self.decode_result(r)?;
            RawStatement(stmt)
        };
        if stmt.0.is_null() {
            // empty or comment-only SQL
            return Err(Error::QueryReturnedNoRows);
        }
        unsafe {
            if ffi::sqlite3_column_count(stmt.0) < 1 {
                return Err(Error::InvalidColumnIndex(0));
            }
            match ffi::sqlite3_step(stmt.0) {
                ffi::SQLITE_ROW => Ok(column_value(stmt.0, 0)),
                ffi::SQLITE_DONE => Err(Error::QueryReturnedNoRows),
                r => Err(error_from_handle(self.db, r)),
            }
        }
    }

    /// Close the SQLite connection.
    ///
    /// This is functionally equivalent to the `Drop` implementation for
    /// `Connection` except that on failure, it returns the error.
    ///
    /// # Failure
    ///
    /// Will return `Err` if the underlying SQLite call fails.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if !self.owned || self.db.is_null() {
            return Ok(());
        }
        let r = unsafe { ffi::sqlite3_close(self.db) };
        self.decode_result(r)?;
        self.db = ptr::null_mut();
        Ok(())
    }

    #[inline]
    pub(crate) fn decode_result(&self, code: c_int) -> Result<()> {
        if code == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(unsafe { error_from_handle(self.db, code) })
        }
    }
}

impl Drop for Connection {
    #[inline]
    fn drop(&mut self) {
        if self.owned && !self.db.is_null() {
            // close_v2 defers the close until outstanding statements finish
            unsafe { sqlite3_close_v2(self.db) };
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.db)
            .field("owned", &self.owned)
            .finish()
    }
}

struct RawStatement(*mut ffi::sqlite3_stmt);

impl Drop for RawStatement {
    fn drop(&mut self) {
        unsafe { ffi::sqlite3_finalize(self.0) };
    }
}

unsafe fn column_value(stmt: *mut ffi::sqlite3_stmt, col: c_int) -> Value {
    match ffi::sqlite3_column_type(stmt, col) {
        ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(stmt, col)),
        ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_column_double(stmt, col)),
        ffi::SQLITE_TEXT => {
            let text = ffi::sqlite3_column_text(stmt, col);
            let len = ffi::sqlite3_column_bytes(stmt, col);
            if text.is_null() || len <= 0 {
                Value::Text(String::new())
            } else {
                let s = std::slice::from_raw_parts(text.cast::<u8>(), len as usize);
                Value::Text(String::from_utf8_lossy(s).into_owned())
            }
        }
        ffi::SQLITE_BLOB => {
            let blob = ffi::sqlite3_column_blob(stmt, col);
            let len = ffi::sqlite3_column_bytes(stmt, col);
            if blob.is_null() || len <= 0 {
                Value::Blob(Vec::new())
            } else {
                Value::Blob(std::slice::from_raw_parts(blob.cast::<u8>(), len as usize).to_vec())
            }
        }
        _ => Value::Null,
    }
}

fn ensure_safe_sqlite_threading_mode() -> Result<()> {
    // Compiled with SQLITE_THREADSAFE=0: no mutexes exist at all.
    if unsafe { ffi::sqlite3_threadsafe() } == 0 {
        Err(Error::SqliteSingleThreadedMode)
    } else {
        Ok(())
    }
}

#[cfg(unix)]
fn path_to_cstring(p: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    Ok(CString::new(p.as_os_str().as_bytes())?)
}

#[cfg(not(unix))]
fn path_to_cstring(p: &Path) -> Result<CString> {
    let s = p.to_str().ok_or_else(|| Error::InvalidPath(p.to_owned()))?;
    Ok(CString::new(s)?)
}
