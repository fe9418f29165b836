//! Automatic extension loading
use std::ffi::{c_char, c_int};
use std::panic::catch_unwind;

use tracing::{debug, warn};

use crate::error::{check, to_sqlite_error};
use crate::{ffi, Connection, Result};

/// Automatic extension initialization routine
pub type AutoExtension = fn(Connection) -> Result<()>;

/// Raw automatic extension initialization routine
pub type RawAutoExtension = unsafe extern "C" fn(
    db: *mut ffi::sqlite3,
    pz_err_msg: *mut *mut c_char,
    _: *const ffi::sqlite3_api_routines,
) -> c_int;

/// Bridge between `RawAutoExtension` and `AutoExtension`
///
/// # Safety
/// * Opening a database from an auto-extension handler will lead to
///   an endless recursion of the auto-handler triggering itself
///   indirectly for each newly-opened database.
/// * Results are undefined if the given db is closed by an auto-extension.
/// * The list of auto-extensions should not be manipulated from an auto-extension.
pub unsafe fn init_auto_extension(
    db: *mut ffi::sqlite3,
    pz_err_msg: *mut *mut c_char,
    ax: AutoExtension,
) -> c_int {
    let r = catch_unwind(|| {
        let c = Connection::from_handle(db);
        c.and_then(ax)
    })
    .unwrap_or_else(|_| {
        warn!("auto extension panicked");
        Err(err!(ffi::SQLITE_ERROR, "Rust panic in auto extension"))
    });
    match r {
        Err(e) => to_sqlite_error(&e, pz_err_msg),
        _ => ffi::SQLITE_OK,
    }
}

/// Register an auto-extension
///
/// # Safety
/// * Opening a database from an auto-extension handler will lead to
///   an endless recursion of the auto-handler triggering itself
///   indirectly for each newly-opened database.
/// * Results are undefined if the given db is closed by an auto-extension.
/// * The list of auto-extensions should not be manipulated from an auto-extension.
pub unsafe fn register_auto_extension(ax: RawAutoExtension) -> Result<()> {
    check(ffi::sqlite3_auto_extension(Some(ax)))?;
    debug!("registered auto extension");
    Ok(())
}

/// Unregister the initialization routine
pub fn cancel_auto_extension(ax: RawAutoExtension) -> bool {
    unsafe { ffi::sqlite3_cancel_auto_extension(Some(ax)) == 1 }
}

/// Disable all automatic extensions previously registered
pub fn reset_auto_extension() {
    unsafe { ffi::sqlite3_reset_auto_extension() }
}

/// Generate an extension entry point named `$entry` that runs `$init` on
/// each connection it is invoked for.
///
/// `$init` is an [`AutoExtension`]: it receives a [`Connection`] that does
/// not own its handle, and any error it returns is reported to SQLite with a
/// message and result code.
///
/// ```rust
/// use sqlfn::auto_extension::{register_auto_extension, reset_auto_extension};
/// use sqlfn::functions::{Arity, FunctionFlags};
/// use sqlfn::types::ToSqlOutput;
/// use sqlfn::{extension_entry_point, Connection, Result};
///
/// fn yo_init(db: Connection) -> Result<()> {
///     db.create_scalar_function("yo", Arity::Exact(0), FunctionFlags::default(), |_| {
///         Ok(ToSqlOutput::static_text("yo"))
///     })
/// }
///
/// extension_entry_point!(sqlite3_yo_init, yo_init);
///
/// fn main() -> Result<()> {
///     unsafe { register_auto_extension(sqlite3_yo_init)? };
///     let db = Connection::open_in_memory()?;
///     assert_eq!(db.query_value("SELECT yo()")?, sqlfn::types::Value::Text("yo".to_owned()));
///     reset_auto_extension();
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! extension_entry_point {
    ($entry:ident, $init:path) => {
        /// Extension entry point, called by SQLite for each new connection.
        ///
        /// # Safety
        ///
        /// SQLite must pass a valid `sqlite3` handle in `db` and either null
        /// or a pointer to a `char*` in `pz_err_msg`.
        #[no_mangle]
        pub unsafe extern "C" fn $entry(
            db: *mut $crate::ffi::sqlite3,
            pz_err_msg: *mut *mut ::std::ffi::c_char,
            _api: *const $crate::ffi::sqlite3_api_routines,
        ) -> ::std::ffi::c_int {
            $crate::auto_extension::init_auto_extension(db, pz_err_msg, $init)
        }
    };
}
