//! Routing of SQLite's error log.
//!
//! SQLite reports errors, warnings and notices through a process-wide log
//! callback installed with `SQLITE_CONFIG_LOG`. This includes the messages
//! raised by functions bound through this crate.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::mem;
use std::panic::catch_unwind;
use std::ptr;

use tracing::{debug, error, info, warn};

use crate::error::error_from_sqlite_code;
use crate::ffi;
use crate::Result;

/// Set up the process-wide SQLite error logging callback.
///
/// # Safety
///
/// This function is marked unsafe for two reasons:
///
/// * The function is not threadsafe. No other SQLite calls may be made while
///   `config_log` is running, and multiple threads may not call `config_log`
///   simultaneously.
/// * The provided `callback` itself function has two requirements:
///     * It must not invoke any SQLite calls.
///     * It must be threadsafe if SQLite is used in a multithreaded way.
///
/// cf [The Error And Warning Log](http://sqlite.org/errlog.html).
///
/// # Failure
///
/// Will return Err with `SQLITE_MISUSE` once SQLite has been initialized,
/// which happens when the first connection is opened.
pub unsafe fn config_log(callback: Option<fn(c_int, &str)>) -> Result<()> {
    extern "C" fn log_callback(p_arg: *mut c_void, err: c_int, msg: *const c_char) {
        let c_slice = unsafe { CStr::from_ptr(msg).to_bytes() };
        let callback: fn(c_int, &str) = unsafe { mem::transmute(p_arg) };

        let s = String::from_utf8_lossy(c_slice);
        drop(catch_unwind(|| callback(err, &s)));
    }

    let rc = if let Some(f) = callback {
        ffi::sqlite3_config(
            ffi::SQLITE_CONFIG_LOG,
            log_callback as extern "C" fn(_, _, _),
            f as *mut c_void,
        )
    } else {
        let nullptr: *mut c_void = ptr::null_mut();
        ffi::sqlite3_config(ffi::SQLITE_CONFIG_LOG, nullptr, nullptr)
    };

    if rc == ffi::SQLITE_OK {
        Ok(())
    } else {
        Err(error_from_sqlite_code(rc, None))
    }
}

/// Send SQLite's log to `tracing`, at a level derived from the result code:
/// `SQLITE_NOTICE` as info, `SQLITE_WARNING` as warn, other failures as
/// error.
///
/// # Safety
///
/// Same requirements as [`config_log`].
///
/// # Failure
///
/// As [`config_log`].
pub unsafe fn route_log_to_tracing() -> Result<()> {
    config_log(Some(log_to_tracing))
}

fn log_to_tracing(code: c_int, msg: &str) {
    match code & 0xff {
        ffi::SQLITE_OK => debug!(target: "sqlite", code, "{msg}"),
        ffi::SQLITE_NOTICE => info!(target: "sqlite", code, "{msg}"),
        ffi::SQLITE_WARNING => warn!(target: "sqlite", code, "{msg}"),
        _ => error!(target: "sqlite", code, "{msg}"),
    }
}

/// Write a message into the error log established by
/// `config_log`.
#[inline]
pub fn log(err_code: c_int, msg: &str) {
    let msg = match CString::new(msg) {
        Ok(msg) => msg,
        Err(e) => {
            let pos = e.nul_position();
            let mut bytes = e.into_vec();
            bytes.truncate(pos);
            // no interior NUL remains before `pos`
            CString::new(bytes).unwrap_or_default()
        }
    };
    unsafe {
        ffi::sqlite3_log(err_code, c"%s".as_ptr(), msg.as_ptr());
    }
}
