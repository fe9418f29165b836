use crate::functions::Arity;
use crate::types::{FromSqlError, Type};
use crate::{ffi, util};
use std::error;
use std::ffi::{c_char, c_int, CStr, NulError};
use std::fmt;
use std::path::PathBuf;
use std::str;

/// Enum listing possible errors from sqlfn.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An error from an underlying SQLite call.
    SqliteFailure(ffi::Error, Option<String>),

    /// Error reported when attempting to open a connection when SQLite was
    /// configured to allow single-threaded use only.
    SqliteSingleThreadedMode,

    /// No function with this name is registered, for any arity.
    UnknownFunction(String),

    /// A function with the same name and arity is already registered and the
    /// registry refuses to overwrite it.
    DuplicateRegistration(String, Arity),

    /// Functions with this name exist, but none of them accepts `given`
    /// arguments.
    ArityMismatch {
        /// Function name, as passed to the lookup
        name: String,
        /// Number of arguments supplied
        given: usize,
    },

    /// Error when the value of a particular argument is requested, but the
    /// type of the argument cannot be converted to the requested Rust type.
    InvalidArgumentType(usize, Type),

    /// A function asked for an argument past the end of its argument list.
    InvalidArgumentIndex(usize),

    /// Function names must be non-empty, NUL-free and at most 255 bytes.
    InvalidFunctionName(String),

    /// Arity is neither variadic nor within `0..=127`.
    InvalidArity(i64),

    /// Error when the value of an integral argument cannot be represented
    /// by the requested Rust integer type.
    IntegralValueOutOfRange(usize, i64),

    /// Error converting an argument to the requested Rust type.
    FromSqlConversionFailure(usize, Type, Box<dyn error::Error + Send + Sync + 'static>),

    /// Error converting a Rust value into a function result.
    ToSqlConversionFailure(Box<dyn error::Error + Send + Sync + 'static>),

    /// Error converting a text argument to a Rust string.
    Utf8Error(usize, str::Utf8Error),

    /// Error converting a Rust string to a C string because it contained an
    /// embedded nul.
    NulError(NulError),

    /// An error raised from inside a user-supplied function.
    UserFunctionError(Box<dyn error::Error + Send + Sync + 'static>),

    /// Error when a query that was expected to return at least one row
    /// returned none.
    QueryReturnedNoRows,

    /// Error returned by [`Context::get_aux`](crate::functions::Context::get_aux)
    /// when the cached auxiliary data is not of the requested type.
    GetAuxWrongType,

    /// Error when a query has no column at the requested index.
    InvalidColumnIndex(usize),

    /// Error when the path to a database cannot be converted to a C string.
    InvalidPath(PathBuf),
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Self::SqliteFailure(e1, s1), Self::SqliteFailure(e2, s2)) => e1 == e2 && s1 == s2,
            (Self::SqliteSingleThreadedMode, Self::SqliteSingleThreadedMode) => true,
            (Self::UnknownFunction(n1), Self::UnknownFunction(n2)) => n1 == n2,
            (Self::DuplicateRegistration(n1, a1), Self::DuplicateRegistration(n2, a2)) => {
                n1 == n2 && a1 == a2
            }
            (
                Self::ArityMismatch { name: n1, given: g1 },
                Self::ArityMismatch { name: n2, given: g2 },
            ) => n1 == n2 && g1 == g2,
            (Self::InvalidArgumentType(i1, t1), Self::InvalidArgumentType(i2, t2)) => {
                i1 == i2 && t1 == t2
            }
            (Self::InvalidArgumentIndex(i1), Self::InvalidArgumentIndex(i2)) => i1 == i2,
            (Self::InvalidFunctionName(n1), Self::InvalidFunctionName(n2)) => n1 == n2,
            (Self::InvalidArity(a1), Self::InvalidArity(a2)) => a1 == a2,
            (Self::IntegralValueOutOfRange(i1, n1), Self::IntegralValueOutOfRange(i2, n2)) => {
                i1 == i2 && n1 == n2
            }
            (Self::Utf8Error(i1, e1), Self::Utf8Error(i2, e2)) => i1 == i2 && e1 == e2,
            (Self::NulError(e1), Self::NulError(e2)) => e1 == e2,
            (Self::QueryReturnedNoRows, Self::QueryReturnedNoRows) => true,
            (Self::GetAuxWrongType, Self::GetAuxWrongType) => true,
            (Self::InvalidColumnIndex(i1), Self::InvalidColumnIndex(i2)) => i1 == i2,
            (Self::InvalidPath(p1), Self::InvalidPath(p2)) => p1 == p2,
            (..) => false,
        }
    }
}

impl From<NulError> for Error {
    #[cold]
    fn from(err: NulError) -> Error {
        Error::NulError(err)
    }
}

impl Error {
    /// Map a [`FromSqlError`] raised while reading argument `idx` of type
    /// `ty` onto the matching error variant.
    #[cold]
    pub(crate) fn from_argument(idx: usize, ty: Type, err: FromSqlError) -> Error {
        match err {
            FromSqlError::InvalidType => Error::InvalidArgumentType(idx, ty),
            FromSqlError::OutOfRange(i) => Error::IntegralValueOutOfRange(idx, i),
            FromSqlError::Utf8Error(e) => Error::Utf8Error(idx, e),
            FromSqlError::Other(err) => Error::FromSqlConversionFailure(idx, ty, err),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::SqliteFailure(ref err, None) => err.fmt(f),
            Error::SqliteFailure(_, Some(ref s)) => write!(f, "{s}"),
            Error::SqliteSingleThreadedMode => write!(
                f,
                "SQLite was compiled or configured for single-threaded use only"
            ),
            Error::UnknownFunction(ref name) => write!(f, "no such function: {name}"),
            Error::DuplicateRegistration(ref name, arity) => {
                write!(f, "function {name} with {arity} is already registered")
            }
            Error::ArityMismatch { ref name, given } => {
                write!(f, "wrong number of arguments to function {name}(): {given}")
            }
            Error::InvalidArgumentType(i, ref t) => {
                write!(f, "Invalid function argument type {t} at index {i}")
            }
            Error::InvalidArgumentIndex(i) => write!(f, "Invalid function argument index: {i}"),
            Error::InvalidFunctionName(ref name) => write!(f, "Invalid function name: {name:?}"),
            Error::InvalidArity(n) => write!(f, "Invalid function arity: {n}"),
            Error::IntegralValueOutOfRange(i, val) => {
                write!(f, "Integer {val} out of range at index {i}")
            }
            Error::FromSqlConversionFailure(i, ref t, ref err) => {
                write!(f, "Conversion error from type {t} at index {i}: {err}")
            }
            Error::ToSqlConversionFailure(ref err) => err.fmt(f),
            Error::Utf8Error(i, ref err) => write!(f, "Invalid UTF-8 at index {i}: {err}"),
            Error::NulError(ref err) => err.fmt(f),
            Error::UserFunctionError(ref err) => err.fmt(f),
            Error::QueryReturnedNoRows => write!(f, "Query returned no rows"),
            Error::GetAuxWrongType => write!(f, "get_aux called with wrong type"),
            Error::InvalidColumnIndex(i) => write!(f, "Invalid column index: {i}"),
            Error::InvalidPath(ref p) => write!(f, "Invalid path: {}", p.to_string_lossy()),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::SqliteFailure(ref err, _) => Some(err),
            Error::Utf8Error(_, ref err) => Some(err),
            Error::NulError(ref err) => Some(err),
            Error::FromSqlConversionFailure(_, _, ref err)
            | Error::ToSqlConversionFailure(ref err)
            | Error::UserFunctionError(ref err) => Some(&**err),
            _ => None,
        }
    }
}

impl Error {
    /// Returns the underlying SQLite error if this is [`Error::SqliteFailure`].
    #[inline]
    #[must_use]
    pub fn sqlite_error(&self) -> Option<&ffi::Error> {
        match self {
            Self::SqliteFailure(error, _) => Some(error),
            _ => None,
        }
    }

    /// Returns the underlying SQLite error code if this is
    /// [`Error::SqliteFailure`].
    #[inline]
    #[must_use]
    pub fn sqlite_error_code(&self) -> Option<ffi::ErrorCode> {
        self.sqlite_error().map(|error| error.code)
    }

    /// The result code reported to SQLite when this error escapes a bound
    /// function or an extension entry point.
    #[must_use]
    pub fn result_code(&self) -> c_int {
        match self {
            Self::SqliteFailure(err, _) => err.extended_code,
            Self::InvalidArgumentType(..) | Self::IntegralValueOutOfRange(..) => {
                ffi::SQLITE_MISMATCH
            }
            Self::InvalidArgumentIndex(_) | Self::InvalidColumnIndex(_) => ffi::SQLITE_RANGE,
            Self::NulError(_) | Self::InvalidFunctionName(_) | Self::InvalidArity(_) => {
                ffi::SQLITE_MISUSE
            }
            _ => ffi::SQLITE_ERROR,
        }
    }
}

// These are public but not re-exported by lib.rs, so only visible within crate.

#[cold]
pub fn error_from_sqlite_code(code: c_int, message: Option<String>) -> Error {
    Error::SqliteFailure(ffi::Error::new(code), message)
}

macro_rules! err {
    ($code:expr $(,)?) => {
        $crate::error::error_from_sqlite_code($code, None)
    };
    ($code:expr, $msg:literal $(,)?) => {
        $crate::error::error_from_sqlite_code($code, Some(format!($msg)))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::error::error_from_sqlite_code($code, Some(format!($fmt, $($arg)*)))
    };
}

#[cold]
pub unsafe fn error_from_handle(db: *mut ffi::sqlite3, code: c_int) -> Error {
    let message = if db.is_null() {
        None
    } else {
        Some(errmsg_to_string(ffi::sqlite3_errmsg(db)))
    };
    error_from_sqlite_code(code, message)
}

pub unsafe fn errmsg_to_string(errmsg: *const c_char) -> String {
    CStr::from_ptr(errmsg).to_string_lossy().into_owned()
}

pub fn check(code: c_int) -> crate::Result<()> {
    if code != ffi::SQLITE_OK {
        Err(error_from_sqlite_code(code, None))
    } else {
        Ok(())
    }
}

/// Transform Rust error to SQLite error (message and code).
/// # Safety
/// This function is unsafe because it uses raw pointer
pub unsafe fn to_sqlite_error(e: &Error, err_msg: *mut *mut c_char) -> c_int {
    let message = match e {
        Error::SqliteFailure(_, s) => s.clone(),
        err => Some(err.to_string()),
    };
    if let Some(s) = message {
        if !err_msg.is_null() {
            *err_msg = util::alloc(&s);
        }
    }
    e.result_code()
}
