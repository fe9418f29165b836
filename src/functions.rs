//! Create or redefine SQL scalar functions.
//!
//! # Example
//!
//! Adding a `regexp` function to a connection, caching the compiled pattern
//! as auxiliary data of its first argument:
//!
//! ```rust
//! use regex::Regex;
//! use sqlfn::functions::{Arity, FunctionFlags};
//! use sqlfn::{Connection, Result};
//! use std::sync::Arc;
//!
//! type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
//!
//! fn add_regexp_function(db: &Connection) -> Result<()> {
//!     db.create_scalar_function(
//!         "regexp",
//!         Arity::Exact(2),
//!         FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
//!         move |ctx| {
//!             assert_eq!(ctx.len(), 2, "called with unexpected number of arguments");
//!             let regexp: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
//!                 Ok(Regex::new(vr.as_str()?)?)
//!             })?;
//!             let is_match = {
//!                 let text = ctx.get_str(1)?;
//!                 regexp.is_match(text)
//!             };
//!             Ok(is_match)
//!         },
//!     )
//! }
//!
//! fn main() -> Result<()> {
//!     let db = Connection::open_in_memory()?;
//!     add_regexp_function(&db)?;
//!     let is_match = db.query_value("SELECT regexp('[aeiou]*', 'aaaaeeeiii')")?;
//!     assert_eq!(is_match, sqlfn::types::Value::Integer(1));
//!     Ok(())
//! }
//! ```
use std::any::Any;
use std::ffi::{c_int, CStr};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::slice;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::context::set_result;
use crate::ffi;
use crate::registry::FunctionKey;
use crate::types::{FromSql, ToSql, ToSqlOutput, ValueRef};
use crate::util::{free_arc, free_boxed_value};
use crate::{str_to_cstring, Connection, Error, Result};

/// Largest fixed arity SQLite accepts (`SQLITE_MAX_FUNCTION_ARG`).
pub const MAX_FUNCTION_ARG: u8 = 127;

/// Longest function name, in bytes, SQLite accepts.
pub const MAX_FUNCTION_NAME_LEN: usize = 255;

// Arguments are collected on the stack up to this count.
const INLINE_ARGS: usize = 8;

bitflags::bitflags! {
    /// Function Flags.
    /// See [sqlite3_create_function](https://sqlite.org/c3ref/create_function.html)
    /// and [Function Flags](https://sqlite.org/c3ref/c_deterministic.html) for details.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[repr(C)]
    pub struct FunctionFlags: c_int {
        /// Specifies UTF-8 as the text encoding this SQL function prefers for its parameters.
        const SQLITE_UTF8     = ffi::SQLITE_UTF8;
        /// Means that the function always gives the same output when the input parameters are the same.
        const SQLITE_DETERMINISTIC = ffi::SQLITE_DETERMINISTIC; // 3.8.3
        /// Means that the function may only be invoked from top-level SQL.
        const SQLITE_DIRECTONLY    = 0x0000_0008_0000; // 3.30.0
        /// Indicates to SQLite that a function may call `sqlite3_value_subtype()` to inspect the subtypes of its arguments.
        const SQLITE_SUBTYPE       = 0x0000_0010_0000; // 3.30.0
        /// Means that the function is unlikely to cause problems even if misused.
        const SQLITE_INNOCUOUS     = 0x0000_0020_0000; // 3.31.0
        /// Indicates to SQLite that a function might call `sqlite3_result_subtype()` to cause a subtype to be associated with its result.
        const SQLITE_RESULT_SUBTYPE = 0x0000_0100_0000; // 3.45.0
    }
}

impl Default for FunctionFlags {
    #[inline]
    fn default() -> FunctionFlags {
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC
    }
}

/// Number of arguments a function accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Exactly this many arguments, at most [`MAX_FUNCTION_ARG`].
    Exact(u8),
    /// Any number of arguments.
    Variadic,
}

impl Arity {
    /// The `nArg` value passed to `sqlite3_create_function_v2`.
    #[inline]
    #[must_use]
    pub fn as_c_int(self) -> c_int {
        match self {
            Arity::Exact(n) => c_int::from(n),
            Arity::Variadic => -1,
        }
    }

    /// Whether a call with `n_args` arguments matches this arity.
    #[inline]
    #[must_use]
    pub fn accepts(self, n_args: usize) -> bool {
        match self {
            Arity::Exact(n) => usize::from(n) == n_args,
            Arity::Variadic => true,
        }
    }

    fn validate(self) -> Result<Self> {
        match self {
            Arity::Exact(n) if n > MAX_FUNCTION_ARG => Err(Error::InvalidArity(i64::from(n))),
            _ => Ok(self),
        }
    }
}

impl TryFrom<c_int> for Arity {
    type Error = Error;

    /// `-1` is variadic, `0..=127` is exact, anything else is rejected.
    fn try_from(n_arg: c_int) -> Result<Arity> {
        match n_arg {
            -1 => Ok(Arity::Variadic),
            n => u8::try_from(n)
                .map_err(|_| Error::InvalidArity(i64::from(n)))
                .and_then(|n| Arity::Exact(n).validate()),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Arity::Exact(1) => f.write_str("1 argument"),
            Arity::Exact(n) => write!(f, "{n} arguments"),
            Arity::Variadic => f.write_str("any number of arguments"),
        }
    }
}

/// Context is a wrapper for the SQLite function
/// evaluation context.
///
/// Arguments are borrowed from the caller for the duration of the call and
/// cannot be kept past it. When the call comes from SQLite, the context also
/// gives access to argument subtypes, pointer arguments and auxiliary data;
/// for calls made directly through a registry these read as absent.
pub struct Context<'a> {
    name: &'a str,
    args: &'a [ValueRef<'a>],
    host: Option<Host<'a>>,
}

#[derive(Clone, Copy)]
struct Host<'a> {
    ctx: *mut ffi::sqlite3_context,
    argv: &'a [*mut ffi::sqlite3_value],
}

type AuxInner = Arc<dyn Any + Send + Sync + 'static>;

impl<'a> Context<'a> {
    /// Name the function was registered under.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns the number of arguments to the function.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` when there is no argument.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Returns the `idx`th argument as a `T`.
    ///
    /// # Failure
    ///
    /// Will return Err if `idx` is out of range or if the underlying SQLite
    /// type cannot be converted to a `T`.
    pub fn get<T: FromSql>(&self, idx: usize) -> Result<T> {
        let arg = self.get_ref(idx)?;
        FromSql::from_sql(arg).map_err(|err| Error::from_argument(idx, arg.data_type(), err))
    }

    /// Returns the `idx`th argument as text, borrowed for the duration of the
    /// call.
    ///
    /// # Failure
    ///
    /// Will return [`Error::InvalidArgumentType`] if the argument is not
    /// text (`NULL` included) and [`Error::Utf8Error`] if it is not valid
    /// UTF-8.
    pub fn get_str(&self, idx: usize) -> Result<&'a str> {
        let arg = self.get_ref(idx)?;
        arg.as_str()
            .map_err(|err| Error::from_argument(idx, arg.data_type(), err))
    }

    /// Returns the `idx`th argument as a blob, borrowed for the duration of
    /// the call.
    ///
    /// # Failure
    ///
    /// Will return [`Error::InvalidArgumentType`] if the argument is not a
    /// blob.
    pub fn get_blob(&self, idx: usize) -> Result<&'a [u8]> {
        let arg = self.get_ref(idx)?;
        arg.as_blob()
            .map_err(|err| Error::from_argument(idx, arg.data_type(), err))
    }

    /// Returns the `idx`th argument as a `ValueRef`, borrowed for the
    /// duration of the call.
    ///
    /// # Failure
    ///
    /// Will return Err if `idx` is out of range.
    #[inline]
    pub fn get_ref(&self, idx: usize) -> Result<ValueRef<'a>> {
        self.args
            .get(idx)
            .copied()
            .ok_or(Error::InvalidArgumentIndex(idx))
    }

    /// All arguments, in call order.
    #[inline]
    #[must_use]
    pub fn args(&self) -> &[ValueRef<'a>] {
        self.args
    }

    /// Returns the subtype of the `idx`th argument, `0` when it has none.
    ///
    /// Functions reading subtypes should be registered with
    /// [`FunctionFlags::SQLITE_SUBTYPE`].
    ///
    /// # Failure
    ///
    /// Will return Err if `idx` is out of range.
    pub fn get_subtype(&self, idx: usize) -> Result<u8> {
        self.get_ref(idx)?;
        Ok(match self.host {
            // only the lower 8 bits are preserved
            Some(host) => unsafe { ffi::sqlite3_value_subtype(host.argv[idx]) as u8 },
            None => 0,
        })
    }

    /// Returns the object passed as the `idx`th argument by another function
    /// through [`ToSqlOutput::pointer`], if it was passed under `type_name`
    /// and is a `T`.
    ///
    /// # Failure
    ///
    /// Will return Err if `idx` is out of range.
    pub fn get_pointer<T: Any + Send + Sync>(
        &self,
        idx: usize,
        type_name: &'static CStr,
    ) -> Result<Option<&'a T>> {
        self.get_ref(idx)?;
        let Some(host) = self.host else {
            return Ok(None);
        };
        let p = unsafe { ffi::sqlite3_value_pointer(host.argv[idx], type_name.as_ptr()) }
            .cast::<AuxInner>()
            .cast_const();
        if p.is_null() {
            return Ok(None);
        }
        // the argument keeps the object alive until the call returns
        let inner: &'a AuxInner = unsafe { &*p };
        Ok(inner.downcast_ref::<T>())
    }

    /// Fetch or insert the auxiliary data associated with a particular
    /// parameter. This is intended to be an easier-to-use way of fetching it
    /// compared to calling [`get_aux`](Context::get_aux) and
    /// [`set_aux`](Context::set_aux) separately.
    ///
    /// See `https://www.sqlite.org/c3ref/get_auxdata.html` for a discussion of
    /// this feature, or the module documentation for an example.
    ///
    /// # Failure
    ///
    /// Will return Err if `idx` is out of range, if cached data of another
    /// type is found, or if `func` fails.
    pub fn get_or_create_aux<T, E, F>(&self, idx: usize, func: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
        F: FnOnce(ValueRef<'_>) -> Result<T, E>,
    {
        if let Some(v) = self.get_aux(idx)? {
            Ok(v)
        } else {
            let vr = self.get_ref(idx)?;
            self.set_aux(
                idx,
                func(vr).map_err(|e| Error::UserFunctionError(e.into()))?,
            )
        }
    }

    /// Sets the auxiliary data associated with a particular parameter. See
    /// `https://www.sqlite.org/c3ref/get_auxdata.html` for a discussion of
    /// this feature, or the module documentation for an example.
    ///
    /// SQLite may drop the data at any time, and keeps none for calls made
    /// directly through a registry.
    ///
    /// # Failure
    ///
    /// Will return Err if `idx` is out of range.
    pub fn set_aux<T: Send + Sync + 'static>(&self, idx: usize, value: T) -> Result<Arc<T>> {
        self.get_ref(idx)?;
        let orig: Arc<T> = Arc::new(value);
        if let Some(host) = self.host {
            let inner: AuxInner = orig.clone();
            let raw: *mut AuxInner = Box::into_raw(Box::new(inner));
            unsafe {
                ffi::sqlite3_set_auxdata(
                    host.ctx,
                    idx as c_int,
                    raw.cast(),
                    Some(free_boxed_value::<AuxInner>),
                );
            }
        }
        Ok(orig)
    }

    /// Gets the auxiliary data that was associated with a given parameter via
    /// [`set_aux`](Context::set_aux). Returns `Ok(None)` if no data has been
    /// associated, and [`Err(Error::GetAuxWrongType)`](Error::GetAuxWrongType)
    /// if the type of the data does not match `T`.
    ///
    /// # Failure
    ///
    /// Will return Err if `idx` is out of range or the type does not match.
    pub fn get_aux<T: Send + Sync + 'static>(&self, idx: usize) -> Result<Option<Arc<T>>> {
        self.get_ref(idx)?;
        let Some(host) = self.host else {
            return Ok(None);
        };
        let p = unsafe { ffi::sqlite3_get_auxdata(host.ctx, idx as c_int) }
            .cast::<AuxInner>()
            .cast_const();
        if p.is_null() {
            Ok(None)
        } else {
            let v: AuxInner = AuxInner::clone(unsafe { &*p });
            v.downcast::<T>()
                .map(Some)
                .map_err(|_| Error::GetAuxWrongType)
        }
    }
}

/// A function's return value, converted into an ownership-tagged result.
///
/// Implemented for everything that implements [`ToSql`]: values the function
/// returns by value are dropped right after the call, so anything borrowed
/// from them is copied, while [`ToSqlOutput::Static`] results are passed on
/// untouched.
pub trait SqlFnOutput {
    /// Detach the result from the return value that produced it.
    fn into_output(self) -> Result<ToSqlOutput<'static>>;
}

impl<T: ToSql> SqlFnOutput for T {
    #[inline]
    fn into_output(self) -> Result<ToSqlOutput<'static>> {
        Ok(self.to_sql()?.into_static())
    }
}

type BoxedFn = Box<dyn Fn(&Context<'_>) -> Result<ToSqlOutput<'static>> + Send + Sync + 'static>;

/// A named scalar function: name, arity, flags and the callable itself.
///
/// Descriptors are immutable once built. Registries and SQLite connections
/// share them through [`Arc`].
pub struct ScalarFunction {
    name: String,
    arity: Arity,
    flags: FunctionFlags,
    func: BoxedFn,
}

impl ScalarFunction {
    /// Build a descriptor.
    ///
    /// `SQLITE_UTF8` is always added to `flags`: arguments are handed to `f`
    /// as UTF-8.
    ///
    /// # Failure
    ///
    /// Will return Err if `name` is empty, longer than 255 bytes or contains
    /// a NUL, or if `arity` exceeds [`MAX_FUNCTION_ARG`].
    pub fn new<F, T>(name: &str, arity: Arity, flags: FunctionFlags, f: F) -> Result<ScalarFunction>
    where
        F: Fn(&Context<'_>) -> Result<T> + Send + Sync + 'static,
        T: SqlFnOutput,
    {
        validate_name(name)?;
        let arity = arity.validate()?;
        Ok(ScalarFunction {
            name: name.to_owned(),
            arity,
            flags: flags | FunctionFlags::SQLITE_UTF8,
            func: Box::new(move |ctx| f(ctx)?.into_output()),
        })
    }

    /// Function name, as registered.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted number of arguments.
    #[inline]
    #[must_use]
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Flags passed to SQLite on bind.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> FunctionFlags {
        self.flags
    }

    /// Whether the function declares itself deterministic (pure).
    #[inline]
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.flags.contains(FunctionFlags::SQLITE_DETERMINISTIC)
    }

    /// Registry key of this function.
    #[must_use]
    pub fn key(&self) -> FunctionKey {
        FunctionKey::new(&self.name, self.arity)
    }

    /// Run the function on `args`.
    ///
    /// The result never borrows from the function's own buffers: transient
    /// data has already been copied, static data is `'static`.
    pub fn call(&self, args: &[ValueRef<'_>]) -> Result<ToSqlOutput<'static>> {
        self.call_with(args, None)
    }

    fn call_with(&self, args: &[ValueRef<'_>], host: Option<Host<'_>>) -> Result<ToSqlOutput<'static>> {
        if !self.arity.accepts(args.len()) {
            return Err(Error::ArityMismatch {
                name: self.name.clone(),
                given: args.len(),
            });
        }
        let ctx = Context {
            name: &self.name,
            args,
            host,
        };
        (self.func)(&ctx)
    }
}

impl fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_FUNCTION_NAME_LEN || name.contains('\0') {
        return Err(Error::InvalidFunctionName(name.to_owned()));
    }
    Ok(())
}

impl Connection {
    /// Attach a user-defined scalar function to
    /// this database connection.
    ///
    /// `fn_name` is the name the function will be accessible from SQL.
    /// `arity` is the number of arguments to the function.
    /// `flags` are the [`FunctionFlags`], the deterministic flag allows
    /// SQLite to optimize calls with constant arguments.
    ///
    /// # Failure
    ///
    /// Will return Err if the function could not be attached to the connection.
    pub fn create_scalar_function<F, T>(
        &self,
        fn_name: &str,
        arity: Arity,
        flags: FunctionFlags,
        x_func: F,
    ) -> Result<()>
    where
        F: Fn(&Context<'_>) -> Result<T> + Send + Sync + 'static,
        T: SqlFnOutput,
    {
        let function = Arc::new(ScalarFunction::new(fn_name, arity, flags, x_func)?);
        self.bind_function(&function)
    }

    /// Make `function` callable from SQL on this connection.
    ///
    /// SQLite keeps its own reference to the descriptor until the function
    /// is removed, replaced, or the connection is closed.
    ///
    /// # Failure
    ///
    /// Will return Err if SQLite rejects the registration.
    pub fn bind_function(&self, function: &Arc<ScalarFunction>) -> Result<()> {
        let c_name = str_to_cstring(function.name())?;
        let user_data = Arc::into_raw(Arc::clone(function));
        // On failure SQLite runs xDestroy itself, releasing the clone above.
        let r = unsafe {
            ffi::sqlite3_create_function_v2(
                self.handle(),
                c_name.as_ptr(),
                function.arity().as_c_int(),
                function.flags().bits(),
                user_data.cast_mut().cast(),
                Some(call_scalar_function),
                None,
                None,
                Some(free_arc::<ScalarFunction>),
            )
        };
        self.decode_result(r)?;
        debug!(
            function = function.name(),
            arity = function.arity().as_c_int(),
            "bound scalar function"
        );
        Ok(())
    }

    /// Removes a user-defined function from this
    /// database connection.
    ///
    /// `fn_name` and `arity` should match the name and number of arguments
    /// given to [`create_scalar_function`](Connection::create_scalar_function).
    ///
    /// # Failure
    ///
    /// Will return Err if the function could not be removed.
    pub fn remove_function(&self, fn_name: &str, arity: Arity) -> Result<()> {
        let c_name = str_to_cstring(fn_name)?;
        let r = unsafe {
            ffi::sqlite3_create_function_v2(
                self.handle(),
                c_name.as_ptr(),
                arity.as_c_int(),
                ffi::SQLITE_UTF8,
                std::ptr::null_mut(),
                None,
                None,
                None,
                None,
            )
        };
        self.decode_result(r)?;
        debug!(function = fn_name, arity = arity.as_c_int(), "removed scalar function");
        Ok(())
    }
}

unsafe extern "C" fn call_scalar_function(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let function = ffi::sqlite3_user_data(ctx)
        .cast::<ScalarFunction>()
        .cast_const();
    if function.is_null() {
        ffi::sqlite3_result_error_code(ctx, ffi::SQLITE_INTERNAL);
        return;
    }
    let function = &*function;
    let r = catch_unwind(AssertUnwindSafe(|| -> Result<ToSqlOutput<'static>> {
        let raw = if argc > 0 && !argv.is_null() {
            slice::from_raw_parts(argv, argc as usize)
        } else {
            &[]
        };
        let args = raw
            .iter()
            .map(|&v| ValueRef::from_value(v))
            .collect::<Result<SmallVec<[ValueRef<'_>; INLINE_ARGS]>>>()?;
        function.call_with(&args, Some(Host { ctx, argv: raw }))
    }));
    match r {
        Err(_) => {
            warn!(function = function.name(), "scalar function panicked");
            report_error(ctx, &err!(ffi::SQLITE_ERROR, "Rust panic in scalar function"));
        }
        Ok(Ok(ref output)) => set_result(ctx, output),
        Ok(Err(ref err)) => report_error(ctx, err),
    }
}

unsafe fn report_error(ctx: *mut ffi::sqlite3_context, err: &Error) {
    if err.result_code() == ffi::SQLITE_NOMEM {
        ffi::sqlite3_result_error_nomem(ctx);
        return;
    }
    // message first: sqlite3_result_error resets the code to SQLITE_ERROR
    let message = match err {
        Error::SqliteFailure(_, None) => None,
        Error::SqliteFailure(_, Some(s)) => Some(s.clone()),
        err => Some(err.to_string()),
    };
    if let Some(Ok(cstr)) = message.as_deref().map(str_to_cstring) {
        ffi::sqlite3_result_error(ctx, cstr.as_ptr(), -1);
    }
    ffi::sqlite3_result_error_code(ctx, err.result_code());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{Type, Value};

    fn half(ctx: &Context<'_>) -> Result<f64> {
        assert_eq!(ctx.len(), 1, "called with unexpected number of arguments");
        let value = ctx.get::<f64>(0)?;
        Ok(value / 2f64)
    }

    #[test]
    fn test_function_half() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function("half", Arity::Exact(1), FunctionFlags::default(), half)?;
        let result = db.query_value("SELECT half(6)")?;
        assert_eq!(result, Value::Real(3.0));
        Ok(())
    }

    #[test]
    fn test_remove_function() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function("half", Arity::Exact(1), FunctionFlags::default(), half)?;
        assert_eq!(db.query_value("SELECT half(6)")?, Value::Real(3.0));

        db.remove_function("half", Arity::Exact(1))?;
        let err = db.query_value("SELECT half(6)").unwrap_err();
        assert!(err.to_string().contains("no such function"), "{err}");
        Ok(())
    }

    #[test]
    fn test_varargs_function() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function(
            "my_concat",
            Arity::Variadic,
            FunctionFlags::default(),
            |ctx| {
                let mut ret = String::new();
                for idx in 0..ctx.len() {
                    let s = ctx.get::<String>(idx)?;
                    ret.push_str(&s);
                }
                Ok(ret)
            },
        )?;

        for &(expected, query) in &[
            ("", "SELECT my_concat()"),
            ("onetwo", "SELECT my_concat('one', 'two')"),
            ("abc", "SELECT my_concat('a', 'b', 'c')"),
        ] {
            assert_eq!(db.query_value(query)?, Value::Text(expected.to_owned()));
        }
        Ok(())
    }

    #[test]
    fn test_error_is_reported_with_code() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function("int_only", Arity::Exact(1), FunctionFlags::default(), |ctx| {
            ctx.get::<i64>(0)
        })?;
        let err = db.query_value("SELECT int_only('x')").unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(ffi::ErrorCode::TypeMismatch));
        assert!(
            err.to_string().contains("Invalid function argument type Text at index 0"),
            "{err}"
        );
        Ok(())
    }

    #[test]
    fn test_panic_is_caught() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function("boom", Arity::Exact(0), FunctionFlags::default(), |_| {
            if true {
                panic!("boom");
            }
            Ok(0)
        })?;
        let err = db.query_value("SELECT boom()").unwrap_err();
        assert!(err.to_string().contains("Rust panic"), "{err}");
        Ok(())
    }

    #[test]
    fn test_blob_and_null_round_trip() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function("ident", Arity::Exact(1), FunctionFlags::default(), |ctx| {
            Ok(Value::from(ctx.get_ref(0)?))
        })?;
        assert_eq!(db.query_value("SELECT ident(x'0102')")?, Value::Blob(vec![1, 2]));
        assert_eq!(db.query_value("SELECT ident(x'')")?, Value::Blob(vec![]));
        assert_eq!(db.query_value("SELECT ident(NULL)")?, Value::Null);
        assert_eq!(db.query_value("SELECT ident('')")?, Value::Text(String::new()));
        Ok(())
    }

    #[test]
    fn test_descriptor_arity_mismatch() -> Result<()> {
        let f = ScalarFunction::new("yo", Arity::Exact(0), FunctionFlags::default(), |_| {
            Ok(ToSqlOutput::static_text("yo"))
        })?;
        assert!(f.is_deterministic());
        assert_eq!(
            f.call(&[ValueRef::from("extra")]).unwrap_err(),
            Error::ArityMismatch {
                name: "yo".to_owned(),
                given: 1
            }
        );
        Ok(())
    }

    #[test]
    fn test_invalid_names_and_arity() {
        let noop = |_: &Context<'_>| Ok(0);
        let long = "x".repeat(256);
        for name in ["", "a\0b", long.as_str()] {
            assert_eq!(
                ScalarFunction::new(name, Arity::Exact(0), FunctionFlags::default(), noop)
                    .unwrap_err(),
                Error::InvalidFunctionName(name.to_owned())
            );
        }
        assert_eq!(
            ScalarFunction::new("f", Arity::Exact(128), FunctionFlags::default(), noop)
                .unwrap_err(),
            Error::InvalidArity(128)
        );
        assert_eq!(Arity::try_from(-1).unwrap(), Arity::Variadic);
        assert_eq!(Arity::try_from(3).unwrap(), Arity::Exact(3));
        assert_eq!(Arity::try_from(-2).unwrap_err(), Error::InvalidArity(-2));
        assert_eq!(Arity::try_from(1000).unwrap_err(), Error::InvalidArity(1000));
    }

    #[test]
    fn test_flags_force_utf8() -> Result<()> {
        let f = ScalarFunction::new(
            "random_ish",
            Arity::Exact(0),
            FunctionFlags::SQLITE_INNOCUOUS,
            |_| Ok(4),
        )?;
        assert!(f.flags().contains(FunctionFlags::SQLITE_UTF8));
        assert!(!f.is_deterministic());
        Ok(())
    }

    #[test]
    fn test_context_get_out_of_range() -> Result<()> {
        let f = ScalarFunction::new("first", Arity::Variadic, FunctionFlags::default(), |ctx| {
            ctx.get::<i64>(0)
        })?;
        assert_eq!(f.call(&[]).unwrap_err(), Error::InvalidArgumentIndex(0));
        assert_eq!(f.call(&[ValueRef::Integer(9)])?.into_value(), Value::Integer(9));
        Ok(())
    }

    #[test]
    fn test_get_str_reports_argument_index() -> Result<()> {
        let f = ScalarFunction::new("second", Arity::Exact(2), FunctionFlags::default(), |ctx| {
            Ok(ctx.get_str(1)?.len())
        })?;
        assert_eq!(
            f.call(&[ValueRef::Null, ValueRef::Text(b"abc")])?.into_value(),
            Value::Integer(3)
        );
        let err = f
            .call(&[ValueRef::Null, ValueRef::Text(b"\xff")])
            .unwrap_err();
        assert!(matches!(err, Error::Utf8Error(1, _)), "{err:?}");
        assert_eq!(
            f.call(&[ValueRef::Null, ValueRef::Integer(42)]).unwrap_err(),
            Error::InvalidArgumentType(1, Type::Integer)
        );

        let g = ScalarFunction::new("bytes", Arity::Exact(1), FunctionFlags::default(), |ctx| {
            Ok(ctx.get_blob(0)?.len())
        })?;
        assert_eq!(g.call(&[ValueRef::Blob(&[1, 2])])?.into_value(), Value::Integer(2));
        assert_eq!(
            g.call(&[ValueRef::Null]).unwrap_err(),
            Error::InvalidArgumentType(0, Type::Null)
        );
        Ok(())
    }

    #[test]
    fn test_get_str_null_is_type_mismatch() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function("shout", Arity::Exact(1), FunctionFlags::default(), |ctx| {
            Ok(ctx.get_str(0)?.to_uppercase())
        })?;
        assert_eq!(db.query_value("SELECT shout('hi')")?, Value::Text("HI".to_owned()));
        let err = db.query_value("SELECT shout(NULL)").unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(ffi::ErrorCode::TypeMismatch));
        Ok(())
    }

    #[test]
    fn test_get_subtype() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function(
            "is_json",
            Arity::Exact(1),
            FunctionFlags::default() | FunctionFlags::SQLITE_SUBTYPE,
            |ctx| Ok(ctx.get_subtype(0)? == crate::types::JSON_SUBTYPE),
        )?;
        assert_eq!(db.query_value("SELECT is_json(json('{}'))")?, Value::Integer(1));
        assert_eq!(db.query_value("SELECT is_json('{}')")?, Value::Integer(0));

        // no subtype outside of SQLite
        let f = ScalarFunction::new("st", Arity::Exact(1), FunctionFlags::default(), |ctx| {
            Ok(i64::from(ctx.get_subtype(0)?))
        })?;
        assert_eq!(f.call(&[ValueRef::Null])?.into_value(), Value::Integer(0));
        Ok(())
    }

    #[test]
    fn test_out_of_memory_is_reported_as_nomem() -> Result<()> {
        let db = Connection::open_in_memory()?;
        db.create_scalar_function("starved", Arity::Exact(0), FunctionFlags::default(), |_| {
            Err::<i64, _>(err!(ffi::SQLITE_NOMEM))
        })?;
        let err = db.query_value("SELECT starved()").unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(ffi::ErrorCode::OutOfMemory));
        Ok(())
    }
}
