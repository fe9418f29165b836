use super::{Null, Value, ValueRef};
use crate::{Error, Result};
use std::any::Any;
use std::borrow::Cow;
use std::ffi::CStr;
use std::fmt;
use std::sync::Arc;

/// `ToSqlOutput` represents the possible output types for implementers of the
/// [`ToSql`] trait, and is the ownership-tagged result of every function call.
///
/// The variant decides how the result is handed to SQLite:
///
/// | variant | memory | `sqlite3_result_*` destructor |
/// |---------|--------|-------------------------------|
/// | `Static` | lives for the whole program | `SQLITE_STATIC`, used in place |
/// | `Borrowed` | owned by the function's return value | `SQLITE_TRANSIENT`, copied |
/// | `Owned` | a fresh buffer | `SQLITE_TRANSIENT`, copied |
///
/// `Subtyped` wraps one of these with a subtype
/// (`sqlite3_result_subtype`), and `Pointer` hands SQLite a Rust object
/// through `sqlite3_result_pointer`.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ToSqlOutput<'a> {
    /// A borrowed SQLite-representable value. The host copies it before the
    /// value it borrows from is dropped.
    Borrowed(ValueRef<'a>),

    /// An owned SQLite-representable value.
    Owned(Value),

    /// A value backed by memory that is never freed. The host uses it without
    /// copying.
    Static(ValueRef<'static>),

    /// A value tagged with a subtype, such as [`JSON_SUBTYPE`](super::JSON_SUBTYPE).
    /// Only the lower 8 bits of a subtype are kept by SQLite.
    Subtyped(u8, Box<ToSqlOutput<'a>>),

    /// A Rust object passed to other functions with `sqlite3_result_pointer`.
    /// SQL sees `NULL`.
    Pointer(PointerValue),
}

/// A Rust object handed to SQLite with `sqlite3_result_pointer`.
///
/// Functions receiving it as an argument read it back with
/// [`Context::get_pointer`](crate::functions::Context::get_pointer), using the
/// same type name.
#[derive(Clone)]
pub struct PointerValue {
    value: Arc<dyn Any + Send + Sync + 'static>,
    type_name: &'static CStr,
}

impl PointerValue {
    /// Wrap `value` under `type_name`.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T, type_name: &'static CStr) -> PointerValue {
        PointerValue {
            value: Arc::new(value),
            type_name,
        }
    }

    /// Pointer type name checked by `sqlite3_value_pointer`.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static CStr {
        self.type_name
    }

    /// Borrow the object if it is a `T`.
    #[inline]
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    #[inline]
    pub(crate) fn inner(&self) -> &Arc<dyn Any + Send + Sync + 'static> {
        &self.value
    }
}

impl PartialEq for PointerValue {
    fn eq(&self, other: &PointerValue) -> bool {
        Arc::ptr_eq(&self.value, &other.value) && self.type_name == other.type_name
    }
}

impl fmt::Debug for PointerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl ToSqlOutput<'_> {
    /// A text result backed by a string literal (`SQLITE_STATIC`).
    #[inline]
    #[must_use]
    pub const fn static_text(s: &'static str) -> Self {
        ToSqlOutput::Static(ValueRef::Text(s.as_bytes()))
    }

    /// A blob result backed by a constant buffer (`SQLITE_STATIC`).
    #[inline]
    #[must_use]
    pub const fn static_blob(b: &'static [u8]) -> Self {
        ToSqlOutput::Static(ValueRef::Blob(b))
    }

    /// A pointer result carrying `value` under `type_name`.
    #[must_use]
    pub fn pointer<T: Any + Send + Sync>(value: T, type_name: &'static CStr) -> Self {
        ToSqlOutput::Pointer(PointerValue::new(value, type_name))
    }

    /// Tag this output with `subtype`, replacing any previous one.
    #[must_use]
    pub fn with_subtype(self, subtype: u8) -> Self {
        match self {
            ToSqlOutput::Subtyped(_, inner) => ToSqlOutput::Subtyped(subtype, inner),
            other => ToSqlOutput::Subtyped(subtype, Box::new(other)),
        }
    }

    /// The subtype this output is tagged with, if any.
    #[inline]
    #[must_use]
    pub fn subtype(&self) -> Option<u8> {
        match *self {
            ToSqlOutput::Subtyped(t, _) => Some(t),
            _ => None,
        }
    }

    /// Borrow the value regardless of who owns it. Pointers read as `NULL`.
    #[inline]
    #[must_use]
    pub fn value(&self) -> ValueRef<'_> {
        match *self {
            ToSqlOutput::Borrowed(v) => v,
            ToSqlOutput::Owned(ref v) => ValueRef::from(v),
            ToSqlOutput::Static(v) => v,
            ToSqlOutput::Subtyped(_, ref inner) => inner.value(),
            ToSqlOutput::Pointer(_) => ValueRef::Null,
        }
    }

    /// Whether SQLite may keep pointing at this value without copying it.
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        match *self {
            ToSqlOutput::Static(_) => true,
            ToSqlOutput::Subtyped(_, ref inner) => inner.is_static(),
            _ => false,
        }
    }

    /// Detach the output from whatever it borrows: `Borrowed` values are
    /// copied into `Owned`, `Static` and `Owned` values move through as is.
    #[must_use]
    pub fn into_static(self) -> ToSqlOutput<'static> {
        match self {
            ToSqlOutput::Borrowed(v) => ToSqlOutput::Owned(v.into()),
            ToSqlOutput::Owned(v) => ToSqlOutput::Owned(v),
            ToSqlOutput::Static(v) => ToSqlOutput::Static(v),
            ToSqlOutput::Subtyped(t, inner) => ToSqlOutput::Subtyped(t, Box::new((*inner).into_static())),
            ToSqlOutput::Pointer(p) => ToSqlOutput::Pointer(p),
        }
    }

    /// Take ownership of the value, copying `Borrowed` and `Static` data.
    /// Subtypes are dropped and pointers become `NULL`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            ToSqlOutput::Borrowed(v) => v.into(),
            ToSqlOutput::Owned(v) => v,
            ToSqlOutput::Static(v) => v.into(),
            ToSqlOutput::Subtyped(_, inner) => (*inner).into_value(),
            ToSqlOutput::Pointer(_) => Value::Null,
        }
    }
}

// Generically allow any type that can be converted into a ValueRef
// to be converted into a ToSqlOutput as well.
impl<'a, T: ?Sized> From<&'a T> for ToSqlOutput<'a>
where
    &'a T: Into<ValueRef<'a>>,
{
    #[inline]
    fn from(t: &'a T) -> Self {
        ToSqlOutput::Borrowed(t.into())
    }
}

// We cannot also generically allow any type that can be converted
// into a Value to be converted into a ToSqlOutput because of
// coherence rules (https://github.com/rust-lang/rust/pull/46192),
// so we'll manually implement it for all the types we know can
// be converted into Values.
macro_rules! from_value(
    ($t:ty) => (
        impl From<$t> for ToSqlOutput<'_> {
            #[inline]
            fn from(t: $t) -> Self { ToSqlOutput::Owned(t.into())}
        }
    );
    (non_zero $t:ty) => (
        impl From<$t> for ToSqlOutput<'_> {
            #[inline]
            fn from(t: $t) -> Self { ToSqlOutput::Owned(t.get().into())}
        }
    )
);
from_value!(String);
from_value!(Null);
from_value!(bool);
from_value!(i8);
from_value!(i16);
from_value!(i32);
from_value!(i64);
from_value!(isize);
from_value!(u8);
from_value!(u16);
from_value!(u32);
from_value!(f32);
from_value!(f64);
from_value!(Vec<u8>);
from_value!(non_zero std::num::NonZeroI8);
from_value!(non_zero std::num::NonZeroI16);
from_value!(non_zero std::num::NonZeroI32);
from_value!(non_zero std::num::NonZeroI64);
from_value!(non_zero std::num::NonZeroU8);
from_value!(non_zero std::num::NonZeroU16);
from_value!(non_zero std::num::NonZeroU32);

impl ToSql for ToSqlOutput<'_> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(match *self {
            ToSqlOutput::Borrowed(v) => ToSqlOutput::Borrowed(v),
            ToSqlOutput::Owned(ref v) => ToSqlOutput::Borrowed(ValueRef::from(v)),
            ToSqlOutput::Static(v) => ToSqlOutput::Static(v),
            ToSqlOutput::Subtyped(t, ref inner) => ToSqlOutput::Subtyped(t, Box::new(inner.to_sql()?)),
            ToSqlOutput::Pointer(ref p) => ToSqlOutput::Pointer(p.clone()),
        })
    }
}

/// A trait for types that can be converted into SQLite values. Returns
/// [`Error::ToSqlConversionFailure`] if the conversion fails.
pub trait ToSql {
    /// Converts Rust value to SQLite value
    fn to_sql(&self) -> Result<ToSqlOutput<'_>>;
}

impl<T: ToSql + ToOwned + ?Sized> ToSql for Cow<'_, T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        self.as_ref().to_sql()
    }
}

impl<T: ToSql + ?Sized> ToSql for Box<T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        self.as_ref().to_sql()
    }
}

impl<T: ToSql + ?Sized> ToSql for std::rc::Rc<T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        self.as_ref().to_sql()
    }
}

impl<T: ToSql + ?Sized> ToSql for std::sync::Arc<T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        self.as_ref().to_sql()
    }
}

// We should be able to use a generic impl like this:
//
// impl<T: Copy> ToSql for T where T: Into<Value> {
//     fn to_sql(&self) -> Result<ToSqlOutput> {
//         Ok(ToSqlOutput::from((*self).into()))
//     }
// }
//
// instead of the following macro, but this runs afoul of
// https://github.com/rust-lang/rust/issues/30191 and reports conflicting
// implementations even when there aren't any.

macro_rules! to_sql_self(
    ($t:ty) => (
        impl ToSql for $t {
            #[inline]
            fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(*self))
            }
        }
    )
);

to_sql_self!(Null);
to_sql_self!(bool);
to_sql_self!(i8);
to_sql_self!(i16);
to_sql_self!(i32);
to_sql_self!(i64);
to_sql_self!(isize);
to_sql_self!(u8);
to_sql_self!(u16);
to_sql_self!(u32);
to_sql_self!(f32);
to_sql_self!(f64);
to_sql_self!(std::num::NonZeroI8);
to_sql_self!(std::num::NonZeroI16);
to_sql_self!(std::num::NonZeroI32);
to_sql_self!(std::num::NonZeroI64);
to_sql_self!(std::num::NonZeroU8);
to_sql_self!(std::num::NonZeroU16);
to_sql_self!(std::num::NonZeroU32);

macro_rules! to_sql_self_fallible(
    ($t:ty) => (
        impl ToSql for $t {
            #[inline]
            fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::Owned(Value::Integer(
                    i64::try_from(*self).map_err(
                        // TODO: Include the values in the error message.
                        |err| Error::ToSqlConversionFailure(err.into())
                    )?
                )))
            }
        }
    )
);

// Special implementations for usize and u64 because these conversions can fail.
to_sql_self_fallible!(u64);
to_sql_self_fallible!(usize);

impl<T: ?Sized> ToSql for &'_ T
where
    T: ToSql,
{
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        (*self).to_sql()
    }
}

impl ToSql for String {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl ToSql for str {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self))
    }
}

impl ToSql for Vec<u8> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_slice()))
    }
}

impl<const N: usize> ToSql for [u8; N] {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(&self[..]))
    }
}

impl ToSql for [u8] {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self))
    }
}

impl ToSql for Value {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self))
    }
}

impl ToSql for ValueRef<'_> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(*self))
    }
}

impl<T: ToSql> ToSql for Option<T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        match *self {
            None => Ok(ToSqlOutput::from(Null)),
            Some(ref t) => t.to_sql(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ToSql, ToSqlOutput};
    use crate::types::{Value, ValueRef};
    use crate::Result;
    use std::borrow::Cow;
    use std::rc::Rc;
    use std::sync::Arc;

    fn is_to_sql<T: ToSql>() {}

    #[test]
    fn test_integral_types() {
        is_to_sql::<i8>();
        is_to_sql::<i16>();
        is_to_sql::<i32>();
        is_to_sql::<i64>();
        is_to_sql::<isize>();
        is_to_sql::<u8>();
        is_to_sql::<u16>();
        is_to_sql::<u32>();
        is_to_sql::<u64>();
        is_to_sql::<usize>();
    }

    #[test]
    fn test_cow_str() {
        let s = "str";
        let cow: Cow<str> = Cow::Borrowed(s);
        let r = cow.to_sql();
        assert!(r.is_ok());
        let cow: Cow<str> = Cow::Owned::<str>(String::from(s));
        let r = cow.to_sql();
        assert!(r.is_ok());
        // Ensure this compiles.
        let _p: &[&dyn ToSql] = &[&cow];
    }

    #[test]
    fn test_box_and_rc() {
        let s: Box<str> = "Hello world!".into();
        assert!(s.to_sql().is_ok());
        let s: Rc<str> = Rc::from("Hello world!");
        assert!(s.to_sql().is_ok());
        let s: Arc<str> = Arc::from("Hello world!");
        assert!(s.to_sql().is_ok());
    }

    #[test]
    fn u64_out_of_range() {
        assert!(u64::MAX.to_sql().is_err());
        assert_eq!(
            7_u64.to_sql().unwrap(),
            ToSqlOutput::Owned(Value::Integer(7))
        );
    }

    #[test]
    fn string_is_borrowed() -> Result<()> {
        let s = String::from("abc");
        match s.to_sql()? {
            ToSqlOutput::Borrowed(ValueRef::Text(t)) => assert_eq!(t.as_ptr(), s.as_ptr()),
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn into_static_copies_borrowed() {
        let s = String::from("transient");
        let out = ToSqlOutput::from(s.as_str()).into_static();
        drop(s);
        assert_eq!(out, ToSqlOutput::Owned(Value::Text("transient".to_owned())));
    }

    #[test]
    fn into_static_keeps_static() {
        static YO: &str = "yo";
        let out = ToSqlOutput::static_text(YO).into_static();
        assert!(out.is_static());
        match out {
            ToSqlOutput::Static(ValueRef::Text(t)) => assert!(std::ptr::eq(t, YO.as_bytes())),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn output_to_sql_borrows_owned() -> Result<()> {
        let out = ToSqlOutput::Owned(Value::Integer(3));
        assert_eq!(out.to_sql()?, ToSqlOutput::Borrowed(ValueRef::Integer(3)));
        assert_eq!(out.value(), ValueRef::Integer(3));
        assert_eq!(out.into_value(), Value::Integer(3));
        Ok(())
    }

    #[test]
    fn subtype_wraps_value() -> Result<()> {
        let s = String::from("[1]");
        let out = ToSqlOutput::from(s.as_str()).with_subtype(b'J');
        assert_eq!(out.subtype(), Some(b'J'));
        assert_eq!(out.value(), ValueRef::Text(b"[1]"));
        let out = out.into_static().with_subtype(b'K');
        drop(s);
        assert_eq!(out.subtype(), Some(b'K'));
        assert_eq!(out.to_sql()?.subtype(), Some(b'K'));
        assert_eq!(out.into_value(), Value::Text("[1]".to_owned()));
        assert!(ToSqlOutput::static_text("x").with_subtype(1).is_static());
        Ok(())
    }

    #[test]
    fn pointer_reads_as_null() {
        let out = ToSqlOutput::pointer(vec![1_u32, 2], c"sqlfn_vec");
        assert_eq!(out.value(), ValueRef::Null);
        assert!(!out.is_static());
        match out.clone().into_static() {
            ToSqlOutput::Pointer(p) => {
                assert_eq!(p.type_name(), c"sqlfn_vec");
                assert_eq!(p.downcast_ref::<Vec<u32>>(), Some(&vec![1, 2]));
                assert!(p.downcast_ref::<String>().is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out.into_value(), Value::Null);
    }
}
