use super::{Value, ValueRef};
use std::error::Error;
use std::fmt;
use std::str;

/// Enum listing possible errors from [`FromSql`] trait.
#[derive(Debug)]
#[non_exhaustive]
pub enum FromSqlError {
    /// Error when an SQLite value is requested, but the type of the result
    /// cannot be converted to the requested Rust type.
    InvalidType,

    /// Error when the i64 value returned by SQLite cannot be stored into the
    /// requested type.
    OutOfRange(i64),

    /// Error when a text value is not valid UTF-8.
    Utf8Error(str::Utf8Error),

    /// An error case available for implementors of the [`FromSql`] trait.
    Other(Box<dyn Error + Send + Sync + 'static>),
}

impl FromSqlError {
    /// Converts an arbitrary error type to [`FromSqlError`].
    ///
    /// This is a convenience function that boxes and unsizes the error type.
    /// It's main purpose is to be usable in the `map_err` method.
    #[cold]
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}

impl PartialEq for FromSqlError {
    fn eq(&self, other: &FromSqlError) -> bool {
        match (self, other) {
            (FromSqlError::InvalidType, FromSqlError::InvalidType) => true,
            (FromSqlError::OutOfRange(n1), FromSqlError::OutOfRange(n2)) => n1 == n2,
            (FromSqlError::Utf8Error(e1), FromSqlError::Utf8Error(e2)) => e1 == e2,
            (..) => false,
        }
    }
}

impl fmt::Display for FromSqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FromSqlError::InvalidType => write!(f, "Invalid type"),
            FromSqlError::OutOfRange(i) => write!(f, "Value {i} out of range"),
            FromSqlError::Utf8Error(ref err) => err.fmt(f),
            FromSqlError::Other(ref err) => err.fmt(f),
        }
    }
}

impl Error for FromSqlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FromSqlError::Utf8Error(err) => Some(err),
            FromSqlError::Other(err) => Some(&**err),
            _ => None,
        }
    }
}

/// Result type for implementors of the [`FromSql`] trait.
pub type FromSqlResult<T> = Result<T, FromSqlError>;

/// A trait for types that can be created from a function argument.
pub trait FromSql: Sized {
    /// Converts SQLite value into Rust value.
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self>;
}

macro_rules! from_sql_integral(
    ($t:ident) => (
        impl FromSql for $t {
            #[inline]
            fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let i = i64::from_sql(value)?;
                i.try_into().map_err(|_| FromSqlError::OutOfRange(i))
            }
        }
    );
    (non_zero $nz:ty, $z:ty) => (
        impl FromSql for $nz {
            #[inline]
            fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let i = <$z>::from_sql(value)?;
                <$nz>::new(i).ok_or(FromSqlError::OutOfRange(0))
            }
        }
    )
);

from_sql_integral!(i8);
from_sql_integral!(i16);
from_sql_integral!(i32);
from_sql_integral!(isize);
from_sql_integral!(u8);
from_sql_integral!(u16);
from_sql_integral!(u32);
from_sql_integral!(u64);
from_sql_integral!(usize);

from_sql_integral!(non_zero std::num::NonZeroI8, i8);
from_sql_integral!(non_zero std::num::NonZeroI16, i16);
from_sql_integral!(non_zero std::num::NonZeroI32, i32);
from_sql_integral!(non_zero std::num::NonZeroI64, i64);
from_sql_integral!(non_zero std::num::NonZeroU8, u8);
from_sql_integral!(non_zero std::num::NonZeroU16, u16);
from_sql_integral!(non_zero std::num::NonZeroU32, u32);

impl FromSql for i64 {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(i) => Ok(i),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl FromSql for f32 {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(i) => Ok(i as Self),
            ValueRef::Real(f) => Ok(f as Self),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl FromSql for f64 {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(i) => Ok(i as Self),
            ValueRef::Real(f) => Ok(f),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl FromSql for bool {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::from_sql(value).map(|i| i != 0)
    }
}

impl FromSql for String {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(t) => str::from_utf8(t)
                .map(ToString::to_string)
                .map_err(FromSqlError::Utf8Error),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl FromSql for Box<str> {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::from_sql(value).map(String::into_boxed_str)
    }
}

impl FromSql for Vec<u8> {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Blob(b) => Ok(b.to_vec()),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl<T: FromSql> FromSql for Option<T> {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(None),
            _ => FromSql::from_sql(value).map(Some),
        }
    }
}

impl FromSql for Value {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        if let ValueRef::Text(t) = value {
            str::from_utf8(t).map_err(FromSqlError::Utf8Error)?;
        }
        Ok(value.into())
    }
}

#[cfg(test)]
mod test {
    use super::{FromSql, FromSqlError};
    use crate::types::{Value, ValueRef};

    #[test]
    fn test_integral_ranges() {
        fn check_ranges<T>(out_of_range: &[i64], in_range: &[i64])
        where
            T: Into<i64> + FromSql + std::fmt::Debug,
        {
            for n in out_of_range {
                let err = T::from_sql(ValueRef::Integer(*n)).unwrap_err();
                assert_eq!(err, FromSqlError::OutOfRange(*n));
            }
            for n in in_range {
                assert_eq!(*n, T::from_sql(ValueRef::Integer(*n)).unwrap().into());
            }
        }

        check_ranges::<i8>(&[-129, 128], &[-128, 0, 1, 127]);
        check_ranges::<i16>(&[-32769, 32768], &[-32768, -1, 0, 1, 32767]);
        check_ranges::<i32>(
            &[-2_147_483_649, 2_147_483_648],
            &[-2_147_483_648, -1, 0, 1, 2_147_483_647],
        );
        check_ranges::<u8>(&[-2, -1, 256], &[0, 1, 255]);
        check_ranges::<u16>(&[-2, -1, 65536], &[0, 1, 65535]);
        check_ranges::<u32>(&[-2, -1, 4_294_967_296], &[0, 1, 4_294_967_295]);
    }

    #[test]
    fn test_nonzero() {
        use std::num::NonZeroI64;
        assert_eq!(
            NonZeroI64::from_sql(ValueRef::Integer(0)).unwrap_err(),
            FromSqlError::OutOfRange(0)
        );
        assert_eq!(
            NonZeroI64::from_sql(ValueRef::Integer(5)).unwrap().get(),
            5
        );
    }

    #[test]
    fn test_text_and_blob() {
        assert_eq!(String::from_sql(ValueRef::Text(b"hi")).unwrap(), "hi");
        assert_eq!(
            String::from_sql(ValueRef::Blob(b"hi")).unwrap_err(),
            FromSqlError::InvalidType
        );
        assert!(matches!(
            String::from_sql(ValueRef::Text(&[0xc3, 0x28])),
            Err(FromSqlError::Utf8Error(_))
        ));
        assert_eq!(Vec::<u8>::from_sql(ValueRef::Blob(b"\x01")).unwrap(), vec![1]);
    }

    #[test]
    fn test_float_accepts_integer() {
        assert_eq!(f64::from_sql(ValueRef::Integer(2)).unwrap(), 2.0);
        assert_eq!(f64::from_sql(ValueRef::Real(0.25)).unwrap(), 0.25);
        assert!(f64::from_sql(ValueRef::Null).is_err());
    }

    #[test]
    fn test_option_and_value() {
        assert_eq!(Option::<i64>::from_sql(ValueRef::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_sql(ValueRef::Integer(1)).unwrap(), Some(1));
        assert_eq!(
            Value::from_sql(ValueRef::Real(1.5)).unwrap(),
            Value::Real(1.5)
        );
        assert!(bool::from_sql(ValueRef::Integer(2)).unwrap());
    }
}
