//! [`ToSql`] and [`FromSql`] implementation for JSON `Value`.

use serde_json::{Number, Value};

use crate::types::{
    FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef, JSON_SUBTYPE,
};
use crate::{Error, Result};

/// Serialize JSON `Value` to text:
///
/// | JSON   | SQLite    |
/// |----------|---------|
/// | Null     | NULL    |
/// | Bool     | 'true' / 'false' |
/// | Number   | INT or REAL except u64 |
/// | _ | TEXT, subtype `'J'` |
impl ToSql for Value {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::Borrowed(ValueRef::Null)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ToSqlOutput::from(i))
                } else if let Some(f) = n.as_f64().filter(|_| !n.is_u64()) {
                    Ok(ToSqlOutput::from(f))
                } else {
                    Ok(ToSqlOutput::from(n.to_string()))
                }
            }
            _ => serde_json::to_string(self)
                .map(|json| ToSqlOutput::from(json).with_subtype(JSON_SUBTYPE))
                .map_err(|err| Error::ToSqlConversionFailure(err.into())),
        }
    }
}

/// Deserialize SQLite value to JSON `Value`:
///
/// | SQLite   | JSON    |
/// |----------|---------|
/// | NULL     | Null    |
/// | 'null'   | Null    |
/// | 'true'   | Bool    |
/// | 1        | Number  |
/// | 0.1      | Number  |
/// | '"text"' | String  |
/// | 'text'   | _Error_ |
/// | '[0, 1]' | Array   |
/// | '{"x": 1}' | Object  |
impl FromSql for Value {
    #[inline]
    fn from_sql(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(s) => serde_json::from_slice(s),
            ValueRef::Blob(b) => serde_json::from_slice(b),
            ValueRef::Integer(i) => Ok(Value::Number(Number::from(i))),
            ValueRef::Real(f) => {
                return Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or(FromSqlError::InvalidType);
            }
            ValueRef::Null => Ok(Value::Null),
        }
        .map_err(FromSqlError::other)
    }
}
