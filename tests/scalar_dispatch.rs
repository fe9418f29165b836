//! Registry functions called through SQLite's own dispatcher.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regex::Regex;
use sqlfn::functions::{Arity, Context, FunctionFlags};
use sqlfn::types::{ToSqlOutput, Value, ValueRef};
use sqlfn::{ffi, Connection, Error, FunctionRegistry, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

static MAGIC: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

fn surround(ctx: &Context<'_>) -> Result<String> {
    Ok(format!("x{}x", ctx.get_str(0)?))
}

fn registry() -> Result<FunctionRegistry> {
    let mut registry = FunctionRegistry::new();
    registry.register("yo", Arity::Exact(0), FunctionFlags::default(), |_| {
        Ok(ToSqlOutput::static_text("yo"))
    })?;
    registry.register("surround", Arity::Exact(1), FunctionFlags::default(), surround)?;
    registry.register("add", Arity::Exact(2), FunctionFlags::default(), |ctx| {
        Ok(ctx.get::<i64>(0)? + ctx.get::<i64>(1)?)
    })?;
    registry.register("static_magic", Arity::Exact(0), FunctionFlags::default(), |_| {
        Ok(ToSqlOutput::static_blob(&MAGIC))
    })?;
    registry.register("borrowed_magic", Arity::Exact(0), FunctionFlags::default(), |_| {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&MAGIC)))
    })?;
    registry.register("is_magic_address", Arity::Exact(1), FunctionFlags::default(), |ctx| {
        let blob = ctx.get_blob(0)?;
        Ok(std::ptr::eq(blob.as_ptr(), MAGIC.as_ptr()))
    })?;
    Ok(registry)
}

fn db() -> Result<Connection> {
    let db = Connection::open_in_memory()?;
    db.bind_registry(&registry()?)?;
    Ok(db)
}

#[test]
fn test_scenarios() -> Result<()> {
    let db = db()?;
    assert_eq!(db.query_value("SELECT add(3, 4)")?, Value::Integer(7));
    assert_eq!(
        db.query_value("SELECT surround('hi')")?,
        Value::Text("xhix".to_owned())
    );
    assert_eq!(db.query_value("SELECT yo()")?, Value::Text("yo".to_owned()));
    assert_eq!(db.query_value("SELECT YO()")?, Value::Text("yo".to_owned()));
    Ok(())
}

#[test]
fn test_arity_mismatch_is_reported_by_sqlite() -> Result<()> {
    let db = db()?;
    let err = db.query_value("SELECT yo('extra')").unwrap_err();
    assert!(
        err.to_string().contains("wrong number of arguments to function yo()"),
        "{err}"
    );
    let err = db.query_value("SELECT nonexistent()").unwrap_err();
    assert!(err.to_string().contains("no such function: nonexistent"), "{err}");
    Ok(())
}

#[test]
fn test_invalid_argument_type() -> Result<()> {
    let db = db()?;
    let err = db.query_value("SELECT add('three', 4)").unwrap_err();
    assert_eq!(err.sqlite_error_code(), Some(ffi::ErrorCode::TypeMismatch));
    assert!(
        err.to_string().contains("Invalid function argument type Text at index 0"),
        "{err}"
    );
    Ok(())
}

#[test]
fn test_result_ownership() -> Result<()> {
    let db = db()?;
    assert_eq!(db.query_value("SELECT static_magic()")?, Value::Blob(MAGIC.to_vec()));
    assert_eq!(db.query_value("SELECT borrowed_magic()")?, Value::Blob(MAGIC.to_vec()));
    // static results are used in place, borrowed ones are copied
    assert_eq!(
        db.query_value("SELECT is_magic_address(static_magic())")?,
        Value::Integer(1)
    );
    assert_eq!(
        db.query_value("SELECT is_magic_address(borrowed_magic())")?,
        Value::Integer(0)
    );
    Ok(())
}

#[test]
fn test_transient_text_survives() -> Result<()> {
    let db = db()?;
    db.execute_batch(
        "CREATE TABLE words(w TEXT);
         INSERT INTO words VALUES ('a'), ('bb'), ('ccc');",
    )?;
    assert_eq!(
        db.query_value("SELECT group_concat(surround(w), ',') FROM words")?,
        Value::Text("xax,xbbx,xcccx".to_owned())
    );
    Ok(())
}

#[test]
fn test_user_error() -> Result<()> {
    let db = Connection::open_in_memory()?;
    db.create_scalar_function("checked_div", Arity::Exact(2), FunctionFlags::default(), |ctx| {
        let (a, b) = (ctx.get::<i64>(0)?, ctx.get::<i64>(1)?);
        a.checked_div(b)
            .ok_or_else(|| Error::UserFunctionError("division by zero".into()))
    })?;
    assert_eq!(db.query_value("SELECT checked_div(9, 3)")?, Value::Integer(3));
    let err = db.query_value("SELECT checked_div(1, 0)").unwrap_err();
    assert_eq!(err.sqlite_error_code(), Some(ffi::ErrorCode::Unknown));
    assert!(err.to_string().contains("division by zero"), "{err}");
    Ok(())
}

#[test]
fn test_regexp_with_auxdata() -> Result<()> {
    let db = Connection::open_in_memory()?;
    let compiled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&compiled);
    db.create_scalar_function("regexp", Arity::Exact(2), FunctionFlags::default(), move |ctx| {
        let re: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Regex::new(vr.as_str()?)?)
        })?;
        Ok(re.is_match(ctx.get_str(1)?))
    })?;
    db.execute_batch(
        "CREATE TABLE foo (x string);
         INSERT INTO foo VALUES ('lisa');
         INSERT INTO foo VALUES ('lXsi');
         INSERT INTO foo VALUES ('lisX');",
    )?;
    assert_eq!(
        db.query_value("SELECT count(*) FROM foo WHERE x REGEXP 'l.s[aeiouy]'")?,
        Value::Integer(2)
    );
    // one compilation for the three rows of the statement
    assert_eq!(compiled.load(Ordering::SeqCst), 1);

    let err = db.query_value("SELECT 'a' REGEXP '('").unwrap_err();
    assert!(err.to_string().contains("regex parse error"), "{err}");
    Ok(())
}

#[test]
fn test_auxdata_wrong_type() -> Result<()> {
    let db = Connection::open_in_memory()?;
    db.create_scalar_function("aux_mix", Arity::Exact(1), FunctionFlags::default(), |ctx| {
        ctx.set_aux(0, 7_i64)?;
        let same: Option<Arc<i64>> = ctx.get_aux(0)?;
        assert_eq!(same.as_deref(), Some(&7));
        Ok(matches!(ctx.get_aux::<String>(0), Err(Error::GetAuxWrongType)))
    })?;
    assert_eq!(db.query_value("SELECT aux_mix('x')")?, Value::Integer(1));
    Ok(())
}

#[test]
fn test_surround_null_is_type_mismatch() -> Result<()> {
    let db = db()?;
    let err = db.query_value("SELECT surround(NULL)").unwrap_err();
    assert_eq!(err.sqlite_error_code(), Some(ffi::ErrorCode::TypeMismatch));
    assert!(
        err.to_string().contains("Invalid function argument type Null at index 0"),
        "{err}"
    );
    Ok(())
}

#[derive(Debug)]
struct Counter(i64);

#[test]
fn test_pointer_passing() -> Result<()> {
    const COUNTER: &std::ffi::CStr = c"sqlfn_counter";
    let db = Connection::open_in_memory()?;
    db.create_scalar_function("make_counter", Arity::Exact(0), FunctionFlags::SQLITE_UTF8, |_| {
        Ok(ToSqlOutput::pointer(Counter(42), COUNTER))
    })?;
    db.create_scalar_function("read_counter", Arity::Exact(1), FunctionFlags::default(), |ctx| {
        Ok(ctx.get_pointer::<Counter>(0, COUNTER)?.map(|c| c.0))
    })?;
    db.create_scalar_function("read_other", Arity::Exact(1), FunctionFlags::default(), |ctx| {
        Ok(ctx.get_pointer::<Counter>(0, c"other_type")?.map(|c| c.0))
    })?;

    assert_eq!(
        db.query_value("SELECT read_counter(make_counter())")?,
        Value::Integer(42)
    );
    // pointers read as NULL from SQL
    assert_eq!(
        db.query_value("SELECT typeof(make_counter())")?,
        Value::Text("null".to_owned())
    );
    assert_eq!(db.query_value("SELECT read_other(make_counter())")?, Value::Null);
    assert_eq!(db.query_value("SELECT read_counter(NULL)")?, Value::Null);
    Ok(())
}

#[test]
fn test_rebinding_replaces_function() -> Result<()> {
    let db = db()?;
    db.create_scalar_function("yo", Arity::Exact(0), FunctionFlags::default(), |_| {
        Ok("yo again")
    })?;
    assert_eq!(
        db.query_value("SELECT yo()")?,
        Value::Text("yo again".to_owned())
    );
    db.remove_function("yo", Arity::Exact(0))?;
    assert!(db.query_value("SELECT yo()").is_err());
    Ok(())
}
