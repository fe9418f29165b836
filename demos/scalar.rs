//! cargo run --example scalar
//!
//! A handful of scalar functions, registered once and loaded into every new
//! connection through an auto extension.

use sqlfn::auto_extension::{register_auto_extension, reset_auto_extension};
use sqlfn::functions::{Arity, Context, FunctionFlags};
use sqlfn::types::ToSqlOutput;
use sqlfn::{extension_entry_point, Connection, FunctionRegistry, Result};

// yo()
fn yo(_: &Context<'_>) -> Result<ToSqlOutput<'static>> {
    Ok(ToSqlOutput::static_text("yo"))
}

// surround_rs(name)
fn surround(ctx: &Context<'_>) -> Result<String> {
    Ok(format!("x{}x", ctx.get_str(0)?))
}

// add_rs(a, b)
fn add(ctx: &Context<'_>) -> Result<i64> {
    Ok(ctx.get::<i64>(0)? + ctx.get::<i64>(1)?)
}

// connect(separator, string1, ...)
fn connect(ctx: &Context<'_>) -> Result<Option<String>> {
    if ctx.is_empty() {
        return Ok(None);
    }
    let separator = ctx.get_str(0)?;
    let strings: Vec<&str> = ctx.args()[1..]
        .iter()
        .filter_map(|v| v.as_str().ok())
        .collect();
    Ok(Some(strings.join(separator)))
}

fn scalar_registry() -> Result<FunctionRegistry> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    let mut registry = FunctionRegistry::new();
    registry.register("surround_rs", Arity::Exact(1), flags, surround)?;
    registry.register("connect", Arity::Variadic, flags, connect)?;
    registry.register("yo_rs", Arity::Exact(0), flags, yo)?;
    registry.register("add_rs", Arity::Exact(2), flags, add)?;
    Ok(registry)
}

fn scalar_init(db: Connection) -> Result<()> {
    db.bind_registry(&scalar_registry()?)
}

extension_entry_point!(sqlite3_scalarrs_init, scalar_init);

fn main() -> Result<()> {
    unsafe { register_auto_extension(sqlite3_scalarrs_init)? };
    let db = Connection::open_in_memory()?;
    for sql in [
        "SELECT yo_rs()",
        "SELECT surround_rs('hi')",
        "SELECT add_rs(3, 4)",
        "SELECT connect('-', 'a', 'b', 'c')",
    ] {
        println!("{sql} -> {:?}", db.query_value(sql)?);
    }
    reset_auto_extension();
    Ok(())
}
