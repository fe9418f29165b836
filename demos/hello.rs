//! cargo run --example hello

use sqlfn::auto_extension::{register_auto_extension, reset_auto_extension};
use sqlfn::functions::{Arity, Context, FunctionFlags};
use sqlfn::{extension_entry_point, Connection, Result};

// Called on every invocation of `hello(name)`; returns "hello, NAME!".
fn hello(ctx: &Context<'_>) -> Result<String> {
    let name = ctx.get_str(0)?;
    Ok(format!("hello, {name}!"))
}

fn hello_init(db: Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    db.create_scalar_function("hello", Arity::Exact(1), flags, hello)
}

// Named after the SQLite convention `sqlite3_<name>_init`.
extension_entry_point!(sqlite3_hello_init, hello_init);

fn main() -> Result<()> {
    // SQLite's log must be routed before the first connection opens.
    unsafe { sqlfn::trace::route_log_to_tracing()? };
    unsafe { register_auto_extension(sqlite3_hello_init)? };
    let db = Connection::open_in_memory()?;
    println!("{:?}", db.query_value("SELECT hello('asdf')")?);
    reset_auto_extension();
    Ok(())
}

