//! Ensure we reject connections when SQLite is in single-threaded mode, as it
//! would violate safety if multiple Rust threads called bound functions on
//! connections sharing a registry.

#[test]
fn test_error_when_singlethread_mode() {
    use sqlfn::ffi;
    use sqlfn::{Connection, Error};

    // put SQLite into single-threaded mode
    unsafe {
        if ffi::sqlite3_config(ffi::SQLITE_CONFIG_SINGLETHREAD) != ffi::SQLITE_OK {
            return;
        }
        if ffi::sqlite3_initialize() != ffi::SQLITE_OK {
            return;
        }
    }

    let err = Connection::open_in_memory().unwrap_err();
    assert_eq!(err, Error::SqliteSingleThreadedMode);
}
