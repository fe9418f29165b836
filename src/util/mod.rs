// Internal utilities
use crate::ffi;
use std::ffi::{c_char, c_void};
use std::sync::Arc;

/// `xDestroy` callback releasing the `Arc<T>` handed to SQLite as user data.
pub(crate) unsafe extern "C" fn free_arc<T>(p: *mut c_void) {
    drop(Arc::from_raw(p.cast::<T>().cast_const()));
}

/// Destructor for a `Box<T>` handed to SQLite (auxiliary data, pointer
/// results).
pub(crate) unsafe extern "C" fn free_boxed_value<T>(p: *mut c_void) {
    drop(Box::from_raw(p.cast::<T>()));
}

/// Copy `s` into a NUL-terminated buffer allocated with `sqlite3_malloc64`,
/// suitable for `*pzErrMsg`. Returns null if the allocation fails.
pub(crate) fn alloc(s: &str) -> *mut c_char {
    // Interior NULs would silently truncate the message on the C side.
    let s = s.replace('\0', "\\0");
    let len = s.len();
    unsafe {
        let ptr = ffi::sqlite3_malloc64(len as u64 + 1).cast::<c_char>();
        if ptr.is_null() {
            return ptr;
        }
        std::ptr::copy_nonoverlapping(s.as_ptr().cast::<c_char>(), ptr, len);
        *ptr.add(len) = 0;
        ptr
    }
}
