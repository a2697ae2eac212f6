//! Access to the calling thread's C `errno`.
//!
//! Needed where a null return is ambiguous and the only way to tell
//! end-of-data from failure is to clear `errno` first and inspect it after.

#[cfg(target_os = "android")]
use libc::__errno as errno_location;
#[cfg(not(target_os = "android"))]
use libc::__errno_location as errno_location;

/// Returns the current thread-local errno value.
///
/// Equivalent to reading C `errno`.
#[must_use]
pub fn get_errno() -> i32 {
    // SAFETY: the location is valid thread-local storage for this thread.
    unsafe { *errno_location() }
}

/// Sets the current thread-local errno value.
///
/// Equivalent to assigning to C `errno`.
pub fn set_errno(value: i32) {
    // SAFETY: the location is valid thread-local storage for this thread.
    unsafe { *errno_location() = value };
}

/// Clears errno so a subsequent call's error indicator can be observed.
pub fn clear_errno() {
    set_errno(0);
}
