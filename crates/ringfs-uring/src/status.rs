//! Native status codes
//!
//! A status is the signed integer an operation completes with. Non-negative
//! values carry the result; negative values are `-errno`. [`EOF`] is the one
//! status that does not come from the kernel: [`crate::file::read`] reports
//! end of file as a zero count, and callers that treat an empty read as a
//! failure describe it with this code.

use std::io;

/// End of file, for reads that complete with zero bytes
///
/// Chosen outside the errno range so it never collides with a kernel code.
pub const EOF: i32 = -4095;

/// Render a status as a human-readable message
///
/// The sign is ignored, so both `-ENOENT` and `ENOENT` describe the same
/// condition. Unknown codes render as `"unknown error <code>"`.
#[must_use]
pub fn strerror(status: i32) -> String {
    if status == EOF {
        return "end of file".to_string();
    }
    let errno = nix::errno::Errno::from_raw(status.saturating_abs());
    match errno {
        nix::errno::Errno::UnknownErrno => format!("unknown error {status}"),
        known => known.desc().to_string(),
    }
}

/// Convert an `io::Error` into a negative errno
///
/// Errors that carry no OS code collapse to `-EIO`.
#[must_use]
pub fn from_io_error(error: &io::Error) -> i32 {
    -error.raw_os_error().unwrap_or(libc::EIO)
}

/// Convert the result of a completed submission into a status
///
/// Results too large for `isize` cannot come from the kernel and are
/// reported as `-EOVERFLOW`.
#[must_use]
pub fn from_result(result: &io::Result<usize>) -> isize {
    match result {
        Ok(n) => isize::try_from(*n).unwrap_or(-(libc::EOVERFLOW as isize)),
        Err(e) => from_io_error(e) as isize,
    }
}

/// Narrow a status known to fit in `i32` (descriptors, zero results)
#[must_use]
pub(crate) fn narrow(status: isize) -> i32 {
    i32::try_from(status).unwrap_or(-libc::EOVERFLOW)
}

/// Status of the calling thread's last failed syscall
pub(crate) fn last_os_status() -> i32 {
    from_io_error(&io::Error::last_os_error())
}

/// Status for a blocking task that never reported back (panicked)
pub(crate) const JOIN_FAILED: i32 = -libc::EIO;

/// Run a syscall on compio's blocking pool
///
/// A task that panics reports [`JOIN_FAILED`] instead of propagating the
/// panic into the ring thread.
pub(crate) async fn blocking<F>(operation: F) -> isize
where
    F: FnOnce() -> isize + Send + 'static,
{
    compio::runtime::spawn_blocking(operation)
        .await
        .unwrap_or(JOIN_FAILED as isize)
}

/// Run a cheap metadata syscall, inline or on the blocking pool
///
/// With `cheap_calls_sync` (the default) the call runs on the ring thread;
/// these syscalls finish faster than a thread hand-off.
pub(crate) async fn cheap<F>(operation: F) -> i32
where
    F: FnOnce() -> i32 + Send + 'static,
{
    #[cfg(feature = "cheap_calls_sync")]
    {
        operation()
    }

    #[cfg(not(feature = "cheap_calls_sync"))]
    {
        narrow(blocking(move || operation() as isize).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strerror_ignores_sign() {
        assert_eq!(strerror(-libc::ENOENT), strerror(libc::ENOENT));
        assert_eq!(strerror(-libc::ENOENT), "No such file or directory");
    }

    #[test]
    fn test_strerror_eof() {
        assert_eq!(strerror(EOF), "end of file");
    }

    #[test]
    fn test_strerror_unknown_code() {
        assert!(strerror(-100_000).starts_with("unknown error"));
    }

    #[test]
    fn test_from_io_error() {
        let err = io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(from_io_error(&err), -libc::EACCES);

        let custom = io::Error::new(io::ErrorKind::Other, "no os code");
        assert_eq!(from_io_error(&custom), -libc::EIO);
    }

    #[test]
    fn test_from_result() {
        assert_eq!(from_result(&Ok(42)), 42);
        assert_eq!(
            from_result(&Err(io::Error::from_raw_os_error(libc::EBADF))),
            -(libc::EBADF as isize)
        );
    }
}
