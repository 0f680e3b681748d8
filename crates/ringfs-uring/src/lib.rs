//! # ringfs-uring
//!
//! Native filesystem operations on top of compio's io_uring driver.
//!
//! Every operation in this crate reports its outcome the way the kernel does:
//! a non-negative result (a descriptor, a byte count, zero) on success or a
//! negative errno on failure. Nothing here allocates error values; turning a
//! status into something a caller can read is left to the layer above, which
//! can use [`status::strerror`].
//!
//! Operations with an io_uring opcode are submitted through
//! `compio::runtime::submit`:
//!
//! - `openat`, `close`, `read`, `write` ([`file`])
//! - `mkdirat`, `unlinkat`, `renameat` ([`directory`])
//! - `statx` ([`metadata`])
//!
//! The rest run as plain syscalls, either inline or on compio's blocking
//! pool (see the `cheap_calls_sync` feature):
//!
//! - `chmod`, `chown` ([`metadata`])
//! - `ftruncate`, `sendfile` ([`file`])
//! - directory listing ([`directory::scandir`]), since the kernel has no
//!   `IORING_OP_GETDENTS64`
//!
//! ## Example
//!
//! ```rust,no_run
//! use ringfs_uring::{file, status};
//! use std::path::Path;
//!
//! # async fn example() {
//! let fd = file::open(Path::new("data.txt"), libc::O_RDONLY, 0).await;
//! if fd < 0 {
//!     eprintln!("open failed: {}", status::strerror(fd));
//!     return;
//! }
//! let (count, bytes) = file::read(fd, 4096).await;
//! println!("read {count} bytes ({} in buffer)", bytes.len());
//! file::close(fd).await;
//! # }
//! ```

#[cfg(not(target_os = "linux"))]
compile_error!("ringfs-uring requires Linux io_uring");

pub mod directory;
pub mod file;
pub mod metadata;
pub mod status;

pub use metadata::StatRecord;

/// Raw kernel file descriptor as handed out by `openat`
pub type RawFd = std::os::unix::io::RawFd;

/// Convert a path for the kernel, failing with `-EINVAL` on interior NULs
pub(crate) fn c_path(path: &std::path::Path) -> Result<std::ffi::CString, i32> {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::CString::new(path.as_os_str().as_bytes()).map_err(|_| -libc::EINVAL)
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Feature flags available
pub mod features {
    /// Run cheap metadata syscalls inline instead of on the blocking pool
    pub const CHEAP_CALLS_SYNC: &str = "cheap_calls_sync";
}
