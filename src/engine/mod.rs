//! Callback-driven native engines
//!
//! An [`Engine`] performs native filesystem calls and reports each outcome
//! through a one-shot callback. Statuses follow the native convention: a
//! non-negative value is the result, a negative value is `-errno` (or
//! [`EOF`]).
//!
//! Two engines ship with the crate:
//!
//! - [`UringEngine`] submits to the io_uring driver of the current compio
//!   runtime.
//! - [`MemoryEngine`] keeps a tree in memory and counts open descriptors,
//!   for deterministic tests.

mod memory;
mod uring;

pub use memory::{MemoryEngine, Primitive};
pub use ringfs_uring::StatRecord;
pub use uring::UringEngine;

use std::path::Path;

/// End-of-file status reported for reads that return no bytes
pub const EOF: i32 = ringfs_uring::status::EOF;

/// One-shot callback an engine invokes with a native outcome
pub type NativeCallback<A> = Box<dyn FnOnce(A)>;

/// Open file handle returned by `open`
///
/// The caller owns it and is responsible for closing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(i32);

impl Descriptor {
    /// Wrap a raw native descriptor
    #[must_use]
    pub const fn from_raw(fd: i32) -> Self {
        Self(fd)
    }

    /// The raw native descriptor
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Native dispatch context
///
/// Every method submits one native call and returns without blocking. The
/// callback is invoked exactly once with the outcome, possibly before the
/// method returns.
pub trait Engine: 'static {
    /// Create a directory
    fn mkdir(&self, path: &Path, mode: u32, callback: NativeCallback<i32>);

    /// Remove an empty directory
    fn rmdir(&self, path: &Path, callback: NativeCallback<i32>);

    /// List a directory: entry count (or failure status) and names
    fn scandir(&self, path: &Path, flags: i32, callback: NativeCallback<(i32, Vec<String>)>);

    /// Open a file with native flags: descriptor or failure status
    fn open(&self, path: &Path, flags: i32, mode: u32, callback: NativeCallback<i32>);

    /// Write `data` at `offset`: bytes written or failure status
    fn write(
        &self,
        fd: Descriptor,
        data: Vec<u8>,
        offset: u64,
        callback: NativeCallback<(Descriptor, isize)>,
    );

    /// Close a descriptor
    fn close(&self, fd: Descriptor, callback: NativeCallback<i32>);

    /// Read up to `len` bytes from the current position
    ///
    /// Reports zero bytes at end of file, and the bytes actually read.
    fn read(&self, fd: Descriptor, len: usize, callback: NativeCallback<(Descriptor, isize, Vec<u8>)>);

    /// Rename `from` to `to`
    fn rename(&self, from: &Path, to: &Path, callback: NativeCallback<i32>);

    /// Set permission bits
    fn chmod(&self, path: &Path, mode: u32, callback: NativeCallback<i32>);

    /// Set owner and group
    fn chown(&self, path: &Path, uid: u32, gid: u32, callback: NativeCallback<i32>);

    /// Remove a file
    fn unlink(&self, path: &Path, callback: NativeCallback<i32>);

    /// Truncate or extend an open file to `length` bytes
    fn ftruncate(&self, fd: Descriptor, length: u64, callback: NativeCallback<i32>);

    /// Metadata by path
    fn stat(&self, path: &Path, callback: NativeCallback<(i32, Option<StatRecord>)>);

    /// Metadata by descriptor
    fn fstat(&self, fd: Descriptor, callback: NativeCallback<(i32, Option<StatRecord>)>);

    /// Copy `len` bytes from `input` at `offset` to `output`
    fn sendfile(
        &self,
        input: Descriptor,
        output: Descriptor,
        offset: u64,
        len: usize,
        callback: NativeCallback<isize>,
    );

    /// Describe a native status
    fn strerror(status: i32) -> String
    where
        Self: Sized,
    {
        ringfs_uring::status::strerror(status)
    }
}
