//! Descriptor operations: open, close, read, write, truncate, sendfile
//!
//! `open`, `close`, `read` and `write` are io_uring submissions. `ftruncate`
//! and `sendfile` have no opcode on the kernels we target and run as plain
//! syscalls.

use crate::status::{self, blocking, cheap, narrow};
use crate::RawFd;
use compio::driver::OpCode;
use compio::runtime::submit;
use io_uring::{opcode, types};
use std::ffi::CString;
use std::path::Path;
use std::pin::Pin;

/// Offset value telling the kernel to use (and advance) the file position
const CURRENT_POSITION: u64 = u64::MAX;

/// io_uring OPENAT operation relative to the current working directory
pub struct OpenOp {
    /// Path to open
    path: CString,
    /// Native open flags (`O_*`)
    flags: i32,
    /// Creation mode, used with `O_CREAT`
    mode: u32,
}

impl OpenOp {
    /// Create a new open operation
    ///
    /// `O_CLOEXEC` is always added; descriptors never leak into child processes.
    #[must_use]
    pub fn new(path: CString, flags: i32, mode: u32) -> Self {
        Self {
            path,
            flags: flags | libc::O_CLOEXEC,
            mode,
        }
    }
}

impl OpCode for OpenOp {
    fn create_entry(self: Pin<&mut Self>) -> compio::driver::OpEntry {
        compio::driver::OpEntry::Submission(
            opcode::OpenAt::new(types::Fd(libc::AT_FDCWD), self.path.as_ptr())
                .flags(self.flags)
                .mode(self.mode)
                .build(),
        )
    }
}

/// io_uring CLOSE operation
pub struct CloseOp {
    /// Descriptor to close
    fd: RawFd,
}

impl OpCode for CloseOp {
    fn create_entry(self: Pin<&mut Self>) -> compio::driver::OpEntry {
        compio::driver::OpEntry::Submission(opcode::Close::new(types::Fd(self.fd)).build())
    }
}

/// io_uring READ operation into an owned buffer
pub struct ReadOp {
    /// Descriptor to read from
    fd: RawFd,
    /// Destination buffer; its length is the requested byte count
    buffer: Vec<u8>,
    /// File offset, or [`CURRENT_POSITION`]
    offset: u64,
}

impl OpCode for ReadOp {
    fn create_entry(mut self: Pin<&mut Self>) -> compio::driver::OpEntry {
        let len = u32::try_from(self.buffer.len()).unwrap_or(u32::MAX);
        let fd = self.fd;
        let offset = self.offset;
        compio::driver::OpEntry::Submission(
            opcode::Read::new(types::Fd(fd), self.buffer.as_mut_ptr(), len)
                .offset(offset)
                .build(),
        )
    }
}

/// io_uring WRITE operation from an owned buffer
pub struct WriteOp {
    /// Descriptor to write to
    fd: RawFd,
    /// Data to write
    buffer: Vec<u8>,
    /// File offset to write at
    offset: u64,
}

impl OpCode for WriteOp {
    fn create_entry(self: Pin<&mut Self>) -> compio::driver::OpEntry {
        let len = u32::try_from(self.buffer.len()).unwrap_or(u32::MAX);
        compio::driver::OpEntry::Submission(
            opcode::Write::new(types::Fd(self.fd), self.buffer.as_ptr(), len)
                .offset(self.offset)
                .build(),
        )
    }
}

/// Open `path` with native flags and creation mode
///
/// Returns the new descriptor or a negative errno.
pub async fn open(path: &Path, flags: i32, mode: u32) -> i32 {
    let path = match crate::c_path(path) {
        Ok(path) => path,
        Err(status) => return status,
    };
    let result = submit(OpenOp::new(path, flags, mode)).await;
    narrow(status::from_result(&result.0))
}

/// Close a descriptor
///
/// Returns zero or a negative errno.
pub async fn close(fd: RawFd) -> i32 {
    let result = submit(CloseOp { fd }).await;
    narrow(status::from_result(&result.0))
}

/// Read up to `len` bytes from the current file position
///
/// Returns the byte count (zero at end of file) or a negative errno, and the
/// buffer truncated to the bytes actually read.
pub async fn read(fd: RawFd, len: usize) -> (isize, Vec<u8>) {
    let op = ReadOp {
        fd,
        buffer: vec![0u8; len],
        offset: CURRENT_POSITION,
    };
    let result = submit(op).await;
    let count = status::from_result(&result.0);
    let mut buffer = result.1.buffer;
    buffer.truncate(usize::try_from(count).unwrap_or(0));
    (count, buffer)
}

/// Write `data` at `offset`
///
/// Offsets above `i64::MAX` are rejected with `EINVAL`; io_uring would read
/// `u64::MAX` as "use the file position". Returns the byte count or a
/// negative errno.
pub async fn write(fd: RawFd, data: Vec<u8>, offset: u64) -> isize {
    if libc::off_t::try_from(offset).is_err() {
        return -(libc::EINVAL as isize);
    }
    let result = submit(WriteOp {
        fd,
        buffer: data,
        offset,
    })
    .await;
    status::from_result(&result.0)
}

/// Truncate (or extend) an open file to `length` bytes
///
/// Returns zero or a negative errno.
pub async fn ftruncate(fd: RawFd, length: u64) -> i32 {
    let Ok(length) = libc::off_t::try_from(length) else {
        return -libc::EFBIG;
    };
    cheap(move || {
        // SAFETY: ftruncate only reads its integer arguments; an invalid fd
        // is reported through errno.
        let rc = unsafe { libc::ftruncate(fd, length) };
        if rc < 0 {
            status::last_os_status()
        } else {
            0
        }
    })
    .await
}

/// Copy `count` bytes from `in_fd` starting at `offset` to `out_fd`
///
/// Runs `sendfile(2)` on the blocking pool; it moves file data and can take
/// arbitrarily long. The input file position is left unchanged. Returns the
/// number of bytes transferred or a negative errno.
pub async fn sendfile(in_fd: RawFd, out_fd: RawFd, offset: u64, count: usize) -> isize {
    let Ok(mut offset) = libc::off_t::try_from(offset) else {
        return -(libc::EINVAL as isize);
    };
    log::trace!("sendfile {in_fd} -> {out_fd}, {count} bytes at {offset}");
    blocking(move || {
        // SAFETY: `offset` lives for the duration of the call and the kernel
        // validates both descriptors.
        let sent = unsafe { libc::sendfile(out_fd, in_fd, &mut offset, count) };
        if sent < 0 {
            status::last_os_status() as isize
        } else {
            sent
        }
    })
    .await
}
