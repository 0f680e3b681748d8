//! Metadata operations: stat, fstat, chmod, chown
//!
//! `stat` and `fstat` both go through io_uring `IORING_OP_STATX`; `fstat`
//! passes the descriptor with an empty path and `AT_EMPTY_PATH`. `chmod` and
//! `chown` have no opcode and use `nix` syscall wrappers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ringfs_uring::metadata;
//! use std::path::Path;
//!
//! # async fn example() {
//! match metadata::stat(Path::new("file.txt")).await {
//!     Ok(record) => println!("size {} mode {:o}", record.size, record.permissions()),
//!     Err(status) => eprintln!("stat failed: {}", ringfs_uring::status::strerror(status)),
//! }
//! # }
//! ```

use crate::status::{self, cheap};
use crate::RawFd;
use compio::driver::OpCode;
use compio::runtime::submit;
use io_uring::{opcode, types};
use std::ffi::CString;
use std::path::Path;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

/// STATX_BASIC_STATS plus STATX_BTIME
const STATX_MASK: u32 = 0x0000_0fff;

/// Immutable file metadata produced by stat/fstat
///
/// Fields mirror `struct stat`; timestamps keep nanosecond precision.
/// [`StatRecord::get`] gives name-based access for callers that treat the
/// record as a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
    /// Device ID (major << 32 | minor)
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    /// File mode (type + permissions)
    pub mode: u32,
    /// Number of hard links
    pub nlink: u64,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// Device ID for special files
    pub rdev: u64,
    /// File size in bytes
    pub size: u64,
    /// Preferred I/O block size
    pub blksize: u64,
    /// Number of 512-byte blocks allocated
    pub blocks: u64,
    /// Last access time
    pub accessed: SystemTime,
    /// Last modification time
    pub modified: SystemTime,
    /// Last status change time
    pub changed: SystemTime,
    /// Creation time, when the filesystem records it
    pub created: Option<SystemTime>,
}

impl StatRecord {
    /// Names accepted by [`StatRecord::get`]
    pub const FIELDS: [&'static str; 14] = [
        "dev", "ino", "mode", "nlink", "uid", "gid", "rdev", "size", "blksize", "blocks",
        "atime", "mtime", "ctime", "birthtime",
    ];

    /// Look up a field by its `struct stat` name
    ///
    /// Timestamps are returned as whole seconds since the Unix epoch
    /// (negative before it). Returns `None` for unknown names and for
    /// `birthtime` when the filesystem does not record it.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<i64> {
        let saturate = |value: u64| i64::try_from(value).unwrap_or(i64::MAX);
        match field {
            "dev" => Some(saturate(self.dev)),
            "ino" => Some(saturate(self.ino)),
            "mode" => Some(i64::from(self.mode)),
            "nlink" => Some(saturate(self.nlink)),
            "uid" => Some(i64::from(self.uid)),
            "gid" => Some(i64::from(self.gid)),
            "rdev" => Some(saturate(self.rdev)),
            "size" => Some(saturate(self.size)),
            "blksize" => Some(saturate(self.blksize)),
            "blocks" => Some(saturate(self.blocks)),
            "atime" => Some(unix_seconds(self.accessed)),
            "mtime" => Some(unix_seconds(self.modified)),
            "ctime" => Some(unix_seconds(self.changed)),
            "birthtime" => self.created.map(unix_seconds),
            _ => None,
        }
    }

    /// Check if this is a regular file
    #[must_use]
    pub fn is_file(&self) -> bool {
        (self.mode & libc::S_IFMT) == libc::S_IFREG
    }

    /// Check if this is a directory
    #[must_use]
    pub fn is_dir(&self) -> bool {
        (self.mode & libc::S_IFMT) == libc::S_IFDIR
    }

    /// Check if this is a symlink
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        (self.mode & libc::S_IFMT) == libc::S_IFLNK
    }

    /// Get file permissions (mode & 0o7777)
    #[must_use]
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    fn from_statx(buf: &libc::statx) -> Self {
        let created = (buf.stx_mask & libc::STATX_BTIME != 0)
            .then(|| statx_ts_to_system_time(&buf.stx_btime));
        Self {
            dev: u64::from(buf.stx_dev_major) << 32 | u64::from(buf.stx_dev_minor),
            ino: buf.stx_ino,
            mode: u32::from(buf.stx_mode),
            nlink: u64::from(buf.stx_nlink),
            uid: buf.stx_uid,
            gid: buf.stx_gid,
            rdev: u64::from(buf.stx_rdev_major) << 32 | u64::from(buf.stx_rdev_minor),
            size: buf.stx_size,
            blksize: u64::from(buf.stx_blksize),
            blocks: buf.stx_blocks,
            accessed: statx_ts_to_system_time(&buf.stx_atime),
            modified: statx_ts_to_system_time(&buf.stx_mtime),
            changed: statx_ts_to_system_time(&buf.stx_ctime),
            created,
        }
    }
}

fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_secs()).unwrap_or(i64::MAX),
    }
}

fn statx_ts_to_system_time(ts: &libc::statx_timestamp) -> SystemTime {
    let nsec = ts.tv_nsec;
    if ts.tv_sec >= 0 {
        SystemTime::UNIX_EPOCH + Duration::new(ts.tv_sec.unsigned_abs(), nsec)
    } else {
        // Saturate: if subtraction underflows, clamp to UNIX_EPOCH
        SystemTime::UNIX_EPOCH
            .checked_sub(Duration::new(ts.tv_sec.unsigned_abs(), nsec))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

/// io_uring STATX operation
pub struct StatxOp {
    /// Directory file descriptor (AT_FDCWD for path lookups, the target fd for fstat)
    dirfd: RawFd,
    /// Path to the file (empty with AT_EMPTY_PATH)
    pathname: CString,
    /// Buffer for statx result
    statxbuf: Box<libc::statx>,
    /// Flags for statx operation
    flags: i32,
}

impl StatxOp {
    /// Create a new statx operation
    #[must_use]
    pub fn new(dirfd: RawFd, pathname: CString, flags: i32) -> Self {
        Self {
            dirfd,
            pathname,
            // SAFETY: libc::statx is plain old data; all-zero is a valid value
            statxbuf: Box::new(unsafe { std::mem::zeroed() }),
            flags,
        }
    }
}

impl OpCode for StatxOp {
    fn create_entry(mut self: Pin<&mut Self>) -> compio::driver::OpEntry {
        let statxbuf = &mut *self.statxbuf as *mut libc::statx as *mut types::statx;
        compio::driver::OpEntry::Submission(
            opcode::Statx::new(types::Fd(self.dirfd), self.pathname.as_ptr(), statxbuf)
                .flags(self.flags)
                .mask(STATX_MASK)
                .build(),
        )
    }
}

async fn statx(op: StatxOp) -> Result<StatRecord, i32> {
    let result = submit(op).await;
    match result.0 {
        Ok(_) => Ok(StatRecord::from_statx(&result.1.statxbuf)),
        Err(e) => Err(status::from_io_error(&e)),
    }
}

/// Get metadata for a path, following symlinks
///
/// # Errors
///
/// Returns the negative errno reported by the kernel.
pub async fn stat(path: &Path) -> Result<StatRecord, i32> {
    let pathname = crate::c_path(path)?;
    statx(StatxOp::new(libc::AT_FDCWD, pathname, 0)).await
}

/// Get metadata for an open descriptor
///
/// # Errors
///
/// Returns the negative errno reported by the kernel (`-EBADF` for an
/// invalid descriptor).
pub async fn fstat(fd: RawFd) -> Result<StatRecord, i32> {
    statx(StatxOp::new(fd, CString::default(), libc::AT_EMPTY_PATH)).await
}

/// Change permission bits of a path, following symlinks
///
/// Returns zero or a negative errno.
pub async fn chmod(path: &Path, mode: u32) -> i32 {
    use nix::sys::stat::{fchmodat, FchmodatFlags, Mode};

    let path = path.to_path_buf();
    cheap(move || {
        match fchmodat(
            None,
            path.as_path(),
            Mode::from_bits_truncate(mode as libc::mode_t),
            FchmodatFlags::FollowSymlink,
        ) {
            Ok(()) => 0,
            Err(errno) => -(errno as i32),
        }
    })
    .await
}

/// Change owner and group of a path, following symlinks
///
/// Returns zero or a negative errno.
pub async fn chown(path: &Path, uid: u32, gid: u32) -> i32 {
    use nix::unistd::{Gid, Uid};

    let path = path.to_path_buf();
    cheap(move || {
        match nix::unistd::chown(
            path.as_path(),
            Some(Uid::from_raw(uid)),
            Some(Gid::from_raw(gid)),
        ) {
            Ok(()) => 0,
            Err(errno) => -(errno as i32),
        }
    })
    .await
}
