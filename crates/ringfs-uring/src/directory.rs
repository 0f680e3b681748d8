//! Namespace operations: mkdir, rmdir, unlink, rename, scandir

use crate::status::{self, narrow};
use compio::driver::OpCode;
use compio::runtime::submit;
use io_uring::{opcode, types};
use std::ffi::CString;
use std::path::Path;
use std::pin::Pin;

/// io_uring MKDIRAT operation relative to the current working directory
pub struct MkdirOp {
    /// Directory to create
    path: CString,
    /// Permissions for the new directory (before umask)
    mode: u32,
}

impl OpCode for MkdirOp {
    fn create_entry(self: Pin<&mut Self>) -> compio::driver::OpEntry {
        compio::driver::OpEntry::Submission(
            opcode::MkDirAt::new(types::Fd(libc::AT_FDCWD), self.path.as_ptr())
                .mode(self.mode)
                .build(),
        )
    }
}

/// io_uring UNLINKAT operation, removing either a file or an empty directory
pub struct UnlinkOp {
    /// Entry to remove
    path: CString,
    /// `0` for files, `AT_REMOVEDIR` for directories
    flags: i32,
}

impl OpCode for UnlinkOp {
    fn create_entry(self: Pin<&mut Self>) -> compio::driver::OpEntry {
        compio::driver::OpEntry::Submission(
            opcode::UnlinkAt::new(types::Fd(libc::AT_FDCWD), self.path.as_ptr())
                .flags(self.flags)
                .build(),
        )
    }
}

/// io_uring RENAMEAT operation
pub struct RenameOp {
    /// Existing path
    from: CString,
    /// New path
    to: CString,
}

impl OpCode for RenameOp {
    fn create_entry(self: Pin<&mut Self>) -> compio::driver::OpEntry {
        compio::driver::OpEntry::Submission(
            opcode::RenameAt::new(
                types::Fd(libc::AT_FDCWD),
                self.from.as_ptr(),
                types::Fd(libc::AT_FDCWD),
                self.to.as_ptr(),
            )
            .build(),
        )
    }
}

/// Create a directory
///
/// Returns zero or a negative errno (`-EEXIST` if the path exists).
pub async fn mkdir(path: &Path, mode: u32) -> i32 {
    let path = match crate::c_path(path) {
        Ok(path) => path,
        Err(status) => return status,
    };
    let result = submit(MkdirOp { path, mode }).await;
    narrow(status::from_result(&result.0))
}

/// Remove an empty directory
pub async fn rmdir(path: &Path) -> i32 {
    unlink_with(path, libc::AT_REMOVEDIR).await
}

/// Remove a file
pub async fn unlink(path: &Path) -> i32 {
    unlink_with(path, 0).await
}

async fn unlink_with(path: &Path, flags: i32) -> i32 {
    let path = match crate::c_path(path) {
        Ok(path) => path,
        Err(status) => return status,
    };
    let result = submit(UnlinkOp { path, flags }).await;
    narrow(status::from_result(&result.0))
}

/// Rename `from` to `to`, replacing `to` if it exists
pub async fn rename(from: &Path, to: &Path) -> i32 {
    let (from, to) = match (crate::c_path(from), crate::c_path(to)) {
        (Ok(from), Ok(to)) => (from, to),
        (Err(status), _) | (_, Err(status)) => return status,
    };
    let result = submit(RenameOp { from, to }).await;
    narrow(status::from_result(&result.0))
}

/// List the entry names of a directory
///
/// Names are sorted bytewise and exclude `.` and `..`. Non-UTF-8 names are
/// converted lossily.
///
/// NOTE: Linux has no IORING_OP_GETDENTS64, so the listing runs on the
/// blocking pool through `std::fs::read_dir`.
///
/// Returns the number of entries (or a negative errno) and the names.
pub async fn scandir(path: &Path) -> (i32, Vec<String>) {
    let path_owned = path.to_path_buf();
    let (count, names) = compio::runtime::spawn_blocking(move || list_names(&path_owned))
        .await
        .unwrap_or((status::JOIN_FAILED, Vec::new()));
    log::trace!("scandir {} -> {count}", path.display());
    (count, names)
}

fn list_names(path: &Path) -> (i32, Vec<String>) {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => return (status::from_io_error(&e), Vec::new()),
    };
    let mut names = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => names.push(entry.file_name().to_string_lossy().into_owned()),
            Err(e) => return (status::from_io_error(&e), Vec::new()),
        }
    }
    names.sort();
    (narrow(names.len() as isize), names)
}
