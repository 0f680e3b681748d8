//! Future-returning filesystem operations
//!
//! [`Filesystem`] turns each callback-style engine primitive into a
//! [`Completion`]. Every method submits exactly one native call, returns
//! immediately, and settles the completion exactly once from a loop task:
//! resolved with the operation's natural result, or rejected with the
//! [`IoError`](crate::IoError) for the native status.
//!
//! There are no retries and no timeouts. Dropping every handle to a
//! completion only discards the result; the native call still runs.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ringfs::{CompioLoop, Filesystem, OpenFlags};
//!
//! #[compio::main]
//! async fn main() -> ringfs::Result<()> {
//!     let fs = Filesystem::new(CompioLoop::new());
//!     let fd = fs
//!         .open_with("/tmp/hello.txt", OpenFlags::WRITE_ONLY | OpenFlags::CREATE, 0o644)
//!         .await?;
//!     fs.write(fd, b"hello".to_vec()).await?;
//!     fs.close(fd).await?;
//!     Ok(())
//! }
//! ```

use crate::completion::{Completion, Deferred};
use crate::engine::{Descriptor, Engine, NativeCallback, StatRecord, EOF};
use crate::error::ErrorMapper;
use crate::event_loop::EventLoop;
use crate::flags::{FlagTranslator, NativeFlagTranslator, OpenFlags};
use crate::options::Options;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, trace};

/// A native callback argument normalized to success or failure
pub(crate) enum Outcome<T> {
    Done(T),
    Failed(i32),
}

impl<T> Outcome<T> {
    /// Success with `value` unless `status` is negative
    fn from_status(status: i32, value: T) -> Self {
        if status < 0 {
            Self::Failed(status)
        } else {
            Self::Done(value)
        }
    }
}

/// Narrow a byte-count status to an errno-sized status
fn narrow(status: isize) -> i32 {
    i32::try_from(status).unwrap_or(-libc::EOVERFLOW)
}

/// Byte count on success, failure for negative counts
fn byte_count(count: isize) -> Outcome<usize> {
    match usize::try_from(count) {
        Ok(count) => Outcome::Done(count),
        Err(_) => Outcome::Failed(narrow(count)),
    }
}

fn stat_record((status, record): (i32, Option<StatRecord>)) -> Outcome<StatRecord> {
    match record {
        Some(record) if status >= 0 => Outcome::Done(record),
        // A successful status without a record is an engine fault
        _ if status >= 0 => Outcome::Failed(-libc::EIO),
        _ => Outcome::Failed(status),
    }
}

/// Asynchronous filesystem over an event loop's engine
///
/// Cheap to clone; clones share the loop, options and flag translator.
pub struct Filesystem<L: EventLoop> {
    event_loop: L,
    options: Options,
    translator: Rc<dyn FlagTranslator>,
    mapper: ErrorMapper,
}

impl<L: EventLoop> Clone for Filesystem<L> {
    fn clone(&self) -> Self {
        Self {
            event_loop: self.event_loop.clone(),
            options: self.options,
            translator: Rc::clone(&self.translator),
            mapper: self.mapper,
        }
    }
}

impl<L: EventLoop> std::fmt::Debug for Filesystem<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filesystem")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<L: EventLoop> Filesystem<L> {
    /// Create a filesystem with default options and native flags
    #[must_use]
    pub fn new(event_loop: L) -> Self {
        Self::with_options(event_loop, Options::default())
    }

    /// Create a filesystem with custom defaults
    #[must_use]
    pub fn with_options(event_loop: L, options: Options) -> Self {
        Self::with_translator(event_loop, options, Rc::new(NativeFlagTranslator))
    }

    /// Create a filesystem with a custom flag translator
    #[must_use]
    pub fn with_translator(
        event_loop: L,
        options: Options,
        translator: Rc<dyn FlagTranslator>,
    ) -> Self {
        Self {
            event_loop,
            options,
            translator,
            mapper: ErrorMapper::new(<L::Engine as Engine>::strerror),
        }
    }

    /// The loop this filesystem schedules continuations on
    pub fn event_loop(&self) -> &L {
        &self.event_loop
    }

    /// Defaults in effect
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Mapper used to build errors from native statuses
    pub fn error_mapper(&self) -> ErrorMapper {
        self.mapper
    }

    fn engine(&self) -> &L::Engine {
        self.event_loop.engine()
    }

    /// Pair a pending completion with the native callback that settles it
    ///
    /// `normalize` turns the callback's argument into an [`Outcome`]; the
    /// callback runs it as a loop task. If the engine drops the callback
    /// without calling it, the completion rejects with `ECANCELED` right
    /// away, on the stack that dropped the callback.
    pub(crate) fn bridge<A, T, N>(
        &self,
        operation: &'static str,
        normalize: N,
    ) -> (Completion<T>, NativeCallback<A>)
    where
        A: 'static,
        T: 'static,
        N: FnOnce(A) -> Outcome<T> + 'static,
    {
        let (deferred, completion) = Deferred::new(self.mapper);
        let mapper = self.mapper;
        trace!("{operation}: submitted");
        let callback = self
            .event_loop
            .task_callback(move |native: A| match normalize(native) {
                Outcome::Done(value) => {
                    trace!("{operation}: done");
                    deferred.resolve(value);
                }
                Outcome::Failed(status) => {
                    let error = mapper.from_status(status);
                    debug!("{operation}: failed with {status} ({error})");
                    deferred.reject(error);
                }
            });
        (completion, callback)
    }

    /// Create a directory with the default mode, resolving with its path
    pub fn mkdir(&self, path: impl AsRef<Path>) -> Completion<PathBuf> {
        self.mkdir_with_mode(path, self.options.dir_mode())
    }

    /// Create a directory with `mode`, resolving with its path
    pub fn mkdir_with_mode(&self, path: impl AsRef<Path>, mode: u32) -> Completion<PathBuf> {
        let path = path.as_ref();
        let created = path.to_path_buf();
        let (completion, callback) =
            self.bridge("mkdir", move |status: i32| Outcome::from_status(status, created));
        self.engine().mkdir(path, mode, callback);
        completion
    }

    /// Remove an empty directory, resolving with its path
    pub fn rmdir(&self, path: impl AsRef<Path>) -> Completion<PathBuf> {
        let path = path.as_ref();
        let removed = path.to_path_buf();
        let (completion, callback) =
            self.bridge("rmdir", move |status: i32| Outcome::from_status(status, removed));
        self.engine().rmdir(path, callback);
        completion
    }

    /// List the entry names of a directory, excluding `.` and `..`
    pub fn scandir(&self, path: impl AsRef<Path>) -> Completion<Vec<String>> {
        let (completion, callback) = self.bridge("scandir", |(status, names): (i32, Vec<String>)| {
            Outcome::from_status(status, names)
        });
        self.engine().scandir(path.as_ref(), 0, callback);
        completion
    }

    /// Open a file with the default flags and mode
    pub fn open(&self, path: impl AsRef<Path>) -> Completion<Descriptor> {
        self.open_with(path, self.options.open_flags(), self.options.file_mode())
    }

    /// Open a file with portable `flags` and creation `mode`
    pub fn open_with(
        &self,
        path: impl AsRef<Path>,
        flags: OpenFlags,
        mode: u32,
    ) -> Completion<Descriptor> {
        let native = self.translator.convert(flags.bits());
        let (completion, callback) = self.bridge("open", |fd: i32| {
            Outcome::from_status(fd, Descriptor::from_raw(fd))
        });
        self.engine().open(path.as_ref(), native, mode, callback);
        completion
    }

    /// Write `data` at offset zero, resolving with the bytes written
    pub fn write(&self, fd: Descriptor, data: impl Into<Vec<u8>>) -> Completion<usize> {
        self.write_at(fd, data, 0)
    }

    /// Write `data` at `offset`, resolving with the bytes written
    ///
    /// Offsets above `i64::MAX` reject with `EINVAL` on every engine.
    pub fn write_at(
        &self,
        fd: Descriptor,
        data: impl Into<Vec<u8>>,
        offset: u64,
    ) -> Completion<usize> {
        let (completion, callback) =
            self.bridge("write", |(_, count): (Descriptor, isize)| byte_count(count));
        self.engine().write(fd, data.into(), offset, callback);
        completion
    }

    /// Close a descriptor, resolving with the native status
    pub fn close(&self, fd: Descriptor) -> Completion<i32> {
        let (completion, callback) =
            self.bridge("close", |status: i32| Outcome::from_status(status, status));
        self.engine().close(fd, callback);
        completion
    }

    /// Read up to `length` bytes from the descriptor's current position
    ///
    /// A read that returns no bytes rejects with the end-of-file status
    /// ([`EOF`]).
    pub fn read(&self, fd: Descriptor, length: usize) -> Completion<Vec<u8>> {
        let (completion, callback) = self.bridge(
            "read",
            |(_, count, buffer): (Descriptor, isize, Vec<u8>)| match count {
                0 => Outcome::Failed(EOF),
                count if count < 0 => Outcome::Failed(narrow(count)),
                _ => Outcome::Done(buffer),
            },
        );
        self.engine().read(fd, length, callback);
        completion
    }

    /// Rename `from` to `to`, resolving with `to`
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Completion<PathBuf> {
        let to = to.as_ref();
        let destination = to.to_path_buf();
        let (completion, callback) =
            self.bridge("rename", move |status: i32| Outcome::from_status(status, destination));
        self.engine().rename(from.as_ref(), to, callback);
        completion
    }

    /// Set permission bits, resolving with the path
    pub fn chmod(&self, path: impl AsRef<Path>, mode: u32) -> Completion<PathBuf> {
        let path = path.as_ref();
        let changed = path.to_path_buf();
        let (completion, callback) =
            self.bridge("chmod", move |status: i32| Outcome::from_status(status, changed));
        self.engine().chmod(path, mode, callback);
        completion
    }

    /// Set owner and group, resolving with the path
    ///
    /// `u32::MAX` leaves the corresponding id unchanged.
    pub fn chown(&self, path: impl AsRef<Path>, uid: u32, gid: u32) -> Completion<PathBuf> {
        let path = path.as_ref();
        let changed = path.to_path_buf();
        let (completion, callback) =
            self.bridge("chown", move |status: i32| Outcome::from_status(status, changed));
        self.engine().chown(path, uid, gid, callback);
        completion
    }

    /// Remove a file, resolving with its path
    pub fn unlink(&self, path: impl AsRef<Path>) -> Completion<PathBuf> {
        let path = path.as_ref();
        let removed = path.to_path_buf();
        let (completion, callback) =
            self.bridge("unlink", move |status: i32| Outcome::from_status(status, removed));
        self.engine().unlink(path, callback);
        completion
    }

    /// Truncate or extend an open file to `length` bytes
    ///
    /// Resolves with the descriptor so calls can be chained.
    pub fn truncate(&self, fd: Descriptor, length: u64) -> Completion<Descriptor> {
        let (completion, callback) =
            self.bridge("truncate", move |status: i32| Outcome::from_status(status, fd));
        self.engine().ftruncate(fd, length, callback);
        completion
    }

    /// Metadata by path
    pub fn stat(&self, path: impl AsRef<Path>) -> Completion<StatRecord> {
        let (completion, callback) = self.bridge("stat", stat_record);
        self.engine().stat(path.as_ref(), callback);
        completion
    }

    /// Metadata by descriptor
    pub fn fstat(&self, fd: Descriptor) -> Completion<StatRecord> {
        let (completion, callback) = self.bridge("fstat", stat_record);
        self.engine().fstat(fd, callback);
        completion
    }

    /// Copy `length` bytes of `input`, starting at `offset`, to `output`
    ///
    /// Resolves with the number of bytes transferred, which is short when
    /// `input` ends first. The position of `input` is not changed.
    pub fn sendfile(
        &self,
        input: Descriptor,
        output: Descriptor,
        offset: u64,
        length: usize,
    ) -> Completion<usize> {
        let (completion, callback) = self.bridge("sendfile", byte_count);
        self.engine()
            .sendfile(input, output, offset, length, callback);
        completion
    }
}
