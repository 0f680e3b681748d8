//! Engine backed by the io_uring driver of the current compio runtime

use super::{Descriptor, Engine, NativeCallback, StatRecord};
use ringfs_uring::{directory, file, metadata};
use std::future::Future;
use std::path::Path;

/// io_uring engine
///
/// Each call spawns a task on the current compio runtime that awaits the
/// native operation and then invokes the callback. Calling any method
/// outside a compio runtime panics inside `compio::runtime::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UringEngine;

impl UringEngine {
    /// Create an engine for the current runtime
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn dispatch<F, A>(operation: F, callback: NativeCallback<A>)
    where
        F: Future<Output = A> + 'static,
        A: 'static,
    {
        compio::runtime::spawn(async move { callback(operation.await) }).detach();
    }
}

fn stat_outcome(result: Result<StatRecord, i32>) -> (i32, Option<StatRecord>) {
    match result {
        Ok(record) => (0, Some(record)),
        Err(status) => (status, None),
    }
}

impl Engine for UringEngine {
    fn mkdir(&self, path: &Path, mode: u32, callback: NativeCallback<i32>) {
        let path = path.to_path_buf();
        Self::dispatch(async move { directory::mkdir(&path, mode).await }, callback);
    }

    fn rmdir(&self, path: &Path, callback: NativeCallback<i32>) {
        let path = path.to_path_buf();
        Self::dispatch(async move { directory::rmdir(&path).await }, callback);
    }

    fn scandir(&self, path: &Path, _flags: i32, callback: NativeCallback<(i32, Vec<String>)>) {
        let path = path.to_path_buf();
        Self::dispatch(async move { directory::scandir(&path).await }, callback);
    }

    fn open(&self, path: &Path, flags: i32, mode: u32, callback: NativeCallback<i32>) {
        let path = path.to_path_buf();
        Self::dispatch(async move { file::open(&path, flags, mode).await }, callback);
    }

    fn write(
        &self,
        fd: Descriptor,
        data: Vec<u8>,
        offset: u64,
        callback: NativeCallback<(Descriptor, isize)>,
    ) {
        Self::dispatch(
            async move { (fd, file::write(fd.as_raw(), data, offset).await) },
            callback,
        );
    }

    fn close(&self, fd: Descriptor, callback: NativeCallback<i32>) {
        Self::dispatch(file::close(fd.as_raw()), callback);
    }

    fn read(&self, fd: Descriptor, len: usize, callback: NativeCallback<(Descriptor, isize, Vec<u8>)>) {
        Self::dispatch(
            async move {
                let (count, buffer) = file::read(fd.as_raw(), len).await;
                (fd, count, buffer)
            },
            callback,
        );
    }

    fn rename(&self, from: &Path, to: &Path, callback: NativeCallback<i32>) {
        let (from, to) = (from.to_path_buf(), to.to_path_buf());
        Self::dispatch(async move { directory::rename(&from, &to).await }, callback);
    }

    fn chmod(&self, path: &Path, mode: u32, callback: NativeCallback<i32>) {
        let path = path.to_path_buf();
        Self::dispatch(async move { metadata::chmod(&path, mode).await }, callback);
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32, callback: NativeCallback<i32>) {
        let path = path.to_path_buf();
        Self::dispatch(async move { metadata::chown(&path, uid, gid).await }, callback);
    }

    fn unlink(&self, path: &Path, callback: NativeCallback<i32>) {
        let path = path.to_path_buf();
        Self::dispatch(async move { directory::unlink(&path).await }, callback);
    }

    fn ftruncate(&self, fd: Descriptor, length: u64, callback: NativeCallback<i32>) {
        Self::dispatch(file::ftruncate(fd.as_raw(), length), callback);
    }

    fn stat(&self, path: &Path, callback: NativeCallback<(i32, Option<StatRecord>)>) {
        let path = path.to_path_buf();
        Self::dispatch(
            async move { stat_outcome(metadata::stat(&path).await) },
            callback,
        );
    }

    fn fstat(&self, fd: Descriptor, callback: NativeCallback<(i32, Option<StatRecord>)>) {
        Self::dispatch(
            async move { stat_outcome(metadata::fstat(fd.as_raw()).await) },
            callback,
        );
    }

    fn sendfile(
        &self,
        input: Descriptor,
        output: Descriptor,
        offset: u64,
        len: usize,
        callback: NativeCallback<isize>,
    ) {
        Self::dispatch(
            file::sendfile(input.as_raw(), output.as_raw(), offset, len),
            callback,
        );
    }
}
