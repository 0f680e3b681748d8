//! Multi-step operations built from the primitives
//!
//! Both composites own every descriptor they open and close it on every
//! exit path, success or failure.
//!
//! `read_file` runs as a small state machine driven by completion
//! continuations:
//!
//! ```text
//!            stat ─┐
//!   Start ─>       ├─> WaitBoth ─> Reading ─> Finished
//!            open ─┘       │
//!                          └─ either fails ──────> Finished
//! ```

use crate::completion::{Completion, Deferred};
use crate::engine::{Descriptor, StatRecord};
use crate::error::Result;
use crate::event_loop::EventLoop;
use crate::filesystem::Filesystem;
use crate::flags::OpenFlags;
use crate::IoError;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Close `fd` without waiting; a failure is only logged
fn close_quietly<L: EventLoop>(fs: &Filesystem<L>, fd: Descriptor) {
    fs.close(fd).on_settled(move |result| {
        if let Err(error) = result {
            warn!("close of {fd} failed during cleanup: {error}");
        }
    });
}

/// What stat reported about the file being read
#[derive(Clone, Copy)]
struct Extent {
    size: u64,
    regular: bool,
}

impl From<&StatRecord> for Extent {
    fn from(record: &StatRecord) -> Self {
        Self {
            size: record.size,
            regular: record.is_file(),
        }
    }
}

enum Phase {
    /// Waiting for stat and open; holds whichever has resolved
    WaitBoth {
        extent: Option<Extent>,
        fd: Option<Descriptor>,
    },
    Reading,
    Finished,
}

/// What a continuation asks the machine to do next
enum Step {
    Wait,
    Read(Descriptor, Extent),
    Fail(IoError, Option<Descriptor>),
    Close(Descriptor),
}

struct ReadFile<L: EventLoop> {
    fs: Filesystem<L>,
    path: PathBuf,
    phase: Phase,
    deferred: Option<Deferred<Vec<u8>>>,
}

impl<L: EventLoop> ReadFile<L> {
    fn on_stat(machine: &Rc<RefCell<Self>>, result: &Result<StatRecord>) {
        let step = match (&mut machine.borrow_mut().phase, result) {
            (Phase::WaitBoth { extent, fd }, Ok(record)) => match fd {
                Some(fd) => Step::Read(*fd, Extent::from(record)),
                None => {
                    *extent = Some(Extent::from(record));
                    Step::Wait
                }
            },
            (Phase::WaitBoth { fd, .. }, Err(error)) => Step::Fail(error.clone(), fd.take()),
            _ => Step::Wait,
        };
        Self::advance(machine, step);
    }

    fn on_open(machine: &Rc<RefCell<Self>>, result: &Result<Descriptor>) {
        let step = match (&mut machine.borrow_mut().phase, result) {
            (Phase::WaitBoth { extent, fd }, Ok(opened)) => match extent {
                Some(extent) => Step::Read(*opened, *extent),
                None => {
                    *fd = Some(*opened);
                    Step::Wait
                }
            },
            (Phase::WaitBoth { .. }, Err(error)) => Step::Fail(error.clone(), None),
            // stat already failed; nobody else will close this descriptor
            (Phase::Finished, Ok(opened)) => Step::Close(*opened),
            _ => Step::Wait,
        };
        Self::advance(machine, step);
    }

    fn advance(machine: &Rc<RefCell<Self>>, step: Step) {
        let fs = machine.borrow().fs.clone();
        match step {
            Step::Wait => {}
            Step::Close(fd) => {
                trace!("read_file: closing late {fd}");
                close_quietly(&fs, fd);
            }
            Step::Fail(error, fd) => {
                if let Some(fd) = fd {
                    close_quietly(&fs, fd);
                }
                Self::finish(machine, Err(error));
            }
            Step::Read(fd, Extent { size, regular }) => {
                machine.borrow_mut().phase = Phase::Reading;
                trace!("read_file: reading {size} bytes from {fd}");
                if regular && size == 0 {
                    close_quietly(&fs, fd);
                    Self::finish(machine, Ok(Vec::new()));
                    return;
                }
                // Directories and special files may report size 0; the read
                // still has to go out so the engine can reject it
                let Ok(length) = usize::try_from(size.max(1)) else {
                    close_quietly(&fs, fd);
                    let error = fs.error_mapper().from_status(-libc::EFBIG);
                    Self::finish(machine, Err(error));
                    return;
                };
                let machine = Rc::clone(machine);
                fs.read(fd, length).on_settled(move |result| {
                    let fs = machine.borrow().fs.clone();
                    close_quietly(&fs, fd);
                    Self::finish(&machine, result.clone());
                });
            }
        }
    }

    fn finish(machine: &Rc<RefCell<Self>>, result: Result<Vec<u8>>) {
        let (deferred, path) = {
            let mut this = machine.borrow_mut();
            this.phase = Phase::Finished;
            (this.deferred.take(), this.path.clone())
        };
        match &result {
            Ok(bytes) => trace!("read_file {}: {} bytes", path.display(), bytes.len()),
            Err(error) => debug!("read_file {}: {error}", path.display()),
        }
        if let Some(deferred) = deferred {
            deferred.settle(result);
        }
    }
}

impl<L: EventLoop> Filesystem<L> {
    /// Read a whole file
    ///
    /// Issues `stat` and `open` concurrently, reads `size` bytes once both
    /// have resolved, then closes the descriptor without waiting for the
    /// close. Rejects with the first error from stat, open or read. An
    /// empty regular file resolves with an empty buffer without issuing a
    /// read; anything else, such as a directory, is always read.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Completion<Vec<u8>> {
        let path = path.as_ref();
        let (deferred, completion) = Deferred::new(self.error_mapper());
        let machine = Rc::new(RefCell::new(ReadFile {
            fs: self.clone(),
            path: path.to_path_buf(),
            phase: Phase::WaitBoth {
                extent: None,
                fd: None,
            },
            deferred: Some(deferred),
        }));

        trace!("read_file {}: start", path.display());
        let stat = self.stat(path);
        let open = self.open_with(path, OpenFlags::READ_ONLY, self.options().file_mode());

        let on_stat = Rc::clone(&machine);
        stat.on_settled(move |result| ReadFile::on_stat(&on_stat, result));
        open.on_settled(move |result| ReadFile::on_open(&machine, result));
        completion
    }

    /// Create or replace a file with `data`
    ///
    /// Opens write-only with create and truncate, using the configured
    /// `write_file` mode, writes at offset zero and closes. Resolves with the
    /// bytes written. A failed write still closes the descriptor; a failed
    /// close after a successful write rejects, since the data may not have
    /// reached the file.
    pub fn write_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> Completion<usize> {
        let (deferred, completion) = Deferred::new(self.error_mapper());
        let flags = OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        let open = self.open_with(path, flags, self.options().write_file_mode());
        let fs = self.clone();
        let data = data.into();

        open.on_settled(move |result| {
            let fd = match result {
                Ok(fd) => *fd,
                Err(error) => return deferred.reject(error.clone()),
            };
            let write = fs.write(fd, data);
            write.on_settled(move |result| match result {
                Ok(written) => {
                    let written = *written;
                    fs.close(fd).on_settled(move |closed| match closed {
                        Ok(_) => deferred.resolve(written),
                        Err(error) => deferred.reject(error.clone()),
                    });
                }
                Err(error) => {
                    close_quietly(&fs, fd);
                    deferred.reject(error.clone());
                }
            });
        });
        completion
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{MemoryEngine, Primitive};
    use crate::error::Result;
    use crate::event_loop::ManualLoop;
    use crate::{Completion, Filesystem, Options};
    use futures::FutureExt;

    type TestFs = Filesystem<ManualLoop<MemoryEngine>>;

    fn setup() -> (TestFs, MemoryEngine) {
        let engine = MemoryEngine::new();
        engine.add_dir("/data");
        (Filesystem::new(ManualLoop::new(engine.clone())), engine)
    }

    fn settle<T: Clone + 'static>(fs: &TestFs, completion: Completion<T>) -> Result<T> {
        fs.event_loop().run_until_idle();
        completion.now_or_never().expect("completion should have settled")
    }

    #[test]
    fn test_read_file_contents() {
        let (fs, engine) = setup();
        engine.add_file("/data/f.txt", "hello, file");

        assert_eq!(settle(&fs, fs.read_file("/data/f.txt")).unwrap(), b"hello, file");
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_read_file_missing_leaves_nothing_open() {
        let (fs, engine) = setup();

        let error = settle(&fs, fs.read_file("/data/none")).unwrap_err();
        assert_eq!(error.status(), -libc::ENOENT);
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_read_file_stat_fails_after_open_succeeded() {
        let (fs, engine) = setup();
        engine.add_file("/data/f", "data");
        engine.fail_next(Primitive::Stat, libc::EACCES);

        engine.hold_callbacks(true);
        let completion = fs.read_file("/data/f");
        engine.hold_callbacks(false);

        // open completes first
        assert!(engine.release_last());
        fs.event_loop().run_until_idle();
        assert_eq!(engine.open_descriptors(), 1);
        assert!(!completion.is_settled());

        assert!(engine.release_next());
        let error = settle(&fs, completion).unwrap_err();
        assert_eq!(error.status(), -libc::EACCES);
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_read_file_open_succeeds_after_stat_failed() {
        let (fs, engine) = setup();
        engine.add_file("/data/f", "data");
        engine.fail_next(Primitive::Stat, libc::EIO);

        engine.hold_callbacks(true);
        let completion = fs.read_file("/data/f");
        engine.hold_callbacks(false);

        assert!(engine.release_next());
        fs.event_loop().run_until_idle();
        assert_eq!(
            completion.clone().now_or_never().unwrap().unwrap_err().status(),
            -libc::EIO
        );
        assert_eq!(engine.open_descriptors(), 1);

        assert!(engine.release_next());
        fs.event_loop().run_until_idle();
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_read_file_open_fails() {
        let (fs, engine) = setup();
        engine.add_file("/data/f", "data");
        engine.fail_next(Primitive::Open, libc::EMFILE);

        let error = settle(&fs, fs.read_file("/data/f")).unwrap_err();
        assert_eq!(error.status(), -libc::EMFILE);
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_read_file_read_fails_still_closes() {
        let (fs, engine) = setup();
        engine.add_file("/data/f", "data");
        engine.fail_next(Primitive::Read, libc::EIO);

        let error = settle(&fs, fs.read_file("/data/f")).unwrap_err();
        assert_eq!(error.status(), -libc::EIO);
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_read_file_empty_skips_read() {
        let (fs, engine) = setup();
        engine.add_file("/data/empty", "");
        let before = engine.submitted();

        assert_eq!(settle(&fs, fs.read_file("/data/empty")).unwrap(), Vec::<u8>::new());
        // stat, open, close
        assert_eq!(engine.submitted() - before, 3);
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_read_file_directory_rejects() {
        let (fs, engine) = setup();
        engine.add_dir("/data/sub");

        let error = settle(&fs, fs.read_file("/data/sub")).unwrap_err();
        assert_eq!(error.status(), -libc::EISDIR);
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_read_file_close_failure_does_not_change_result() {
        let (fs, engine) = setup();
        engine.add_file("/data/f", "kept");
        engine.fail_next(Primitive::Close, libc::EIO);

        assert_eq!(settle(&fs, fs.read_file("/data/f")).unwrap(), b"kept");
    }

    #[test]
    fn test_write_file_round_trip() {
        let (fs, engine) = setup();
        engine.add_file("/data/f", "a much longer original body");

        assert_eq!(settle(&fs, fs.write_file("/data/f", "short")).unwrap(), 5);
        assert_eq!(settle(&fs, fs.read_file("/data/f")).unwrap(), b"short");
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_write_file_uses_configured_mode() {
        let engine = MemoryEngine::new();
        engine.add_dir("/data");
        let options = Options::default().with_write_file_mode(0o600);
        let fs = Filesystem::with_options(ManualLoop::new(engine.clone()), options);

        settle(&fs, fs.write_file("/data/new", "x")).unwrap();
        assert_eq!(settle(&fs, fs.stat("/data/new")).unwrap().permissions(), 0o600);
    }

    #[test]
    fn test_write_file_write_failure_closes() {
        let (fs, engine) = setup();
        engine.fail_next(Primitive::Write, libc::ENOSPC);

        let error = settle(&fs, fs.write_file("/data/f", "x")).unwrap_err();
        assert_eq!(error.status(), -libc::ENOSPC);
        assert_eq!(engine.open_descriptors(), 0);
    }

    #[test]
    fn test_write_file_close_failure_rejects() {
        let (fs, engine) = setup();
        engine.fail_next(Primitive::Close, libc::EIO);

        let error = settle(&fs, fs.write_file("/data/f", "x")).unwrap_err();
        assert_eq!(error.status(), -libc::EIO);
    }
}
