use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tempfile::TempDir;

/// Install a fmt subscriber that writes through the test harness
///
/// Safe to call from every test; only the first call installs it.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// Scratch directory plus a helper to build paths inside it
#[allow(dead_code)]
pub struct Scratch {
    dir: TempDir,
}

#[allow(dead_code)]
impl Scratch {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Keeps the watchdog started by [`test_timeout_guard`] at bay
///
/// Dropping it hangs up the channel, which lets the watchdog thread exit.
#[allow(dead_code)]
pub struct TestTimeoutGuard {
    _alive: mpsc::Sender<()>,
}

/// Abort the test process if the guard is still alive after `duration`
///
/// A completion that never settles would otherwise hang the test binary.
#[allow(dead_code)]
pub fn test_timeout_guard(duration: Duration) -> TestTimeoutGuard {
    let (alive, watched) = mpsc::channel::<()>();
    std::thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = watched.recv_timeout(duration) {
            eprintln!("no completion after {duration:?}, aborting");
            std::process::abort();
        }
    });
    TestTimeoutGuard { _alive: alive }
}
