//! ringfs - future-based asynchronous filesystem operations
//!
//! ringfs exposes filesystem primitives as [`Completion`]s on top of a
//! callback-driven native engine. Each operation submits one native call
//! and settles its completion exactly once, from a task on the host event
//! loop.
//!
//! # Layers
//!
//! - [`flags`]: portable open flags and their translation to native flags
//! - [`error`]: the single [`IoError`] kind and the status-to-error mapper
//! - [`completion`]: single-assignment cells bridging callbacks to futures
//! - [`engine`]: the native [`Engine`] boundary, with an io_uring engine
//!   and a deterministic in-memory engine
//! - [`event_loop`]: the [`EventLoop`] boundary that supplies the engine
//!   and runs continuations
//! - [`filesystem`]: the [`Filesystem`] primitives
//! - `read_file` / `write_file`: composites on [`Filesystem`]
//!
//! # Example
//!
//! ```rust,no_run
//! use ringfs::{CompioLoop, Filesystem};
//!
//! #[compio::main]
//! async fn main() -> ringfs::Result<()> {
//!     let fs = Filesystem::new(CompioLoop::new());
//!     fs.mkdir("/tmp/ringfs-demo").await?;
//!     fs.write_file("/tmp/ringfs-demo/hello.txt", "hello").await?;
//!     let contents = fs.read_file("/tmp/ringfs-demo/hello.txt").await?;
//!     assert_eq!(contents, b"hello");
//!     Ok(())
//! }
//! ```

pub mod completion;
mod composite;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod filesystem;
pub mod flags;
pub mod options;

pub use completion::{Completion, Deferred};
pub use engine::{Descriptor, Engine, MemoryEngine, Primitive, StatRecord, UringEngine, EOF};
pub use error::{ErrorMapper, IoError, Result};
pub use event_loop::{CompioLoop, EventLoop, ManualLoop};
pub use filesystem::Filesystem;
pub use flags::{FlagTranslator, NativeFlagTranslator, OpenFlags};
pub use options::Options;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
