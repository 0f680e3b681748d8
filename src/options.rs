//! Default parameters for filesystem operations
//!
//! - `Options` - Defaults applied when a caller omits mode or flags

use crate::flags::OpenFlags;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Default mode for `mkdir`
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Default creation mode for `open`
pub const DEFAULT_FILE_MODE: u32 = 0o755;

/// Default creation mode for `write_file`
pub const DEFAULT_WRITE_FILE_MODE: u32 = 0o644;

/// Defaults used by [`crate::Filesystem`] when a call leaves them out
///
/// Captured once at construction; changing a value means building a new
/// filesystem handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Mode for `mkdir`
    dir_mode: u32,
    /// Creation mode for `open`
    file_mode: u32,
    /// Flags for `open`
    open_flags: OpenFlags,
    /// Creation mode for `write_file`
    write_file_mode: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_mode: DEFAULT_DIR_MODE,
            file_mode: DEFAULT_FILE_MODE,
            open_flags: OpenFlags::READ_ONLY,
            write_file_mode: DEFAULT_WRITE_FILE_MODE,
        }
    }
}

impl Options {
    /// Set the mode used by `mkdir`
    #[must_use]
    pub const fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Set the creation mode used by `open`
    #[must_use]
    pub const fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Set the flags used by `open`
    #[must_use]
    pub const fn with_open_flags(mut self, flags: OpenFlags) -> Self {
        self.open_flags = flags;
        self
    }

    /// Set the creation mode used by `write_file`
    #[must_use]
    pub const fn with_write_file_mode(mut self, mode: u32) -> Self {
        self.write_file_mode = mode;
        self
    }

    /// Get the `mkdir` mode
    #[must_use]
    pub const fn dir_mode(&self) -> u32 {
        self.dir_mode
    }

    /// Get the `open` creation mode
    #[must_use]
    pub const fn file_mode(&self) -> u32 {
        self.file_mode
    }

    /// Get the `open` flags
    #[must_use]
    pub const fn open_flags(&self) -> OpenFlags {
        self.open_flags
    }

    /// Get the `write_file` creation mode
    #[must_use]
    pub const fn write_file_mode(&self) -> u32 {
        self.write_file_mode
    }
}
