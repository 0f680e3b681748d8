//! Portable open flags and their translation to native flags

use bitflags::bitflags;

bitflags! {
    /// Caller-facing open intents, independent of any engine's encoding
    ///
    /// `READ_ONLY`, `WRITE_ONLY` and `READ_WRITE` are mutually exclusive by
    /// contract; nothing here enforces it.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READ_ONLY = 1 << 0;
        const WRITE_ONLY = 1 << 1;
        const CREATE = 1 << 2;
        const APPEND = 1 << 3;
        const READ_WRITE = 1 << 4;
        const TRUNCATE = 1 << 5;
        const EXCLUSIVE = 1 << 6;
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::READ_ONLY
    }
}

/// Converts a portable flag bitmask into an engine's native bitmask
pub trait FlagTranslator {
    /// Translate `portable` bits into native open flags
    ///
    /// Total: any input is accepted, and bits without a native mapping
    /// contribute nothing.
    fn convert(&self, portable: u32) -> i32;
}

/// Translator for the Linux `open(2)` flags used by the bundled engines
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFlagTranslator;

impl NativeFlagTranslator {
    /// Portable bit to native bit, one entry per recognized intent
    const MAP: [(OpenFlags, i32); 7] = [
        (OpenFlags::READ_ONLY, libc::O_RDONLY),
        (OpenFlags::WRITE_ONLY, libc::O_WRONLY),
        (OpenFlags::CREATE, libc::O_CREAT),
        (OpenFlags::APPEND, libc::O_APPEND),
        (OpenFlags::READ_WRITE, libc::O_RDWR),
        (OpenFlags::TRUNCATE, libc::O_TRUNC),
        (OpenFlags::EXCLUSIVE, libc::O_EXCL),
    ];
}

impl FlagTranslator for NativeFlagTranslator {
    fn convert(&self, portable: u32) -> i32 {
        let portable = OpenFlags::from_bits_truncate(portable);
        Self::MAP
            .iter()
            .filter(|(flag, _)| portable.contains(*flag))
            .fold(0, |native, (_, bit)| native | bit)
    }
}
