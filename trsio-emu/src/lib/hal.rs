//! Hardware capabilities consumed by the peripheral state machines.
//!
//! Each state machine owns the capabilities it needs and never asks which
//! binding it is talking to; the bindings are chosen when the board is
//! assembled.

mod console;
mod device;

pub use console::{CardSlot, SlotDetect, SystemClock, TerminalLink, IMAGE_SECTOR_SIZE};
pub use device::{MonotonicClock, PinLines, SpiLink};

// Shared-handle fakes for testing the state machines.
#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::io;

/// The digital detect lines of the card socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    CardDetect,
    WriteProtect,
}

/// Read access to the card socket's detect lines.
pub trait DetectLines {
    /// Returns true if the line is asserted. Bindings take care of polarity,
    /// so `CardDetect` is true exactly when a card is in the socket.
    fn digital_read(&mut self, line: Line) -> bool;
}

/// A monotonic microsecond clock.
pub trait Clock {
    fn now_us(&self) -> u64;
}

/// The narrow, rate-limited output link to the display device.
pub trait Link {
    /// Non-blocking poll: can a chunk be written right now?
    fn is_writable(&mut self) -> bool;
    /// Blocking write of one bounded chunk. Returns false if the link
    /// rejected it.
    fn spi_write(&mut self, bytes: &[u8]) -> bool;
}

/// Size information about a mounted volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeGeometry {
    pub total_sectors: u32,
    pub free_sectors: u32,
    pub sector_size: u32,
    pub cluster_size: u32,
}

/// Error type for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    desc: String,
}

impl StorageError {
    pub fn new<S>(desc: S) -> Self
        where S: Into<String>
    {
        StorageError {
            desc: desc.into(),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.desc)
    }
}

/// Convert IO errors to storage errors.
impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        let msg = match e.kind() {
            io::ErrorKind::NotFound => "No medium",
            io::ErrorKind::PermissionDenied => "Permission denied",
            io::ErrorKind::UnexpectedEof => "Unexpected EOF",
            _ => "Unexpected IO error",
        };
        StorageError {
            desc: format!("IO error: {}.", msg),
        }
    }
}

/// Result type alias.
pub type StorageResult<T> = Result<T, StorageError>;

/// The block storage behind the card: a FAT library on the board, an image
/// file in the console harness.
pub trait Storage {
    fn mount(&mut self, volume: &str) -> StorageResult<()>;
    fn query_free_space(&mut self, volume: &str) -> StorageResult<VolumeGeometry>;
}
