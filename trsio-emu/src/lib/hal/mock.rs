use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use super::*;

/// Detect lines whose levels are set by the test through a cloned handle.
#[derive(Clone, Default)]
pub struct MockLines {
    pub present: Rc<Cell<bool>>,
    pub write_protect: Rc<Cell<bool>>,
}

impl DetectLines for MockLines {
    fn digital_read(&mut self, line: Line) -> bool {
        match line {
            Line::CardDetect => self.present.get(),
            Line::WriteProtect => self.write_protect.get(),
        }
    }
}

/// A clock that only moves when told to.
#[derive(Clone, Default)]
pub struct MockClock {
    pub now: Rc<Cell<u64>>,
}

impl MockClock {
    pub fn advance(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }
}

impl Clock for MockClock {
    fn now_us(&self) -> u64 {
        self.now.get()
    }
}

/// A link that records every chunk and can be stalled.
#[derive(Clone)]
pub struct MockLink {
    pub writable: Rc<Cell<bool>>,
    pub chunks: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl Default for MockLink {
    fn default() -> Self {
        MockLink {
            writable: Rc::new(Cell::new(true)),
            chunks: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl Link for MockLink {
    fn is_writable(&mut self) -> bool {
        self.writable.get()
    }

    fn spi_write(&mut self, bytes: &[u8]) -> bool {
        self.chunks.borrow_mut().push(bytes.to_vec());
        true
    }
}

/// Storage whose mount results are scripted. When the script runs out,
/// mounts succeed.
#[derive(Clone, Default)]
pub struct MockStorage {
    pub mount_results: Rc<RefCell<VecDeque<bool>>>,
    pub mounts: Rc<Cell<u32>>,
    pub free_space_fails: Rc<Cell<bool>>,
}

impl MockStorage {
    pub fn fail_next(&self, n: usize) {
        self.mount_results.borrow_mut().extend(std::iter::repeat(false).take(n));
    }
}

impl Storage for MockStorage {
    fn mount(&mut self, _volume: &str) -> StorageResult<()> {
        self.mounts.set(self.mounts.get() + 1);
        match self.mount_results.borrow_mut().pop_front() {
            Some(false) => Err(StorageError::new("mock mount failure")),
            _ => Ok(()),
        }
    }

    fn query_free_space(&mut self, _volume: &str) -> StorageResult<VolumeGeometry> {
        if self.free_space_fails.get() {
            return Err(StorageError::new("mock free-space failure"));
        }
        Ok(VolumeGeometry {
            total_sectors: 1000,
            free_sectors: 600,
            sector_size: 512,
            cluster_size: 8,
        })
    }
}
