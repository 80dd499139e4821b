//! Binding for the console simulation harness. A host directory stands in
//! for the card socket, and the display device is painted on the terminal.

use crossterm::{cursor, queue};
use log::{debug, info, warn};
use notify::{event::{ModifyKind, RenameMode}, Event, EventKind, Watcher};
use std::convert::TryFrom;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
use std::time::Instant;

use super::*;
use crate::video::{FRAME_HEADER_LEN, OPCODE_PUT_AT};

/// Sector size of card images.
pub const IMAGE_SECTOR_SIZE: u32 = 512;

/// Detect-line levels, written by the watcher and read by the poll loop.
#[derive(Default)]
struct SlotLines {
    present: AtomicBool,
    write_protected: AtomicBool,
}

impl SlotLines {
    fn read(&self, line: Line) -> bool {
        match line {
            Line::CardDetect => self.present.load(Ordering::Relaxed),
            Line::WriteProtect => self.write_protected.load(Ordering::Relaxed),
        }
    }
}

/// A card socket backed by a directory. The card is inserted when the
/// directory holds exactly one file, the card image; a read-only image is a
/// write-protected card.
pub struct CardSlot {
    dir_path: Arc<PathBuf>,
    lines: Arc<SlotLines>,
    watcher: Option<notify::RecommendedWatcher>,
    mounted: Option<PathBuf>,
}

impl CardSlot {
    /// Create a slot on the given directory and take an initial look at it.
    pub fn new(dir_path: impl Into<PathBuf>) -> Self {
        let slot = CardSlot {
            dir_path: Arc::new(dir_path.into()),
            lines: Arc::new(SlotLines::default()),
            watcher: None,
            mounted: None,
        };
        rescan(&slot.dir_path, &slot.lines);
        slot
    }

    /// Start watching the directory for card inserts and ejects.
    pub fn start(&mut self) -> notify::Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        info!("Card slot '{}' watching.", self.dir_path.display());

        let dir_path = Arc::clone(&self.dir_path);
        let lines = Arc::clone(&self.lines);
        let mut watcher = notify::recommended_watcher(
                move |event: notify::Result<Event>| {
            // Files appearing, disappearing or being renamed away can all
            // change what is in the socket; so can permission changes.
            match event {
                Ok(event) => {
                    if let EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(
                            ModifyKind::Name(RenameMode::From | RenameMode::To | RenameMode::Any)
                            | ModifyKind::Metadata(_)) = event.kind {
                        rescan(&dir_path, &lines);
                    }
                }
                Err(e) => warn!("Card slot watch error: {}", e),
            }
        })?;
        watcher.watch(self.dir_path.as_path(), notify::RecursiveMode::NonRecursive)?;
        // Catch anything that changed before the watch began.
        rescan(&self.dir_path, &self.lines);
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Stop watching. The detect lines keep their last values.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            let _ = watcher.unwatch(self.dir_path.as_path());
            info!("Card slot '{}' stopped watching.", self.dir_path.display());
        }
    }

    /// Look at the directory again without waiting for the watcher.
    pub fn rescan(&self) {
        rescan(&self.dir_path, &self.lines);
    }

    /// The image currently mounted, if any.
    pub fn mounted_image(&self) -> Option<&Path> {
        self.mounted.as_deref()
    }

    /// A handle on the detect lines alone, so that the socket and the
    /// storage behind it can be owned separately.
    pub fn detect_lines(&self) -> SlotDetect {
        SlotDetect {
            lines: Arc::clone(&self.lines),
        }
    }
}

impl Drop for CardSlot {
    fn drop(&mut self) {
        self.stop();
    }
}

impl DetectLines for CardSlot {
    fn digital_read(&mut self, line: Line) -> bool {
        self.lines.read(line)
    }
}

/// The detect lines of a `CardSlot`.
#[derive(Clone)]
pub struct SlotDetect {
    lines: Arc<SlotLines>,
}

impl DetectLines for SlotDetect {
    fn digital_read(&mut self, line: Line) -> bool {
        self.lines.read(line)
    }
}

impl Storage for CardSlot {
    fn mount(&mut self, volume: &str) -> StorageResult<()> {
        self.mounted = None;
        let path = get_image_file(&self.dir_path)
            .ok_or_else(|| StorageError::new("No card image in the slot."))?;
        let len = fs::metadata(&path)?.len();
        if len == 0 || len % IMAGE_SECTOR_SIZE as u64 != 0 {
            return Err(StorageError::new(format!(
                "Card image '{}' is not a whole number of {}-byte sectors.",
                path.display(), IMAGE_SECTOR_SIZE)));
        }
        sector_count(len)?;
        debug!("Volume '{}' mounted from '{}'.", volume, path.display());
        self.mounted = Some(path);
        Ok(())
    }

    fn query_free_space(&mut self, volume: &str) -> StorageResult<VolumeGeometry> {
        let path = self.mounted.as_ref()
            .ok_or_else(|| StorageError::new(format!("Volume '{}' is not mounted.", volume)))?;
        let mut file = File::open(path)?;
        let total_sectors = sector_count(file.metadata()?.len())?;

        // No filesystem is interpreted here: a sector of zeros counts as free.
        let mut sector = vec![0u8; IMAGE_SECTOR_SIZE as usize];
        let mut free_sectors = 0;
        for _ in 0..total_sectors {
            file.read_exact(&mut sector)?;
            if sector.iter().all(|&b| b == 0) {
                free_sectors += 1;
            }
        }

        Ok(VolumeGeometry {
            total_sectors,
            free_sectors,
            sector_size: IMAGE_SECTOR_SIZE,
            cluster_size: 1,
        })
    }
}

fn sector_count(len: u64) -> StorageResult<u32> {
    u32::try_from(len / IMAGE_SECTOR_SIZE as u64)
        .map_err(|_| StorageError::new("Card image is too large."))
}

/// Update the detect lines from the directory contents.
fn rescan(dir_path: &Path, lines: &SlotLines) {
    let image = get_image_file(dir_path);
    let present = image.is_some();
    let write_protected = image
        .and_then(|path| fs::metadata(path).ok())
        .map_or(false, |meta| meta.permissions().readonly());
    let was_present = lines.present.swap(present, Ordering::Relaxed);
    lines.write_protected.store(write_protected, Ordering::Relaxed);
    if was_present != present {
        debug!("Card slot '{}': detect line {}.", dir_path.display(),
               if present { "asserted" } else { "released" });
    }
}

/// Inspect the given directory, looking for a single file which has its path
/// returned. If there is anything other than a single file, or the directory
/// can't be read, None is returned.
fn get_image_file(dir_path: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir_path).ok()?
        .filter_map(|res| res.ok().map(|entry| entry.path()))
        .collect::<Vec<_>>();

    if entries.len() == 1 && entries[0].is_file() {
        Some(entries.remove(0))
    } else {
        None
    }
}

/// Microseconds since the harness started.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Plays the display device at the far end of the link: decodes each
/// put-at chunk and paints it on a terminal.
pub struct TerminalLink<W> {
    out: W,
    origin: (u16, u16),
}

impl<W: Write> TerminalLink<W> {
    /// Paint onto `out`, with display cell (0, 0) at terminal column/row
    /// `origin`.
    pub fn new(out: W, origin: (u16, u16)) -> Self {
        TerminalLink { out, origin }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&mut self, col: u8, row: u8, data: &[u8]) -> io::Result<()> {
        queue!(
            self.out,
            cursor::MoveTo(self.origin.0 + u16::from(col), self.origin.1 + u16::from(row)),
        )?;
        let text: String = data.iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { char::from(b) } else { '.' })
            .collect();
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }
}

impl<W: Write> Link for TerminalLink<W> {
    fn is_writable(&mut self) -> bool {
        // The terminal never pushes back.
        true
    }

    fn spi_write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() < FRAME_HEADER_LEN || bytes[0] != OPCODE_PUT_AT {
            warn!("Display link: dropping malformed chunk {:02X?}.", bytes);
            return false;
        }
        match self.paint(bytes[1], bytes[2], &bytes[FRAME_HEADER_LEN..]) {
            Ok(()) => true,
            Err(e) => {
                warn!("Display link: terminal write failed: {}", e);
                false
            }
        }
    }
}
