/// First address of the video window in host memory.
pub const VIDEO_BASE: u16 = 0x3C00;
/// Last address of the video window in host memory.
pub const VIDEO_END: u16 = 0x3FFF;

pub const ROWS: usize = 16;
pub const COLS: usize = 64;
pub const CELLS: usize = ROWS * COLS;

/// What the screen is filled with on init.
pub const BLANK: u8 = b' ';

// One dirty bit per row.
const _: () = assert!(ROWS <= 16);
const _: () = assert!(CELLS == (VIDEO_END - VIDEO_BASE) as usize + 1);

/// Character cells plus change tracking.
///
/// Change tracking is kept two ways, one per driver: a dirty bit per row, and
/// a counter bumped on every write.
pub struct FrameBuffer {
    cells: [u8; CELLS],
    dirty: u16,
    modifications: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer {
            cells: [BLANK; CELLS],
            dirty: 0,
            modifications: 0,
        }
    }

    /// Blank every cell. Nothing is marked dirty: the display is assumed to
    /// be blanked alongside.
    pub fn clear(&mut self) {
        self.cells = [BLANK; CELLS];
        self.dirty = 0;
    }

    /// Store a raw character. Returns false if the address is outside the
    /// video window.
    pub fn write(&mut self, address: u16, value: u8) -> bool {
        if !(VIDEO_BASE..=VIDEO_END).contains(&address) {
            return false;
        }
        let offset = usize::from(address - VIDEO_BASE);
        self.cells[offset] = value;
        self.dirty |= 1 << (offset / COLS);
        self.modifications = self.modifications.wrapping_add(1);
        true
    }

    pub fn is_dirty(&self, row: usize) -> bool {
        row < ROWS && self.dirty & (1 << row) != 0
    }

    /// Bitmap of dirty rows, bit n for row n.
    pub fn dirty_rows(&self) -> u16 {
        self.dirty
    }

    /// Find the lowest dirty row and clear its bit.
    pub fn take_dirty_row(&mut self) -> Option<usize> {
        if self.dirty == 0 {
            return None;
        }
        let row = self.dirty.trailing_zeros() as usize;
        self.dirty &= !(1 << row);
        Some(row)
    }

    /// Total writes so far. Wraps.
    pub fn modifications(&self) -> u64 {
        self.modifications
    }

    pub fn raw_line(&self, row: usize) -> Option<&[u8]> {
        if row >= ROWS {
            return None;
        }
        Some(&self.cells[row * COLS..(row + 1) * COLS])
    }

    /// The row with every cell passed through `translate`.
    pub fn line(&self, row: usize) -> Option<[u8; COLS]> {
        let raw = self.raw_line(row)?;
        let mut line = [BLANK; COLS];
        for (out, &cell) in line.iter_mut().zip(raw) {
            *out = translate(cell);
        }
        Some(line)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a character code to something a plain-text display can show.
///
/// Codes with neither bit 7 nor bit 5 set are folded up into the 0x40 block
/// (the character generator does the same). The top half of the code page
/// is block graphics, which has no text equivalent: the blank graphics
/// become spaces and everything else becomes `X`.
pub fn translate(code: u8) -> u8 {
    let code = if code & 0xA0 == 0 { code | 0x40 } else { code };
    match code {
        128 | 130 | 160 => b' ',
        129..=255 => b'X',
        _ => code,
    }
}
