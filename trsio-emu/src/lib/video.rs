//! The memory-mapped character display.
//!
//! The host writes raw character codes into a 16x64 frame buffer. A driver
//! then gets the changes to the display device: `LineStreamer` pushes dirty
//! rows over the rate-limited link, `TerminalRedraw` repaints a whole text
//! terminal whenever anything changed.

mod frame;
mod redraw;
mod stream;

pub use frame::{translate, FrameBuffer, BLANK, CELLS, COLS, ROWS, VIDEO_BASE, VIDEO_END};
pub use redraw::TerminalRedraw;
pub use stream::{LineStreamer, StreamState, CHUNK_DATA_LEN, CHUNK_LEN, DEFAULT_SETTLE_US,
                 FRAME_HEADER_LEN, OPCODE_PUT_AT};

use log::debug;

/// Something that carries frame buffer changes to a display.
pub trait VideoDriver {
    /// Do a bounded amount of work and return. Never blocks.
    fn service(&mut self, frame: &mut FrameBuffer);
}

impl<T: VideoDriver + ?Sized> VideoDriver for Box<T> {
    fn service(&mut self, frame: &mut FrameBuffer) {
        (**self).service(frame)
    }
}

/// The display: a frame buffer plus the driver bound to it.
pub struct VideoSubsystem<D> {
    frame: FrameBuffer,
    driver: D,
}

impl<D: VideoDriver> VideoSubsystem<D> {
    pub fn new(driver: D) -> Self {
        VideoSubsystem {
            frame: FrameBuffer::new(),
            driver,
        }
    }

    /// Blank the screen.
    pub fn init(&mut self) {
        self.frame.clear();
        debug!("Video initialised.");
    }

    /// Handle a host memory write. Addresses outside the video window are
    /// ignored.
    pub fn write(&mut self, address: u16, value: u8) {
        self.frame.write(address, value);
    }

    /// Let the driver make progress.
    pub fn service_step(&mut self) {
        self.driver.service(&mut self.frame);
    }

    /// The display-safe characters of the given row, or None if there is no
    /// such row.
    pub fn get_line(&self, row: usize) -> Option<[u8; COLS]> {
        self.frame.line(row)
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }
}
