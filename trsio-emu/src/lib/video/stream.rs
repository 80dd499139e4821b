use log::{debug, trace};

use super::frame::{FrameBuffer, BLANK, COLS, ROWS};
use super::VideoDriver;
use crate::hal::{Clock, Link};

/// Opcode for "move to column/row and write the following characters".
pub const OPCODE_PUT_AT: u8 = 1;
/// Opcode, column, row.
pub const FRAME_HEADER_LEN: usize = 3;
/// Characters carried per chunk.
pub const CHUNK_DATA_LEN: usize = 8;
pub const CHUNK_LEN: usize = FRAME_HEADER_LEN + CHUNK_DATA_LEN;
/// Minimum gap between chunks that the display device can keep up with.
pub const DEFAULT_SETTLE_US: u64 = 1000;

const STAGING_LEN: usize = FRAME_HEADER_LEN + COLS;

const _: () = assert!(COLS % CHUNK_DATA_LEN == 0);

/// Where the streamer is in sending a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    SelectLine,
    SendChunk,
    Settle,
}

/// Streams rows to the display device, one chunk per service call at most,
/// with a settle delay after every chunk.
///
/// Dirty rows are sent first. When nothing is dirty the rows are refreshed
/// in turn, so a row the display lost is eventually repaired.
pub struct LineStreamer<L, C> {
    link: L,
    clock: C,
    settle_us: u64,
    state: StreamState,
    row: usize,
    next_row: usize,
    offset: usize,
    // The row's characters behind a header. Each chunk's header is written
    // over the tail of the previous chunk, which has already gone out.
    staging: [u8; STAGING_LEN],
    last_send_us: u64,
}

impl<L: Link, C: Clock> LineStreamer<L, C> {
    pub fn new(link: L, clock: C) -> Self {
        Self::with_settle(link, clock, DEFAULT_SETTLE_US)
    }

    pub fn with_settle(link: L, clock: C, settle_us: u64) -> Self {
        LineStreamer {
            link,
            clock,
            settle_us,
            state: StreamState::SelectLine,
            row: 0,
            next_row: 0,
            offset: 0,
            staging: [BLANK; STAGING_LEN],
            last_send_us: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The row being sent (or last sent).
    pub fn current_row(&self) -> usize {
        self.row
    }

    fn select_line(&mut self, frame: &mut FrameBuffer) {
        let row = frame.take_dirty_row().unwrap_or(self.next_row);
        self.row = row;
        self.next_row = (row + 1) % ROWS;
        self.offset = 0;
        if let Some(line) = frame.line(row) {
            self.staging[FRAME_HEADER_LEN..].copy_from_slice(&line);
        }
        self.frame_header();
        trace!("Video: streaming row {}.", row);
        self.state = StreamState::SendChunk;
    }

    fn send_chunk(&mut self) {
        if !self.link.is_writable() {
            return;
        }
        let chunk = &self.staging[self.offset..self.offset + CHUNK_LEN];
        if !self.link.spi_write(chunk) {
            // Lost chunks are repaired when the row comes round again.
            debug!("Video: chunk for row {} column {} not accepted.", self.row, self.offset);
        }
        self.last_send_us = self.clock.now_us();
        self.state = StreamState::Settle;
    }

    fn settle(&mut self) {
        if self.clock.now_us().saturating_sub(self.last_send_us) < self.settle_us {
            return;
        }
        self.offset += CHUNK_DATA_LEN;
        if self.offset < COLS {
            self.frame_header();
            self.state = StreamState::SendChunk;
        } else {
            self.state = StreamState::SelectLine;
        }
    }

    fn frame_header(&mut self) {
        self.staging[self.offset] = OPCODE_PUT_AT;
        self.staging[self.offset + 1] = self.offset as u8;
        self.staging[self.offset + 2] = self.row as u8;
    }
}

impl<L: Link, C: Clock> VideoDriver for LineStreamer<L, C> {
    fn service(&mut self, frame: &mut FrameBuffer) {
        match self.state {
            StreamState::SelectLine => self.select_line(frame),
            StreamState::SendChunk => self.send_chunk(),
            StreamState::Settle => self.settle(),
        }
    }
}
