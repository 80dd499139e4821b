use crossterm::{cursor, queue};
use log::{trace, warn};
use std::io::{self, Write};

use super::frame::{FrameBuffer, ROWS};
use super::VideoDriver;

/// Repaints the whole screen on a text terminal whenever the frame buffer's
/// modification count has moved. The terminal takes everything at once, so
/// there is no pacing.
pub struct TerminalRedraw<W> {
    out: W,
    origin: (u16, u16),
    drawn_at: Option<u64>,
}

impl<W: Write> TerminalRedraw<W> {
    /// Draw onto `out` with the top-left cell at terminal column/row `origin`.
    pub fn new(out: W, origin: (u16, u16)) -> Self {
        TerminalRedraw {
            out,
            origin,
            drawn_at: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn redraw(&mut self, frame: &FrameBuffer) -> io::Result<()> {
        // Every row is written in full, so nothing needs clearing.
        queue!(self.out, cursor::Hide)?;
        for row in 0..ROWS {
            queue!(self.out, cursor::MoveTo(self.origin.0, self.origin.1 + row as u16))?;
            if let Some(line) = frame.line(row) {
                self.out.write_all(&line)?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write> VideoDriver for TerminalRedraw<W> {
    fn service(&mut self, frame: &mut FrameBuffer) {
        let modifications = frame.modifications();
        if self.drawn_at == Some(modifications) {
            return;
        }
        self.drawn_at = Some(modifications);
        trace!("Video: full redraw at modification {}.", modifications);
        if let Err(e) = self.redraw(frame) {
            warn!("Video: terminal redraw failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::video::{VideoSubsystem, COLS, VIDEO_BASE};

    fn output_len(video: &VideoSubsystem<TerminalRedraw<Vec<u8>>>) -> usize {
        video.driver().out.len()
    }

    #[test]
    fn test_initial_draw() {
        let mut video = VideoSubsystem::new(TerminalRedraw::new(Vec::new(), (0, 0)));
        video.service_step();
        let out = String::from_utf8(video.driver().out.clone()).unwrap();
        // Cursor hidden, then every row.
        assert!(out.starts_with("\u{1b}[?25l\u{1b}[1;1H"));
        assert!(out.contains("\u{1b}[16;1H"));
        assert_eq!(out.matches(&" ".repeat(COLS)).count(), ROWS);
    }

    #[test]
    fn test_redraw_only_on_change() {
        let mut video = VideoSubsystem::new(TerminalRedraw::new(Vec::new(), (0, 0)));
        video.service_step();
        let first = output_len(&video);
        video.service_step();
        video.service_step();
        assert_eq!(output_len(&video), first);

        video.write(VIDEO_BASE + COLS as u16, 0x08);
        video.write(VIDEO_BASE + COLS as u16 + 1, b'i');
        video.service_step();
        assert_eq!(output_len(&video), first * 2);
        let out = String::from_utf8(video.driver().out.clone()).unwrap();
        assert!(out[first..].contains("\u{1b}[2;1HHi"));

        video.service_step();
        assert_eq!(output_len(&video), first * 2);
    }

    #[test]
    fn test_origin_offset() {
        let mut video = VideoSubsystem::new(TerminalRedraw::new(Vec::new(), (4, 1)));
        video.service_step();
        let out = String::from_utf8(video.into_driver().into_inner()).unwrap();
        assert!(out.contains("\u{1b}[2;5H"));
        assert!(out.contains("\u{1b}[17;5H"));
    }
}
