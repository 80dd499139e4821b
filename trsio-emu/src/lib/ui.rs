use crossterm::{
    cursor,
    event::{self, Event, KeyCode},
    queue,
    style::{self, Color},
    terminal,
};
use log::info;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use crate::video::{COLS, ROWS};

// Screen layout.
const TITLE: &str = "trsio display";
const HORIZONTAL: &str = "━";
const SIDE_BORDER: &str = "┃";
const ROWS_U16: u16 = ROWS as u16;
const COLS_U16: u16 = COLS as u16;

/// Terminal position of display cell (0, 0), inside the border.
pub const ORIGIN: (u16, u16) = (1, 2);
/// Terminal row of the status line, under the bottom border.
const STATUS_ROW: u16 = ORIGIN.1 + ROWS_U16 + 1;

/// The text console the harness runs in: raw mode, alternate screen and a
/// border around the display area.
pub struct Console {
    out: Stdout,
    open: bool,
}

impl Console {
    /// Take over the terminal.
    pub fn open() -> crossterm::Result<Self> {
        info!("Initialising console.");
        terminal::enable_raw_mode()?;
        let mut out = io::stdout();
        queue!(
            out,
            terminal::EnterAlternateScreen,
            style::SetForegroundColor(Color::White),
            style::SetBackgroundColor(Color::Black),
            terminal::Clear(terminal::ClearType::All),
            cursor::Hide,
        )?;
        draw_frame(&mut out)?;
        out.flush()?;
        Ok(Console { out, open: true })
    }

    /// Replace the status line.
    pub fn set_status(&mut self, text: &str) -> crossterm::Result<()> {
        draw_status(&mut self.out, text)?;
        self.out.flush()
    }

    /// Drain pending terminal events, returning true if q or Esc was pressed.
    /// Never waits.
    pub fn quit_requested(&mut self) -> crossterm::Result<bool> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if is_quit_key(key.code) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Give the terminal back.
    pub fn close(&mut self) -> crossterm::Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        queue!(
            self.out,
            terminal::Clear(terminal::ClearType::All),
            style::ResetColor,
            cursor::Show,
            terminal::LeaveAlternateScreen,
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        info!("Console closed.");
        Ok(())
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn is_quit_key(code: KeyCode) -> bool {
    matches!(code, KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc)
}

/// Draw the title and the border around the display area.
fn draw_frame<W: Write>(out: &mut W) -> io::Result<()> {
    let inner = usize::from(COLS_U16);
    let pad = (inner + 2 - TITLE.len()) / 2;
    queue!(out, cursor::MoveTo(pad as u16, 0))?;
    write!(out, "{}", TITLE)?;

    queue!(out, cursor::MoveTo(0, ORIGIN.1 - 1))?;
    write!(out, "┏{}┓", HORIZONTAL.repeat(inner))?;
    for row in 0..ROWS_U16 {
        queue!(out, cursor::MoveTo(0, ORIGIN.1 + row))?;
        write!(out, "{}{:width$}{}", SIDE_BORDER, "", SIDE_BORDER, width = inner)?;
    }
    queue!(out, cursor::MoveTo(0, ORIGIN.1 + ROWS_U16))?;
    write!(out, "┗{}┛", HORIZONTAL.repeat(inner))
}

fn draw_status<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    queue!(
        out,
        cursor::MoveTo(0, STATUS_ROW),
        terminal::Clear(terminal::ClearType::CurrentLine),
    )?;
    write!(out, "{}", text)
}
