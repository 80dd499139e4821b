use std::path::PathBuf;

use clap::ValueEnum;

use crate::card::DEFAULT_DEBOUNCE_THRESHOLD;
use crate::video::DEFAULT_SETTLE_US;

/// Which disk controller answers on the host bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum HdcBinding {
    /// Full WD1010 register emulation.
    #[default]
    Wd1010,
    /// Acknowledge presence only: reads return 0x55.
    Stub,
}

/// How the frame buffer reaches the terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum VideoBinding {
    /// Rate-limited line streaming, one chunk per tick.
    #[default]
    Stream,
    /// Whole-screen redraw on change.
    Redraw,
}

/// Everything needed to assemble the console board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub hdc: HdcBinding,
    pub video: VideoBinding,
    pub card_dir: PathBuf,
    pub debounce: u32,
    pub settle_us: u64,
    /// Keep servicing this long after the trace, rather than waiting for a key.
    pub linger_ms: Option<u64>,
    pub trace: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hdc: HdcBinding::default(),
            video: VideoBinding::default(),
            card_dir: PathBuf::from("Card"),
            debounce: DEFAULT_DEBOUNCE_THRESHOLD,
            settle_us: DEFAULT_SETTLE_US,
            linger_ms: None,
            trace: None,
        }
    }
}
