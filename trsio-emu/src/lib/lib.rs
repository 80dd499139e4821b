pub mod card;
pub mod config;
pub mod hal;
pub mod hdc;
pub mod trace;
pub mod video;
mod ui;

use log::{info, warn};
use std::io;

use crate::card::CardPresenceMonitor;
use crate::config::{Config, HdcBinding, VideoBinding};
use crate::hal::{CardSlot, Clock, DetectLines, Storage, SystemClock, TerminalLink};
use crate::hdc::{HostBus, StubBus, Wd1010};
use crate::trace::TraceOp;
use crate::video::{LineStreamer, TerminalRedraw, VideoDriver, VideoSubsystem};

/// The board: one of each peripheral, serviced in turn by a single
/// cooperative loop.
pub struct Peripherals<B, V, D, S> {
    hdc: B,
    video: VideoSubsystem<V>,
    card: CardPresenceMonitor<D, S>,
}

/// What happened while replaying a trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub ops: usize,
    /// `in` operations whose expectation was not met.
    pub mismatches: usize,
}

impl<B, V, D, S> Peripherals<B, V, D, S>
    where B: HostBus,
          V: VideoDriver,
          D: DetectLines,
          S: Storage,
{
    pub fn new(hdc: B, video_driver: V, card: CardPresenceMonitor<D, S>) -> Self {
        Peripherals {
            hdc,
            video: VideoSubsystem::new(video_driver),
            card,
        }
    }

    /// Power-on: blank the display and look for a card.
    pub fn init(&mut self) {
        self.video.init();
        self.card.init();
        self.hdc.set_media(self.card.media_state());
    }

    /// One pass of the scheduling loop. Every state machine gets one step.
    pub fn service(&mut self) {
        self.hdc.service_step();
        self.video.service_step();
        self.card.poll_detect_lines();
        self.hdc.set_media(self.card.media_state());
    }

    pub fn port_write(&mut self, address: u16, value: u8) {
        self.hdc.port_write(address, value);
    }

    pub fn port_read(&mut self, address: u16) -> u8 {
        self.hdc.port_read(address)
    }

    pub fn video_write(&mut self, address: u16, value: u8) {
        self.video.write(address, value);
    }

    /// Play a bus trace, with a service pass after every operation. `wait`
    /// keeps servicing until the clock has moved on far enough.
    pub fn replay<C: Clock>(&mut self, ops: &[TraceOp], clock: &C) -> ReplayReport {
        let mut report = ReplayReport::default();
        for op in ops {
            match op {
                TraceOp::Out { port, value } => self.port_write(*port, *value),
                TraceOp::In { port, expect } => {
                    let value = self.port_read(*port);
                    match expect {
                        Some(expect) if *expect != value => {
                            warn!("Trace op {}: IN {:04X} read {:02X}, expected {:02X}.",
                                  report.ops + 1, port, value, expect);
                            report.mismatches += 1;
                        }
                        _ => info!("Trace op {}: IN {:04X} => {:02X}", report.ops + 1, port, value),
                    }
                }
                TraceOp::Video { address, bytes } => {
                    for (address, value) in (*address..=u16::MAX).zip(bytes) {
                        self.video_write(address, *value);
                    }
                }
                TraceOp::Wait { micros } => {
                    let until = clock.now_us().saturating_add(*micros);
                    while clock.now_us() < until {
                        self.service();
                    }
                }
            }
            self.service();
            report.ops += 1;
        }
        report
    }

    pub fn hdc(&self) -> &B {
        &self.hdc
    }

    pub fn video(&self) -> &VideoSubsystem<V> {
        &self.video
    }

    pub fn card(&self) -> &CardPresenceMonitor<D, S> {
        &self.card
    }
}

/// Assemble the console board, replay the trace on it, then keep it running
/// until the user quits or the linger time runs out.
pub fn run(config: &Config, ops: &[TraceOp]) -> Result<ReplayReport, String> {
    // Card socket.
    let mut slot = CardSlot::new(&config.card_dir);
    slot.start().map_err(|e| format!(
        "Failed to watch card directory '{}': {}", config.card_dir.display(), e))?;
    let card = CardPresenceMonitor::with_threshold(slot.detect_lines(), slot, config.debounce);

    let hdc: Box<dyn HostBus> = match config.hdc {
        HdcBinding::Wd1010 => Box::new(Wd1010::new()),
        HdcBinding::Stub => Box::new(StubBus),
    };

    let mut console = ui::Console::open()
        .map_err(|e| format!("Failed to set up the terminal: {}", e))?;
    let driver: Box<dyn VideoDriver> = match config.video {
        VideoBinding::Stream => Box::new(LineStreamer::with_settle(
            TerminalLink::new(io::stdout(), ui::ORIGIN), SystemClock::new(), config.settle_us)),
        VideoBinding::Redraw => Box::new(TerminalRedraw::new(io::stdout(), ui::ORIGIN)),
    };
    let mut board = Peripherals::new(hdc, driver, card);
    board.init();
    info!("Board assembled: {:?} controller, {:?} video.", config.hdc, config.video);

    let clock = SystemClock::new();
    let terminal_error = |e: io::Error| format!("Terminal error: {}", e);
    console.set_status("Replaying trace...").map_err(terminal_error)?;
    let report = board.replay(ops, &clock);
    info!("Trace done: {} ops, {} mismatches.", report.ops, report.mismatches);

    let status = format!("{} ops, {} mismatches. Press q to quit.", report.ops, report.mismatches);
    console.set_status(&status).map_err(terminal_error)?;
    let deadline = config.linger_ms
        .map(|ms| clock.now_us().saturating_add(ms.saturating_mul(1000)));
    loop {
        board.service();
        if deadline.map_or(false, |deadline| clock.now_us() >= deadline) {
            break;
        }
        if console.quit_requested().map_err(terminal_error)? {
            break;
        }
    }

    console.close().map_err(terminal_error)?;
    Ok(report)
}

/// Logging for tests; safe to call from every test.
#[cfg(test)]
pub fn init_test_logging() {
    // The logger can only be set once, and test order is unknown.
    let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Trace,
                                        simplelog::Config::default());
}
