//! Binding for the real board: GPIO detect lines, the SPI link to the
//! display device, and the board's free-running microsecond timer.

use embedded_hal::blocking::spi::Write as SpiWrite;
use embedded_hal::digital::v2::InputPin;
use log::warn;

use super::{Clock, DetectLines, Line, Link};

/// The card socket's detect lines. The card-detect switch pulls its pin low
/// when a card is seated; the write-protect switch pulls high on a locked
/// card.
pub struct PinLines<CD, WP> {
    card_detect: CD,
    write_protect: WP,
}

impl<CD, WP> PinLines<CD, WP>
    where CD: InputPin,
          WP: InputPin
{
    pub fn new(card_detect: CD, write_protect: WP) -> Self {
        PinLines { card_detect, write_protect }
    }
}

impl<CD, WP> DetectLines for PinLines<CD, WP>
    where CD: InputPin,
          WP: InputPin
{
    fn digital_read(&mut self, line: Line) -> bool {
        // A pin that cannot be read is treated as deasserted: no card, not
        // protected.
        match line {
            Line::CardDetect => self.card_detect.is_low().unwrap_or(false),
            Line::WriteProtect => self.write_protect.is_high().unwrap_or(false),
        }
    }
}

/// The SPI link to the display device. The device raises its ready line
/// while it can accept another chunk.
pub struct SpiLink<S, R> {
    spi: S,
    ready: R,
}

impl<S, R> SpiLink<S, R>
    where S: SpiWrite<u8>,
          R: InputPin
{
    pub fn new(spi: S, ready: R) -> Self {
        SpiLink { spi, ready }
    }

    /// Give back the bus and pin, e.g. to reconfigure them.
    pub fn release(self) -> (S, R) {
        (self.spi, self.ready)
    }
}

impl<S, R> Link for SpiLink<S, R>
    where S: SpiWrite<u8>,
          R: InputPin
{
    fn is_writable(&mut self) -> bool {
        self.ready.is_high().unwrap_or(false)
    }

    fn spi_write(&mut self, bytes: &[u8]) -> bool {
        match self.spi.write(bytes) {
            Ok(()) => true,
            Err(_) => {
                warn!("SPI write of {} bytes failed.", bytes.len());
                false
            }
        }
    }
}

/// Adapts the board's timer read function (e.g. `time_us_64`) to `Clock`.
pub struct MonotonicClock<F> {
    read: F,
}

impl<F> MonotonicClock<F>
    where F: Fn() -> u64
{
    pub fn new(read: F) -> Self {
        MonotonicClock { read }
    }
}

impl<F> Clock for MonotonicClock<F>
    where F: Fn() -> u64
{
    fn now_us(&self) -> u64 {
        (self.read)()
    }
}
