use log::trace;

use super::hdc_interface::*;

/// A controller that only proves something is on the bus: writes vanish and
/// every read returns the sentinel.
pub struct StubBus;

impl HostBus for StubBus {
    fn port_write(&mut self, address: u16, value: u8) {
        trace!("HDC stub OUT {:02X} <= {:02X}", address & 0xFF, value);
    }

    fn port_read(&mut self, _address: u16) -> u8 {
        STUB_SENTINEL
    }

    fn service_step(&mut self) {
        // no-op
    }

    fn set_media(&mut self, _media: MediaState) {
        // no-op
    }
}
