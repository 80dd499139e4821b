// Port addresses (low byte of the host I/O address).
pub const PORT_WRITE_PROTECT: u8 = 0xC0;    // Read: write protect / INTRQ.
pub const PORT_CONTROL: u8 = 0xC1;          // Board control; accepted, ignored.
pub const PORT_DATA: u8 = 0xC8;             // Sector buffer data.
pub const PORT_ERROR: u8 = 0xC9;            // Read.
pub const PORT_WRITE_PRECOMP: u8 = 0xC9;    // Write.
pub const PORT_SECTOR_COUNT: u8 = 0xCA;
pub const PORT_SECTOR_NUMBER: u8 = 0xCB;
pub const PORT_CYLINDER_LOW: u8 = 0xCC;
pub const PORT_CYLINDER_HIGH: u8 = 0xCD;
pub const PORT_SDH: u8 = 0xCE;              // Sector size / drive / head.
pub const PORT_STATUS: u8 = 0xCF;           // Read.
pub const PORT_COMMAND: u8 = 0xCF;          // Write.

// Bit flags for the status register.
pub const STATUS_ERROR: u8 = 0x01;
pub const STATUS_DATA_REQUEST: u8 = 0x08;
pub const STATUS_SEEK_COMPLETE: u8 = 0x10;
pub const STATUS_WRITE_FAULT: u8 = 0x20;
pub const STATUS_READY: u8 = 0x40;
pub const STATUS_BUSY: u8 = 0x80;

// Bit flags for the write protect register.
pub const WP_INTERRUPT_REQUEST: u8 = 0x01;
pub const WP_ANY_PROTECTED: u8 = 0x02;
pub const WP_DRIVE_1: u8 = 0x80;

// Size of the sector buffer.
pub const SECTOR_BUFFER_SIZE: usize = 0x800;

// Returned for every read by the stub binding.
pub const STUB_SENTINEL: u8 = 0x55;

/// State of the storage card, as far as the disk controller cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaState {
    pub available: bool,
    pub write_protected: bool,
}

/// The disk controller as seen from the host bus.
///
/// `port_write` and `port_read` may be called at any point between service
/// steps and only ever do constant work; commands are carried out by
/// `service_step`.
pub trait HostBus {
    fn port_write(&mut self, address: u16, value: u8);
    fn port_read(&mut self, address: u16) -> u8;
    fn service_step(&mut self);
    fn set_media(&mut self, media: MediaState);
}

impl<T: HostBus + ?Sized> HostBus for Box<T> {
    fn port_write(&mut self, address: u16, value: u8) {
        (**self).port_write(address, value)
    }

    fn port_read(&mut self, address: u16) -> u8 {
        (**self).port_read(address)
    }

    fn service_step(&mut self) {
        (**self).service_step()
    }

    fn set_media(&mut self, media: MediaState) {
        (**self).set_media(media)
    }
}
