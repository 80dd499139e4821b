use log::{debug, info, trace};
use trsio_utils::hexdump::hexdump_trimmed;

use super::hdc_interface::*;

// Sector sizes selected by SDH bits 5-6.
const SECTOR_SIZES: [usize; 4] = [256, 512, 1024, 128];

/// The commands the controller understands, keyed on the top nibble of the
/// command register. The low nibble (step rate, multi-sector and so on) is
/// not interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Restore,
    ReadSector,
    WriteSector,
    FormatTrack,
    Seek,
    Test,
}

impl Command {
    pub fn decode(value: u8) -> Option<Command> {
        match value >> 4 {
            0x1 => Some(Command::Restore),
            0x2 => Some(Command::ReadSector),
            0x3 => Some(Command::WriteSector),
            0x5 => Some(Command::FormatTrack),
            0x7 => Some(Command::Seek),
            0x9 => Some(Command::Test),
            _ => None,
        }
    }
}

/// What happened to the last command taken off the command register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed(Command),
    /// Accepted, and the controller returned to ready, but nothing was done.
    Unimplemented(Command),
    /// Not a command this controller knows; ignored.
    Unknown(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    /// Holds the command register value waiting for the next service step.
    CommandPending(u8),
}

/// Which cursor the last read/write command armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Idle,
    Read,
    Write,
}

/// A WD1010-compatible Winchester disk controller, as far as the host's
/// firmware can observe it through the register file.
///
/// Data moves byte by byte through the sector buffer. Both cursors stop at
/// the current sector size: extra writes are dropped and extra reads return
/// the last byte latched on the data port.
pub struct Wd1010 {
    error: u8,
    write_precomp: u8,
    sector_count: u8,
    sector_number: u8,
    cylinder_low: u8,
    cylinder_high: u8,
    sdh: u8,
    status: u8,
    write_protect: u8,
    command: u8,
    interrupt_request: bool,
    sector_buffer: [u8; SECTOR_BUFFER_SIZE],
    sector_size: usize,
    drive_select: u8,
    head_select: u8,
    read_cursor: usize,
    write_cursor: usize,
    transfer: Transfer,
    data_latch: u8,
    state: ControllerState,
    last_outcome: Option<CommandOutcome>,
    media: MediaState,
}

impl Wd1010 {
    pub fn new() -> Self {
        let mut hdc = Wd1010 {
            error: 0,
            write_precomp: 0,
            sector_count: 0,
            sector_number: 0,
            cylinder_low: 0,
            cylinder_high: 0,
            sdh: 0,
            status: 0,
            write_protect: 0,
            command: 0,
            interrupt_request: false,
            sector_buffer: [0; SECTOR_BUFFER_SIZE],
            sector_size: SECTOR_SIZES[0],
            drive_select: 0,
            head_select: 0,
            read_cursor: 0,
            write_cursor: 0,
            transfer: Transfer::Idle,
            data_latch: 0,
            state: ControllerState::Idle,
            last_outcome: None,
            media: MediaState::default(),
        };
        hdc.reset();
        hdc
    }

    /// Power-on state: everything zero except drive ready. The media state
    /// is left alone since the card doesn't care about a controller reset.
    pub fn reset(&mut self) {
        let media = self.media;
        self.sector_buffer = [0; SECTOR_BUFFER_SIZE];
        self.error = 0;
        self.write_precomp = 0;
        self.sector_count = 0;
        self.sector_number = 0;
        self.cylinder_low = 0;
        self.cylinder_high = 0;
        self.sdh = 0;
        self.command = 0;
        self.interrupt_request = false;
        self.sector_size = SECTOR_SIZES[0];
        self.drive_select = 0;
        self.head_select = 0;
        self.read_cursor = 0;
        self.write_cursor = 0;
        self.transfer = Transfer::Idle;
        self.data_latch = 0;
        self.state = ControllerState::Idle;
        self.last_outcome = None;
        self.status = STATUS_READY;
        self.write_protect = 0;
        self.set_media(media);
        debug!("HDC reset.");
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn last_outcome(&self) -> Option<CommandOutcome> {
        self.last_outcome
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn drive_select(&self) -> u8 {
        self.drive_select
    }

    pub fn head_select(&self) -> u8 {
        self.head_select
    }

    pub fn cylinder(&self) -> u16 {
        u16::from_be_bytes([self.cylinder_high, self.cylinder_low])
    }

    pub fn interrupt_request(&self) -> bool {
        self.interrupt_request
    }

    pub fn media(&self) -> MediaState {
        self.media
    }

    pub fn sector_buffer(&self) -> &[u8] {
        &self.sector_buffer
    }

    /// Where the cursors stop for the current transfer.
    fn transfer_limit(&self) -> usize {
        self.sector_size.min(SECTOR_BUFFER_SIZE)
    }

    fn write_data(&mut self, value: u8) {
        self.data_latch = value;
        // Only a write-sector command opens the buffer to the host.
        let limit = self.transfer_limit();
        if self.transfer != Transfer::Write || self.write_cursor >= limit {
            return;
        }
        self.sector_buffer[self.write_cursor] = value;
        self.write_cursor += 1;
        if self.write_cursor == limit {
            self.finish_transfer();
        }
    }

    fn read_data(&mut self) -> u8 {
        let limit = self.transfer_limit();
        if self.transfer == Transfer::Read && self.read_cursor < limit {
            self.data_latch = self.sector_buffer[self.read_cursor];
            self.read_cursor += 1;
            if self.read_cursor == limit {
                self.finish_transfer();
            }
        }
        self.data_latch
    }

    /// The whole sector has crossed the data port.
    fn finish_transfer(&mut self) {
        debug!("HDC {:?} transfer of {} bytes done.", self.transfer, self.sector_size);
        if self.transfer == Transfer::Write {
            trace!("HDC sector buffer:\n{}",
                   hexdump_trimmed(&self.sector_buffer[..self.transfer_limit()]));
        }
        self.transfer = Transfer::Idle;
        self.status &= !STATUS_DATA_REQUEST;
        self.interrupt_request = true;
    }

    /// Arm a sector transfer using the geometry currently in SDH.
    fn setup_transfer(&mut self, transfer: Transfer) {
        self.sector_size = SECTOR_SIZES[usize::from((self.sdh >> 5) & 0x03)];
        self.drive_select = (self.sdh >> 3) & 0x03;
        self.head_select = self.sdh & 0x07;
        match transfer {
            Transfer::Read => self.read_cursor = 0,
            Transfer::Write => self.write_cursor = 0,
            Transfer::Idle => {}
        }
        self.transfer = transfer;
        self.status |= STATUS_DATA_REQUEST;
        debug!("HDC {:?} setup: drive {} head {} cylinder {} sector {} size {}.",
               transfer, self.drive_select, self.head_select, self.cylinder(),
               self.sector_number, self.sector_size);
    }

    /// Drop any transfer a previous command left armed.
    fn cancel_transfer(&mut self) {
        if self.transfer != Transfer::Idle {
            debug!("HDC {:?} transfer abandoned.", self.transfer);
        }
        self.transfer = Transfer::Idle;
        self.status &= !STATUS_DATA_REQUEST;
    }

    fn execute(&mut self, value: u8) -> CommandOutcome {
        let command = match Command::decode(value) {
            Some(command) => command,
            None => {
                self.cancel_transfer();
                return CommandOutcome::Unknown(value);
            }
        };
        match command {
            Command::Restore | Command::Seek | Command::Test => {
                self.cancel_transfer();
                self.status |= STATUS_SEEK_COMPLETE;
            }
            Command::ReadSector => self.setup_transfer(Transfer::Read),
            Command::WriteSector => self.setup_transfer(Transfer::Write),
            Command::FormatTrack => {
                self.cancel_transfer();
                return CommandOutcome::Unimplemented(command);
            }
        }
        CommandOutcome::Completed(command)
    }

    fn write_protect_register(&self) -> u8 {
        let irq = if self.interrupt_request { WP_INTERRUPT_REQUEST } else { 0 };
        self.write_protect | irq
    }
}

impl Default for Wd1010 {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBus for Wd1010 {
    fn port_write(&mut self, address: u16, value: u8) {
        let port = address.to_le_bytes()[0];
        trace!("HDC OUT {:02X} <= {:02X}", port, value);

        match port {
            PORT_DATA => self.write_data(value),
            PORT_WRITE_PRECOMP => self.write_precomp = value,
            PORT_SECTOR_COUNT => self.sector_count = value,
            PORT_SECTOR_NUMBER => self.sector_number = value,
            PORT_CYLINDER_LOW => self.cylinder_low = value,
            PORT_CYLINDER_HIGH => self.cylinder_high = value,
            PORT_SDH => self.sdh = value,
            PORT_COMMAND => {
                if let ControllerState::CommandPending(previous) = self.state {
                    debug!("HDC command {:02X} replaced before it ran.", previous);
                }
                self.command = value;
                self.status &= !STATUS_READY;
                self.interrupt_request = false;
                self.state = ControllerState::CommandPending(value);
            }
            // Board control, and anything unmapped.
            _ => {}
        }
    }

    fn port_read(&mut self, address: u16) -> u8 {
        let port = address.to_le_bytes()[0];
        let value = match port {
            PORT_WRITE_PROTECT => self.write_protect_register(),
            PORT_DATA => self.read_data(),
            PORT_ERROR => self.error,
            PORT_SECTOR_COUNT => self.sector_count,
            PORT_SECTOR_NUMBER => self.sector_number,
            PORT_CYLINDER_LOW => self.cylinder_low,
            PORT_CYLINDER_HIGH => self.cylinder_high,
            PORT_SDH => self.sdh,
            PORT_STATUS => {
                // Reading status acknowledges the interrupt.
                self.interrupt_request = false;
                self.status
            }
            _ => 0,
        };
        if port != PORT_DATA {
            trace!("HDC IN  {:02X} => {:02X}", port, value);
        }
        value
    }

    fn service_step(&mut self) {
        let value = match self.state {
            ControllerState::Idle => return,
            ControllerState::CommandPending(value) => value,
        };

        let outcome = self.execute(value);
        match outcome {
            CommandOutcome::Completed(command) => debug!("HDC {:?} ({:02X}) done.", command, value),
            CommandOutcome::Unimplemented(command) =>
                debug!("HDC {:?} ({:02X}) accepted, not implemented.", command, value),
            CommandOutcome::Unknown(value) => debug!("HDC ignoring unknown command {:02X}.", value),
        }

        // Whatever the command, the controller comes back ready.
        self.last_outcome = Some(outcome);
        self.command = 0;
        self.status |= STATUS_READY;
        self.state = ControllerState::Idle;
    }

    fn set_media(&mut self, media: MediaState) {
        if media != self.media {
            info!("HDC media: {}, {}.",
                  if media.available { "available" } else { "unavailable" },
                  if media.write_protected { "write protected" } else { "writable" });
        }
        self.media = media;
        if media.write_protected {
            self.write_protect |= WP_ANY_PROTECTED | WP_DRIVE_1;
        } else {
            self.write_protect &= !(WP_ANY_PROTECTED | WP_DRIVE_1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{self, Rng};

    use crate::init_test_logging;

    const DATA: u16 = PORT_DATA as u16;
    const SDH: u16 = PORT_SDH as u16;
    const COMMAND: u16 = PORT_COMMAND as u16;
    const STATUS: u16 = PORT_STATUS as u16;

    const CMD_RESTORE: u8 = 0x10;
    const CMD_READ: u8 = 0x20;
    const CMD_WRITE: u8 = 0x30;
    const CMD_FORMAT: u8 = 0x50;
    const CMD_SEEK: u8 = 0x70;
    const CMD_TEST: u8 = 0x90;

    fn new_hdc() -> Wd1010 {
        init_test_logging();
        Wd1010::new()
    }

    /// Write a command and let it run.
    fn run_command(hdc: &mut Wd1010, command: u8) {
        hdc.port_write(COMMAND, command);
        hdc.service_step();
    }

    #[test]
    fn test_reset_state() {
        let mut hdc = new_hdc();
        assert_eq!(hdc.state(), ControllerState::Idle);
        assert_eq!(hdc.port_read(STATUS), STATUS_READY);
        for port in [0xC0, 0xC9, 0xCA, 0xCB, 0xCC, 0xCD, 0xCE] {
            assert_eq!(hdc.port_read(port), 0);
        }
    }

    #[test]
    fn test_command_is_deferred() {
        let mut hdc = new_hdc();
        hdc.port_write(COMMAND, CMD_RESTORE);
        assert_eq!(hdc.state(), ControllerState::CommandPending(CMD_RESTORE));
        assert_eq!(hdc.port_read(STATUS) & STATUS_READY, 0);
        assert_eq!(hdc.port_read(STATUS) & STATUS_SEEK_COMPLETE, 0);

        hdc.service_step();
        assert_eq!(hdc.state(), ControllerState::Idle);
        assert_eq!(hdc.port_read(STATUS), STATUS_READY | STATUS_SEEK_COMPLETE);
        assert_eq!(hdc.last_outcome(), Some(CommandOutcome::Completed(Command::Restore)));
    }

    #[test]
    fn test_idle_service_does_nothing() {
        let mut hdc = new_hdc();
        hdc.service_step();
        hdc.service_step();
        assert_eq!(hdc.port_read(STATUS), STATUS_READY);
        assert_eq!(hdc.last_outcome(), None);
    }

    #[test]
    fn test_every_opcode_returns_to_ready() {
        let mut hdc = new_hdc();
        for value in 0..=255u8 {
            hdc.port_write(COMMAND, value);
            assert_eq!(hdc.port_read(STATUS) & STATUS_READY, 0);
            hdc.service_step();
            assert_eq!(hdc.command, 0, "command {:02X}", value);
            assert_ne!(hdc.port_read(STATUS) & STATUS_READY, 0, "command {:02X}", value);
            assert_eq!(hdc.state(), ControllerState::Idle);
            // Nothing ever reports an error.
            assert_eq!(hdc.port_read(STATUS) & (STATUS_ERROR | STATUS_BUSY | STATUS_WRITE_FAULT), 0);
        }
    }

    #[test]
    fn test_unknown_and_format_commands() {
        let mut hdc = new_hdc();
        run_command(&mut hdc, 0xF3);
        assert_eq!(hdc.last_outcome(), Some(CommandOutcome::Unknown(0xF3)));
        assert_eq!(hdc.port_read(STATUS), STATUS_READY);

        run_command(&mut hdc, CMD_FORMAT);
        assert_eq!(hdc.last_outcome(),
                   Some(CommandOutcome::Unimplemented(Command::FormatTrack)));
        assert_eq!(hdc.port_read(STATUS), STATUS_READY);
    }

    #[test]
    fn test_seek_and_test_set_seek_complete() {
        for command in [CMD_SEEK, CMD_TEST, CMD_RESTORE | 0x0F] {
            let mut hdc = new_hdc();
            run_command(&mut hdc, command);
            assert_eq!(hdc.port_read(STATUS), STATUS_READY | STATUS_SEEK_COMPLETE);
        }
    }

    #[test]
    fn test_pending_command_overwritten() {
        let mut hdc = new_hdc();
        hdc.port_write(COMMAND, CMD_SEEK);
        hdc.port_write(COMMAND, CMD_WRITE);
        hdc.service_step();
        assert_eq!(hdc.last_outcome(), Some(CommandOutcome::Completed(Command::WriteSector)));
        assert_eq!(hdc.port_read(STATUS) & STATUS_SEEK_COMPLETE, 0);
        assert_ne!(hdc.port_read(STATUS) & STATUS_DATA_REQUEST, 0);
        // Only one command ran.
        hdc.service_step();
        assert_eq!(hdc.state(), ControllerState::Idle);
    }

    #[test]
    fn test_register_file() {
        let mut hdc = new_hdc();
        let pairs = [(0xCA, 0x11), (0xCB, 0x22), (0xCC, 0x33), (0xCD, 0x03), (0xCE, 0xFF)];
        for (port, value) in pairs {
            hdc.port_write(port, value);
        }
        for (port, value) in pairs {
            assert_eq!(hdc.port_read(port), value);
        }
        assert_eq!(hdc.cylinder(), 0x0333);

        // Precomp shares an address with the error register.
        hdc.port_write(0xC9, 0x80);
        assert_eq!(hdc.write_precomp, 0x80);
        assert_eq!(hdc.port_read(0xC9), 0);
    }

    #[test]
    fn test_address_high_byte_ignored() {
        let mut hdc = new_hdc();
        hdc.port_write(0x47CB, 0x09);
        assert_eq!(hdc.port_read(0x00CB), 0x09);
        assert_eq!(hdc.port_read(0xFFCB), 0x09);
    }

    #[test]
    fn test_unmapped_ports() {
        let mut hdc = new_hdc();
        let mut rng = rand::thread_rng();
        for port in (0x00..=0xFFu16).filter(|p| !(0xC8..=0xCF).contains(p) && *p != 0xC0) {
            hdc.port_write(port, rng.gen());
            assert_eq!(hdc.port_read(port), 0);
        }
        assert_eq!(hdc.port_read(STATUS), STATUS_READY);
        assert_eq!(hdc.state(), ControllerState::Idle);
    }

    #[test]
    fn test_sdh_decoding() {
        let cases = [
            (0b0_00_00_000, 256, 0, 0),
            (0b0_01_01_011, 512, 1, 3),
            (0b0_10_10_101, 1024, 2, 5),
            (0b1_11_11_111, 128, 3, 7),
        ];
        for (sdh, size, drive, head) in cases {
            let mut hdc = new_hdc();
            hdc.port_write(SDH, sdh);
            run_command(&mut hdc, CMD_READ);
            assert_eq!(hdc.sector_size(), size);
            assert_eq!(hdc.drive_select(), drive);
            assert_eq!(hdc.head_select(), head);
        }
    }

    #[test]
    fn test_sector_round_trip() {
        let mut rng = rand::thread_rng();
        for sdh in [0x00, 0x20, 0x40, 0x60] {
            let mut hdc = new_hdc();
            hdc.port_write(SDH, sdh);
            run_command(&mut hdc, CMD_WRITE);
            let size = hdc.sector_size();
            let data: Vec<u8> = (0..size).map(|_| rng.gen()).collect();
            for &b in &data {
                hdc.port_write(DATA, b);
            }

            run_command(&mut hdc, CMD_READ);
            let read: Vec<u8> = (0..size).map(|_| hdc.port_read(DATA)).collect();
            assert_eq!(read, data);
        }
    }

    #[test]
    fn test_write_cursor_saturates() {
        let mut hdc = new_hdc();
        run_command(&mut hdc, CMD_WRITE);
        for i in 0..SECTOR_BUFFER_SIZE + 10 {
            hdc.port_write(DATA, (i % 251) as u8);
        }
        // Nothing beyond the 256-byte sector was touched.
        assert_eq!(hdc.sector_buffer()[255], (255 % 251) as u8);
        assert!(hdc.sector_buffer()[256..].iter().all(|&b| b == 0));

        run_command(&mut hdc, CMD_READ);
        for i in 0..256 {
            assert_eq!(hdc.port_read(DATA), (i % 251) as u8);
        }
    }

    #[test]
    fn test_read_cursor_saturates() {
        let mut hdc = new_hdc();
        hdc.port_write(SDH, 0x40);
        run_command(&mut hdc, CMD_WRITE);
        for i in 0..1024 {
            hdc.port_write(DATA, (i & 0xFF) as u8 ^ 0xA5);
        }
        run_command(&mut hdc, CMD_READ);
        let mut last = 0;
        for _ in 0..1024 {
            last = hdc.port_read(DATA);
        }
        // Reads past the sector keep returning the latched final byte.
        for _ in 0..SECTOR_BUFFER_SIZE * 2 {
            assert_eq!(hdc.port_read(DATA), last);
        }
        assert_eq!(last, 0xFF ^ 0xA5);
    }

    #[test]
    fn test_data_request_and_interrupt() {
        let mut hdc = new_hdc();
        hdc.port_write(SDH, 0x60);
        run_command(&mut hdc, CMD_WRITE);
        assert_ne!(hdc.port_read(STATUS) & STATUS_DATA_REQUEST, 0);
        for _ in 0..127 {
            hdc.port_write(DATA, 0x42);
        }
        assert_ne!(hdc.port_read(STATUS) & STATUS_DATA_REQUEST, 0);
        assert_eq!(hdc.port_read(PORT_WRITE_PROTECT as u16) & WP_INTERRUPT_REQUEST, 0);

        hdc.port_write(DATA, 0x42);
        assert!(hdc.interrupt_request());
        assert_eq!(hdc.port_read(PORT_WRITE_PROTECT as u16) & WP_INTERRUPT_REQUEST,
                   WP_INTERRUPT_REQUEST);
        // Reading status acknowledges.
        assert_eq!(hdc.port_read(STATUS) & STATUS_DATA_REQUEST, 0);
        assert!(!hdc.interrupt_request());
    }

    #[test]
    fn test_command_clears_interrupt() {
        let mut hdc = new_hdc();
        hdc.port_write(SDH, 0x60);
        run_command(&mut hdc, CMD_READ);
        for _ in 0..128 {
            hdc.port_read(DATA);
        }
        assert!(hdc.interrupt_request());
        hdc.port_write(COMMAND, CMD_TEST);
        assert!(!hdc.interrupt_request());
    }

    #[test]
    fn test_data_writes_ignored_while_reading() {
        let mut hdc = new_hdc();
        hdc.port_write(SDH, 0x60);
        run_command(&mut hdc, CMD_READ);
        hdc.port_write(DATA, 0x77);
        assert_eq!(hdc.port_read(DATA), 0x00);
        assert!(hdc.sector_buffer().iter().all(|&b| b == 0));

        // Outside any transfer the data port only moves the latch.
        let mut hdc = new_hdc();
        hdc.port_write(DATA, 0x5A);
        assert_eq!(hdc.port_read(DATA), 0x5A);
        assert!(hdc.sector_buffer().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_non_transfer_commands_disarm_transfer() {
        for command in [CMD_RESTORE, CMD_SEEK, CMD_TEST, CMD_FORMAT, 0xF0, 0x00] {
            let mut hdc = new_hdc();
            hdc.port_write(SDH, 0x60);
            run_command(&mut hdc, CMD_WRITE);
            hdc.port_write(DATA, 0x11);
            run_command(&mut hdc, command);
            assert_eq!(hdc.port_read(STATUS) & STATUS_DATA_REQUEST, 0, "command {:02X}", command);

            // The abandoned write no longer reaches the buffer.
            hdc.port_write(DATA, 0x22);
            assert_eq!(&hdc.sector_buffer()[..2], &[0x11, 0x00], "command {:02X}", command);
            assert!(!hdc.interrupt_request());
        }

        let mut hdc = new_hdc();
        run_command(&mut hdc, CMD_READ);
        run_command(&mut hdc, CMD_SEEK);
        assert_eq!(hdc.port_read(STATUS), STATUS_READY | STATUS_SEEK_COMPLETE);
        let latch = hdc.port_read(DATA);
        assert_eq!(latch, 0);
    }

    #[test]
    fn test_media_write_protect() {
        let mut hdc = new_hdc();
        hdc.set_media(MediaState { available: true, write_protected: true });
        assert_eq!(hdc.port_read(PORT_WRITE_PROTECT as u16), WP_ANY_PROTECTED | WP_DRIVE_1);
        // Ready is not the card's business.
        assert_eq!(hdc.port_read(STATUS), STATUS_READY);

        hdc.reset();
        assert_eq!(hdc.port_read(PORT_WRITE_PROTECT as u16), WP_ANY_PROTECTED | WP_DRIVE_1);

        hdc.set_media(MediaState { available: true, write_protected: false });
        assert_eq!(hdc.port_read(PORT_WRITE_PROTECT as u16), 0);
        assert!(hdc.media().available);
    }
}
