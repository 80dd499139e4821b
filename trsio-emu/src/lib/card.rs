use log::{debug, info, warn};

use crate::hal::{DetectLines, Line, Storage, VolumeGeometry};
use crate::hdc::MediaState;

/// Identification attempts allowed per insertion.
pub const MAX_INIT_ATTEMPTS: u32 = 5;
/// Consecutive present polls required before a new card is identified.
pub const DEFAULT_DEBOUNCE_THRESHOLD: u32 = 10000;
/// The volume the storage collaborator mounts.
pub const VOLUME: &str = "0:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Removed,
    /// Present line seen, waiting for it to stay put.
    Debouncing,
    /// Identification will be attempted on the next poll.
    Initializing,
    Ready,
    /// All attempts used up; nothing more happens until the card is removed.
    Failed,
}

/// Watches the card socket and identifies newly inserted cards.
///
/// Insertion is debounced: the present line must be seen on `threshold`
/// consecutive polls before the storage collaborator is asked to mount.
/// Removal needs no debouncing and takes effect on the poll that sees it.
pub struct CardPresenceMonitor<D, S> {
    lines: D,
    storage: S,
    state: CardState,
    threshold: u32,
    presence_count: u32,
    init_attempts: u32,
    write_protected: bool,
    geometry: VolumeGeometry,
}

impl<D: DetectLines, S: Storage> CardPresenceMonitor<D, S> {
    pub fn new(lines: D, storage: S) -> Self {
        Self::with_threshold(lines, storage, DEFAULT_DEBOUNCE_THRESHOLD)
    }

    pub fn with_threshold(lines: D, storage: S, threshold: u32) -> Self {
        CardPresenceMonitor {
            lines,
            storage,
            state: CardState::Removed,
            threshold: threshold.max(1),
            presence_count: 0,
            init_attempts: 0,
            write_protected: false,
            geometry: VolumeGeometry::default(),
        }
    }

    /// Sample the socket at boot. A card that is already in place is
    /// identified straight away.
    pub fn init(&mut self) {
        self.state = CardState::Removed;
        self.presence_count = 0;
        self.init_attempts = 0;
        self.geometry = VolumeGeometry::default();
        self.write_protected = self.lines.digital_read(Line::WriteProtect);
        if self.lines.digital_read(Line::CardDetect) {
            info!("Card present at boot.");
            self.identify();
        } else {
            info!("No card at boot.");
        }
    }

    /// One scheduling tick.
    pub fn poll_detect_lines(&mut self) {
        let present = self.lines.digital_read(Line::CardDetect);
        let write_protected = self.lines.digital_read(Line::WriteProtect);

        if write_protected != self.write_protected {
            debug!("Card write protect line {}.", if write_protected { "set" } else { "clear" });
            self.write_protected = write_protected;
        }

        if !present {
            if self.state != CardState::Removed {
                info!("Card removed.");
                self.state = CardState::Removed;
                self.presence_count = 0;
                self.init_attempts = 0;
                self.geometry = VolumeGeometry::default();
            }
            return;
        }

        match self.state {
            CardState::Removed => {
                debug!("Card inserted, debouncing.");
                self.state = CardState::Debouncing;
                self.presence_count = 1;
                self.settle();
            }
            CardState::Debouncing => {
                self.presence_count = self.presence_count.saturating_add(1);
                self.settle();
            }
            CardState::Initializing => self.identify(),
            CardState::Ready | CardState::Failed => {}
        }
    }

    fn settle(&mut self) {
        if self.presence_count >= self.threshold {
            debug!("Card insertion stable after {} polls.", self.presence_count);
            self.init_attempts = 0;
            self.identify();
        }
    }

    /// One identification attempt: mount, then read the geometry.
    fn identify(&mut self) {
        if self.init_attempts >= MAX_INIT_ATTEMPTS {
            self.state = CardState::Failed;
            return;
        }
        self.init_attempts += 1;
        self.geometry = VolumeGeometry::default();

        let result = self.storage.mount(VOLUME)
            .and_then(|()| self.storage.query_free_space(VOLUME));
        match result {
            Ok(geometry) => {
                info!("Card ready: {} of {} sectors free, {} bytes per sector, {} per cluster.",
                      geometry.free_sectors, geometry.total_sectors,
                      geometry.sector_size, geometry.cluster_size);
                self.geometry = geometry;
                self.state = CardState::Ready;
            }
            Err(e) => {
                warn!("Card identification attempt {} failed: {}", self.init_attempts, e);
                self.state = if self.init_attempts >= MAX_INIT_ATTEMPTS {
                    info!("Giving up on card until it is removed.");
                    CardState::Failed
                } else {
                    CardState::Initializing
                };
            }
        }
    }

    /// True from the first present poll onwards, debouncing included.
    pub fn is_present(&self) -> bool {
        self.state != CardState::Removed
    }

    pub fn is_initialized(&self) -> bool {
        self.state == CardState::Ready
    }

    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn state(&self) -> CardState {
        self.state
    }

    pub fn init_attempts(&self) -> u32 {
        self.init_attempts
    }

    pub fn presence_count(&self) -> u32 {
        self.presence_count
    }

    /// Zeroed unless the card is ready.
    pub fn geometry(&self) -> VolumeGeometry {
        self.geometry
    }

    pub fn media_state(&self) -> MediaState {
        MediaState {
            available: self.is_initialized(),
            write_protected: self.is_present() && self.write_protected,
        }
    }
}
