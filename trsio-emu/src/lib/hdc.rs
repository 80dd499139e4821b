mod hdc_interface;
mod hdc_stub;
mod hdc_wd1010;

pub use hdc_interface::*;
pub use hdc_stub::StubBus;
pub use hdc_wd1010::{Command, CommandOutcome, ControllerState, Wd1010};
