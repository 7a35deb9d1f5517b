//! Pin driver that only logs.
//!
//! Used by the desktop demo to watch the switching sequence without a board.

use crate::traits::{BridgePins, Level, PinId};
use core::convert::Infallible;
use log::info;

/// [`BridgePins`] implementation that logs every write at `info` and keeps
/// a count of writes.
#[derive(Clone, Debug, Default)]
pub struct LoggingPins {
    writes: usize,
}

impl LoggingPins {
    /// Creates a new logging driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes logged so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl BridgePins for LoggingPins {
    type Error = Infallible;

    fn set_digital(&mut self, pin: PinId, level: Level) -> Result<(), Infallible> {
        self.writes += 1;
        info!("[PINS] GPIO{pin:<2} = {level:?}");
        Ok(())
    }

    fn set_pwm_duty(&mut self, pin: PinId, fraction: f32) -> Result<(), Infallible> {
        self.writes += 1;
        info!("[PINS] GPIO{pin:<2} = {:.1}% duty", fraction * 100.0);
        Ok(())
    }
}
