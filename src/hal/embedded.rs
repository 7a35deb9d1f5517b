//! Adapter from `embedded-hal` 1.0 drivers to [`BridgePins`].
//!
//! Any board whose HAL implements [`OutputPin`] for GPIOs and
//! [`SetDutyCycle`] for PWM channels can drive the bridge through
//! [`EmbeddedHalPins`]. Each driver is registered under the pin number the
//! bridge addresses it by.
//!
//! # Example
//!
//! ```rust,ignore
//! use peltier_link::hal::EmbeddedHalPins;
//!
//! let pins = EmbeddedHalPins::new()
//!     .with_output(17, in1)
//!     .with_output(18, in2)
//!     .with_pwm(16, enable_a);
//! ```

use crate::traits::{BridgePins, Level, PinId};
use core::fmt;
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

/// Errors from [`EmbeddedHalPins`].
#[derive(Debug, thiserror::Error)]
pub enum EmbeddedPinError<D: fmt::Debug, P: fmt::Debug> {
    /// No output driver registered for this pin number.
    #[error("no output driver for pin {0}")]
    UnknownOutput(PinId),
    /// No PWM channel registered for this pin number.
    #[error("no PWM channel for pin {0}")]
    UnknownPwm(PinId),
    /// The GPIO driver failed.
    #[error("gpio: {0:?}")]
    Digital(D),
    /// The PWM driver failed.
    #[error("pwm: {0:?}")]
    Pwm(P),
}

/// Pin-number keyed set of `embedded-hal` output pins and PWM channels.
///
/// # Type Parameters
///
/// - `O`: GPIO driver ([`OutputPin`])
/// - `W`: PWM channel driver ([`SetDutyCycle`])
pub struct EmbeddedHalPins<O, W> {
    outputs: Vec<(PinId, O)>,
    pwm: Vec<(PinId, W)>,
}

impl<O, W> Default for EmbeddedHalPins<O, W> {
    fn default() -> Self {
        Self {
            outputs: Vec::new(),
            pwm: Vec::new(),
        }
    }
}

impl<O, W> EmbeddedHalPins<O, W> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a GPIO driver under `pin`, replacing any previous one.
    pub fn with_output(mut self, pin: PinId, driver: O) -> Self {
        self.outputs.retain(|(id, _)| *id != pin);
        self.outputs.push((pin, driver));
        self
    }

    /// Register a PWM channel under `pin`, replacing any previous one.
    pub fn with_pwm(mut self, pin: PinId, channel: W) -> Self {
        self.pwm.retain(|(id, _)| *id != pin);
        self.pwm.push((pin, channel));
        self
    }

    /// The GPIO driver registered under `pin`.
    pub fn output(&self, pin: PinId) -> Option<&O> {
        self.outputs.iter().find(|(id, _)| *id == pin).map(|(_, d)| d)
    }

    /// The PWM channel registered under `pin`.
    pub fn pwm(&self, pin: PinId) -> Option<&W> {
        self.pwm.iter().find(|(id, _)| *id == pin).map(|(_, c)| c)
    }
}

/// Convert a `0.0..=1.0` fraction to a duty value for a channel with `max` full scale.
pub fn duty_from_fraction(fraction: f32, max: u16) -> u16 {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    (fraction * f32::from(max)).round() as u16
}

impl<O, W> BridgePins for EmbeddedHalPins<O, W>
where
    O: OutputPin,
    W: SetDutyCycle,
{
    type Error = EmbeddedPinError<O::Error, W::Error>;

    fn set_digital(&mut self, pin: PinId, level: Level) -> Result<(), Self::Error> {
        let (_, driver) = self
            .outputs
            .iter_mut()
            .find(|(id, _)| *id == pin)
            .ok_or(EmbeddedPinError::UnknownOutput(pin))?;
        match level {
            Level::High => driver.set_high(),
            Level::Low => driver.set_low(),
        }
        .map_err(EmbeddedPinError::Digital)
    }

    fn set_pwm_duty(&mut self, pin: PinId, fraction: f32) -> Result<(), Self::Error> {
        let (_, channel) = self
            .pwm
            .iter_mut()
            .find(|(id, _)| *id == pin)
            .ok_or(EmbeddedPinError::UnknownPwm(pin))?;
        let duty = duty_from_fraction(fraction, channel.max_duty_cycle());
        channel.set_duty_cycle(duty).map_err(EmbeddedPinError::Pwm)
    }
}
