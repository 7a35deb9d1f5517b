//! H-bridge driver for a Peltier element.
//!
//! This module provides [`HBridge`], the only component allowed to touch the
//! six bridge control lines, and [`ActuatorState`], its latched state.
//!
//! # Line Layout
//!
//! A dual H-bridge (L298N style) driving one element from both channels:
//!
//! | Line | Role |
//! |------|------|
//! | `enable_a`, `enable_b` | PWM enables, set the output magnitude |
//! | `in1`, `in3` | Normal-polarity pair |
//! | `in2`, `in4` | Reverse-polarity pair |
//!
//! # Switching Sequence
//!
//! Every change runs the same sequence:
//!
//! 1. Both enables to duty 0 (no current path exists from here on)
//! 2. On a polarity change: all four direction lines low, then the new pair high
//! 3. Clamp the magnitude to `0..=max_magnitude`
//! 4. Both enables to the clamped duty, latch the new state
//!
//! The two pairs are never high at the same time and no direction line ever
//! moves while an enable is non-zero.
//!
//! # Example
//!
//! ```rust
//! use peltier_link::{ActuatorConfig, HBridge, Polarity};
//! use peltier_link::hal::MockPins;
//!
//! let mut bridge = HBridge::new(MockPins::new(), &ActuatorConfig::default()).unwrap();
//!
//! bridge.set_output(40.0, Polarity::Reverse).unwrap();
//! let state = bridge.state();
//! assert_eq!(state.magnitude, 40.0);
//! assert_eq!(state.polarity, Some(Polarity::Reverse));
//!
//! // Out-of-range values are clamped, not rejected
//! bridge.set_output(250.0, Polarity::Reverse).unwrap();
//! assert_eq!(bridge.state().magnitude, 100.0);
//! ```

use crate::config::ActuatorConfig;
use crate::traits::{BridgePins, Level, PinId, Polarity};
use core::fmt;
use log::{debug, trace, warn};

/// Pin numbers of the six bridge control lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeLines {
    /// PWM enable for channel A.
    pub enable_a: PinId,
    /// Channel A, normal-polarity input.
    pub in1: PinId,
    /// Channel A, reverse-polarity input.
    pub in2: PinId,
    /// PWM enable for channel B.
    pub enable_b: PinId,
    /// Channel B, normal-polarity input.
    pub in3: PinId,
    /// Channel B, reverse-polarity input.
    pub in4: PinId,
}

impl BridgeLines {
    /// Both PWM enable lines.
    #[inline]
    pub const fn enables(&self) -> [PinId; 2] {
        [self.enable_a, self.enable_b]
    }

    /// The pair asserted for `polarity`.
    #[inline]
    pub const fn pair(&self, polarity: Polarity) -> [PinId; 2] {
        match polarity {
            Polarity::Normal => [self.in1, self.in3],
            Polarity::Reverse => [self.in2, self.in4],
        }
    }

    /// All four direction lines.
    #[inline]
    pub const fn direction_lines(&self) -> [PinId; 4] {
        [self.in1, self.in2, self.in3, self.in4]
    }
}

impl From<&ActuatorConfig> for BridgeLines {
    fn from(config: &ActuatorConfig) -> Self {
        Self {
            enable_a: config.enable_a,
            in1: config.in1,
            in2: config.in2,
            enable_b: config.enable_b,
            in3: config.in3,
            in4: config.in4,
        }
    }
}

/// Latched actuator state.
///
/// Starts with every output disabled and no polarity asserted.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorState {
    /// Asserted polarity, `None` while all direction lines are low.
    pub polarity: Option<Polarity>,
    /// Latched magnitude, always within `0..=max_magnitude`.
    pub magnitude: f32,
    /// Full-scale magnitude.
    pub max_magnitude: f32,
    /// Set while a switching sequence is running or after one failed midway.
    pub transitioning: bool,
}

impl ActuatorState {
    /// Safe initial state for a bridge with the given full scale.
    pub const fn disabled(max_magnitude: f32) -> Self {
        Self {
            polarity: None,
            magnitude: 0.0,
            max_magnitude,
            transitioning: false,
        }
    }

    /// PWM duty fraction corresponding to the latched magnitude.
    pub fn duty(&self) -> f32 {
        if self.max_magnitude > 0.0 {
            (self.magnitude / self.max_magnitude).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Returns true if current can flow (a polarity is asserted and duty is non-zero).
    pub fn is_active(&self) -> bool {
        self.polarity.is_some() && self.magnitude > 0.0 && !self.transitioning
    }
}

/// What a [`HBridge::set_output`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputChange {
    /// Same magnitude and polarity already latched; no lines were written.
    Unchanged,
    /// Magnitude changed, polarity lines left alone.
    Magnitude,
    /// Polarity lines were switched (magnitude may also have changed).
    Polarity,
}

/// A pin write failed.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError<E: fmt::Debug> {
    /// The pin layer rejected a write to `pin`.
    #[error("write to pin {pin} failed: {error:?}")]
    Pin {
        /// Line that failed.
        pin: PinId,
        /// Error reported by the pin layer.
        error: E,
    },
}

/// Clamp a requested magnitude into `0..=max`. NaN maps to 0, as does
/// anything when `max` is not positive.
#[inline]
pub fn clamp_magnitude(magnitude: f32, max: f32) -> f32 {
    if magnitude.is_nan() || !(max > 0.0) {
        0.0
    } else {
        magnitude.clamp(0.0, max)
    }
}

/// H-bridge actuator driver.
///
/// Owns the pin driver and the only copy of [`ActuatorState`]. Not
/// thread-safe; it is driven from the single control loop.
///
/// # Type Parameter
///
/// - `P`: The pin implementation ([`BridgePins`] trait)
pub struct HBridge<P: BridgePins> {
    pins: P,
    lines: BridgeLines,
    state: ActuatorState,
}

impl<P: BridgePins> HBridge<P> {
    /// Create a driver and force all six lines to the safe state.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the initial pin writes fails.
    pub fn new(pins: P, config: &ActuatorConfig) -> Result<Self, ActuatorError<P::Error>> {
        let mut bridge = Self {
            pins,
            lines: BridgeLines::from(config),
            state: ActuatorState::disabled(config.max_magnitude),
        };
        bridge.disable()?;
        debug!(
            "[HBRIDGE] Ready: EN {:?}, normal {:?}, reverse {:?}",
            bridge.lines.enables(),
            bridge.lines.pair(Polarity::Normal),
            bridge.lines.pair(Polarity::Reverse)
        );
        Ok(bridge)
    }

    /// Change the commanded output.
    ///
    /// `magnitude` is clamped to `0..=max_magnitude`. A request identical to
    /// the latched state is a no-op.
    ///
    /// # Errors
    ///
    /// If a pin write fails the driver attempts to disable the bridge, leaves
    /// [`ActuatorState::transitioning`] set and returns the failing write.
    /// The next call re-runs the full sequence.
    pub fn set_output(
        &mut self,
        magnitude: f32,
        polarity: Polarity,
    ) -> Result<OutputChange, ActuatorError<P::Error>> {
        let target = clamp_magnitude(magnitude, self.state.max_magnitude);

        if !self.state.transitioning
            && self.state.polarity == Some(polarity)
            && self.state.magnitude == target
        {
            trace!("[HBRIDGE] {target} {polarity} already latched");
            return Ok(OutputChange::Unchanged);
        }

        let switch_polarity = self.state.polarity != Some(polarity);
        self.state.transitioning = true;

        match self.run_sequence(target, polarity, switch_polarity) {
            Ok(()) => {
                self.state.polarity = Some(polarity);
                self.state.magnitude = target;
                self.state.transitioning = false;
                debug!("[HBRIDGE] Output {target} {polarity}");
                Ok(if switch_polarity {
                    OutputChange::Polarity
                } else {
                    OutputChange::Magnitude
                })
            }
            Err(e) => {
                warn!("[HBRIDGE] Switching sequence aborted: {e}");
                if let Err(safe) = self.force_safe() {
                    warn!("[HBRIDGE] Could not force safe state: {safe}");
                }
                self.state.polarity = None;
                self.state.magnitude = 0.0;
                Err(e)
            }
        }
    }

    /// Turn everything off: both enables to 0, all direction lines low.
    ///
    /// # Errors
    ///
    /// Returns the first failing write; the state stays marked as transitioning.
    pub fn disable(&mut self) -> Result<(), ActuatorError<P::Error>> {
        self.state.transitioning = true;
        self.force_safe()?;
        self.state = ActuatorState::disabled(self.state.max_magnitude);
        Ok(())
    }

    /// Snapshot of the latched state.
    pub fn state(&self) -> ActuatorState {
        self.state
    }

    /// The configured line layout.
    pub fn lines(&self) -> &BridgeLines {
        &self.lines
    }

    /// Borrow the pin driver.
    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Give back the pin driver.
    pub fn into_pins(self) -> P {
        self.pins
    }

    fn run_sequence(
        &mut self,
        target: f32,
        polarity: Polarity,
        switch_polarity: bool,
    ) -> Result<(), ActuatorError<P::Error>> {
        self.write_enables(0.0)?;

        if switch_polarity {
            for pin in self.lines.direction_lines() {
                self.write_digital(pin, Level::Low)?;
            }
            for pin in self.lines.pair(polarity) {
                self.write_digital(pin, Level::High)?;
            }
        }

        let duty = if self.state.max_magnitude > 0.0 {
            target / self.state.max_magnitude
        } else {
            0.0
        };
        self.write_enables(duty)
    }

    fn force_safe(&mut self) -> Result<(), ActuatorError<P::Error>> {
        // Every line is attempted even after a failure; enables go first.
        let mut result = Ok(());
        for pin in self.lines.enables() {
            result = result.and(self.write_pwm(pin, 0.0));
        }
        for pin in self.lines.direction_lines() {
            result = result.and(self.write_digital(pin, Level::Low));
        }
        result
    }

    fn write_enables(&mut self, duty: f32) -> Result<(), ActuatorError<P::Error>> {
        for pin in self.lines.enables() {
            self.write_pwm(pin, duty)?;
        }
        Ok(())
    }

    fn write_pwm(&mut self, pin: PinId, duty: f32) -> Result<(), ActuatorError<P::Error>> {
        trace!("[HBRIDGE] pwm {pin} <- {duty:.3}");
        self.pins
            .set_pwm_duty(pin, duty)
            .map_err(|error| ActuatorError::Pin { pin, error })
    }

    fn write_digital(&mut self, pin: PinId, level: Level) -> Result<(), ActuatorError<P::Error>> {
        trace!("[HBRIDGE] gpio {pin} <- {level:?}");
        self.pins
            .set_digital(pin, level)
            .map_err(|error| ActuatorError::Pin { pin, error })
    }
}

impl<P: BridgePins + fmt::Debug> fmt::Debug for HBridge<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HBridge")
            .field("pins", &self.pins)
            .field("lines", &self.lines)
            .field("state", &self.state)
            .finish()
    }
}
