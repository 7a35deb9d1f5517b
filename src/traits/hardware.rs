//! Hardware abstraction traits for the H-bridge control lines.
//!
//! The actuator driver never touches GPIO registers itself. It issues
//! semantic commands ("drive pin 17 high", "set pin 16 PWM to 40%") through
//! [`BridgePins`], and the platform layer turns those into electrical
//! operations.
//!
//! # Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`BridgePins`] | Digital + PWM output abstraction for the six bridge lines |
//! | [`Level`] | Logic level of a digital line |
//! | [`Polarity`] | Which diagonal of the bridge sources current |
//!
//! # Implementation
//!
//! For testing and desktop development, use [`MockPins`] or [`LoggingPins`]
//! from [`crate::hal`]. For anything implementing `embedded-hal` 1.0, wrap
//! the pins in [`EmbeddedHalPins`].
//!
//! # Example
//!
//! ```rust
//! use peltier_link::traits::{BridgePins, Level};
//! use peltier_link::hal::MockPins;
//!
//! let mut pins = MockPins::new();
//! pins.set_digital(17, Level::High).unwrap();
//! pins.set_pwm_duty(16, 0.5).unwrap();
//!
//! assert_eq!(pins.level(17), Level::High);
//! assert_eq!(pins.duty(16), 0.5);
//! ```
//!
//! [`MockPins`]: crate::hal::MockPins
//! [`LoggingPins`]: crate::hal::LoggingPins
//! [`EmbeddedHalPins`]: crate::hal::EmbeddedHalPins

use core::fmt;

/// Platform-specific pin number (GPIO index on the target board).
pub type PinId = u8;

/// Logic level of a digital output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Level {
    /// Line driven low (switch off).
    #[default]
    Low,
    /// Line driven high (switch on).
    High,
}

impl Level {
    /// Returns `true` for [`Level::High`].
    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Current polarity through the Peltier element.
///
/// Swapping polarity swaps which face of the element heats and which cools.
/// The mapping from client selector to polarity is fixed: `0` is
/// [`Normal`](Self::Normal), `1` is [`Reverse`](Self::Reverse).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Polarity {
    /// IN1/IN3 high, IN2/IN4 low.
    Normal,
    /// IN2/IN4 high, IN1/IN3 low.
    Reverse,
}

impl Polarity {
    /// Map a wire-level direction selector to a polarity.
    ///
    /// # Examples
    ///
    /// ```
    /// use peltier_link::Polarity;
    ///
    /// assert_eq!(Polarity::from_selector(0), Some(Polarity::Normal));
    /// assert_eq!(Polarity::from_selector(1), Some(Polarity::Reverse));
    /// assert_eq!(Polarity::from_selector(2), None);
    /// assert_eq!(Polarity::from_selector(-1), None);
    /// ```
    pub const fn from_selector(selector: i64) -> Option<Self> {
        match selector {
            0 => Some(Polarity::Normal),
            1 => Some(Polarity::Reverse),
            _ => None,
        }
    }

    /// The selector value a client sends for this polarity.
    #[inline]
    pub const fn selector(self) -> u8 {
        match self {
            Polarity::Normal => 0,
            Polarity::Reverse => 1,
        }
    }

    /// Returns the polarity as a lowercase string.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Polarity::Normal => "normal",
            Polarity::Reverse => "reverse",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output abstraction for the bridge control lines.
///
/// Both operations are treated as immediate, non-blocking hardware writes.
/// The driver calls them in a strict order and relies on each call taking
/// effect before the next one starts.
///
/// # Implementation Notes
///
/// - `fraction` passed to [`set_pwm_duty`](Self::set_pwm_duty) is always in
///   `0.0..=1.0`
/// - A pin number the implementation does not own should produce an error,
///   not be silently ignored
///
/// # Example Implementation
///
/// ```rust,ignore
/// use peltier_link::traits::{BridgePins, Level, PinId};
///
/// struct MyBoard { /* hardware handles */ }
///
/// impl BridgePins for MyBoard {
///     type Error = ();
///
///     fn set_digital(&mut self, pin: PinId, level: Level) -> Result<(), ()> {
///         // Write GPIO output register...
///         Ok(())
///     }
///
///     fn set_pwm_duty(&mut self, pin: PinId, fraction: f32) -> Result<(), ()> {
///         // Program PWM compare value...
///         Ok(())
///     }
/// }
/// ```
pub trait BridgePins {
    /// Error type for pin operations.
    type Error: fmt::Debug;

    /// Drive a digital line to `level`.
    fn set_digital(&mut self, pin: PinId, level: Level) -> Result<(), Self::Error>;

    /// Set the PWM duty of an enable line as a fraction of full scale.
    fn set_pwm_duty(&mut self, pin: PinId, fraction: f32) -> Result<(), Self::Error>;
}

impl<P: BridgePins + ?Sized> BridgePins for &mut P {
    type Error = P::Error;

    fn set_digital(&mut self, pin: PinId, level: Level) -> Result<(), Self::Error> {
        (**self).set_digital(pin, level)
    }

    fn set_pwm_duty(&mut self, pin: PinId, fraction: f32) -> Result<(), Self::Error> {
        (**self).set_pwm_duty(pin, fraction)
    }
}
