//! Hardware Abstraction Layer implementations.
//!
//! This module contains concrete implementations of the traits
//! defined in [`crate::traits`] for various platforms.
//!
//! # Available Implementations
//!
//! - `mock`: Recording pins, scripted sockets and a fixed network link for tests
//! - `logging`: Pin driver that only logs (desktop demo)
//! - `std_net`: Non-blocking `std::net` listener and streams
//! - `embedded`: Adapter for any `embedded-hal` 1.0 GPIO + PWM drivers
//! - `esp32`: ESP32 pin wiring and WiFi station (requires `esp32` feature)

pub mod embedded;
pub mod logging;
pub mod mock;
pub mod std_net;

#[cfg(feature = "esp32")]
pub mod esp32;

pub use embedded::{EmbeddedHalPins, EmbeddedPinError};
pub use logging::LoggingPins;
pub use mock::*;
pub use std_net::bind_nonblocking;

#[cfg(feature = "esp32")]
pub use esp32::*;
