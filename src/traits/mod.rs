//! Trait definitions for hardware and network abstraction.
//!
//! This module defines the seams that let peltier-link:
//! - Drive different boards (ESP32, anything `embedded-hal`, desktop mock)
//! - Serve WebSocket clients over any non-blocking socket implementation
//!
//! # Submodules
//!
//! - `hardware`: Bridge control lines, logic levels, polarity
//! - `network`: Listener/stream polling and the network-ready precondition
//!
//! # Hardware Abstraction
//!
//! - [`BridgePins`]: digital and PWM writes addressed by pin number
//!
//! # Network Abstraction
//!
//! - [`Listener`]: non-blocking accept
//! - [`ClientStream`]: non-blocking read/write
//! - [`NetworkLink`]: startup precondition

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;
