//! # peltier-link
//!
//! Remote control of a Peltier element through a dual H-bridge, driven by
//! short text commands sent over WebSocket.
//!
//! ## Features
//!
//! - **Safe switching**: the bridge is de-energized before any direction line
//!   moves, and the two polarity pairs are never asserted together
//! - **Non-blocking server**: one thread polls the listener and every client,
//!   so network handling never stalls the actuator
//! - **Bounded memory**: per-connection buffers are fixed-size `heapless`
//!   storage
//! - **Hardware abstraction**: the same logic drives ESP32 GPIO/LEDC, any
//!   `embedded-hal` board, or the mock used in tests
//!
//! ## Architecture
//!
//! - `traits` - Pin, socket and network-link abstractions
//! - `actuator` - H-bridge driver and its latched state
//! - `websocket` - Handshake and frame codec, per-connection framer
//! - `command` - `<magnitude> <direction>` text command parser
//! - `server` - Connection pool and the per-pass loop
//! - `dispatch` - Routes text messages to the actuator
//! - `hal` - Concrete implementations (mock, std sockets, embedded-hal, esp32)
//!
//! ## Example
//!
//! ```rust
//! use peltier_link::{
//!     ActuatorConfig, ConnectionPool, ControlDispatcher, HBridge, Polarity,
//!     hal::{MockListener, MockPins},
//! };
//!
//! let config = ActuatorConfig::default();
//! let mut bridge = HBridge::new(MockPins::new(), &config).unwrap();
//!
//! let listener = MockListener::new();
//! let mut pool = ConnectionPool::new(listener.clone(), 8, ControlDispatcher::new());
//!
//! // A client connects, upgrades and sends two setpoints in one message
//! let client = listener.connect();
//! client.send_handshake();
//! client.send_text("80 0\n25 1\n");
//!
//! // Outer loop: one pass per iteration
//! for _ in 0..3 {
//!     pool.poll(&mut bridge);
//! }
//!
//! // Only the last line counts
//! assert_eq!(bridge.state().magnitude, 25.0);
//! assert_eq!(bridge.state().polarity, Some(Polarity::Reverse));
//! ```

#![warn(missing_docs)]

/// H-bridge driver and its latched state.
pub mod actuator;
/// Text command parsing.
pub mod command;
/// Shared configuration for desktop and ESP32.
pub mod config;
/// Routes text messages to the actuator.
pub mod dispatch;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Connection pool and per-pass server loop.
pub mod server;
/// Core traits for hardware and network abstraction.
pub mod traits;
/// WebSocket handshake, frame codec and per-connection framer.
pub mod websocket;

// Re-export main types for convenience
pub use actuator::{ActuatorError, ActuatorState, BridgeLines, HBridge, OutputChange};
pub use command::{parse_command, Command, CommandError};
pub use config::{ActuatorConfig, Config, DeviceConfig, ServerConfig, WifiConfig};
pub use dispatch::ControlDispatcher;
pub use server::{
    CloseReason, ConnectionId, ConnectionPool, Dispatch, DispatchOutcome, PassReport, ServerError,
};
pub use traits::{BridgePins, ClientStream, Level, Listener, NetworkLink, PinId, Polarity, ReadOutcome};
pub use websocket::ProtocolError;
