//! ESP32 hardware abstraction layer for the Peltier bridge.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32-S3 (esp-idf, `std`)
//! - **Driver**: L298N-style dual H-bridge, both channels on one Peltier element
//! - **PWM**: LEDC timer 0, channels 0/1 on the two enables
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for GPIO assignments. They match the defaults of
//! [`ActuatorConfig`](crate::ActuatorConfig).

mod bridge;
mod wifi;

pub use bridge::{bridge_pins, DirectionGpios, Esp32BridgePins};
pub use wifi::Esp32Wifi;

/// GPIO assignments for the reference wiring.
pub mod pins {
    // =========================================================================
    // Side A
    // =========================================================================

    /// PWM enable, side A (ENA)
    pub const ENABLE_A: u8 = 16;

    /// Normal polarity input, side A (IN1)
    pub const IN1: u8 = 17;

    /// Reverse polarity input, side A (IN2)
    pub const IN2: u8 = 18;

    // =========================================================================
    // Side B
    // =========================================================================

    /// Normal polarity input, side B (IN3)
    pub const IN3: u8 = 19;

    /// Reverse polarity input, side B (IN4)
    pub const IN4: u8 = 20;

    /// PWM enable, side B (ENB)
    pub const ENABLE_B: u8 = 21;
}
