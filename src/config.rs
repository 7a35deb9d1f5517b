//! Shared configuration for desktop and ESP32.
//!
//! Strings are held in `heapless::String` so the same structs work in the
//! firmware and on the host.
//!
//! # Example
//!
//! ```rust
//! use peltier_link::config::{ActuatorConfig, Config, ServerConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.server.port, 80);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_server(ServerConfig::default().with_port(8080).with_capacity(4))
//!     .with_actuator(ActuatorConfig::default().with_max_magnitude(255.0));
//! ```

use crate::traits::PinId;
use heapless::String as HString;

/// Maximum length for short config strings (SSID, password, device name)
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Largest chunk read from a socket in one non-blocking read.
pub const MAX_READ_CHUNK: usize = 512;

/// Create a ShortString from a &str, truncating at a char boundary if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let mut end = s.len().min(MAX_SHORT_STRING);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let _ = hs.push_str(&s[..end]);
    hs
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// WebSocket server configuration
    pub server: ServerConfig,
    /// H-bridge pin layout and scaling
    pub actuator: ActuatorConfig,
    /// WiFi connection configuration
    pub wifi: WifiConfig,
    /// Device identification
    pub device: DeviceConfig,
}

impl Config {
    /// Set server configuration
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Set actuator configuration
    pub fn with_actuator(mut self, actuator: ActuatorConfig) -> Self {
        self.actuator = actuator;
        self
    }

    /// Set WiFi configuration
    pub fn with_wifi(mut self, wifi: WifiConfig) -> Self {
        self.wifi = wifi;
        self
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// Server Config
// ============================================================================

/// WebSocket server configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// TCP port to listen on
    pub port: u16,
    /// Maximum simultaneous connections (at least 1)
    pub capacity: usize,
    /// Bytes requested per non-blocking read
    pub read_chunk: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            capacity: 100,
            read_chunk: 256,
        }
    }
}

impl ServerConfig {
    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection limit (values below 1 become 1)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set the read chunk size (clamped to `1..=MAX_READ_CHUNK`)
    pub fn with_read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes.clamp(1, MAX_READ_CHUNK);
        self
    }

    /// Connection limit as used by the pool.
    pub fn effective_capacity(&self) -> usize {
        self.capacity.max(1)
    }

    /// Read chunk as used by the pool.
    pub fn effective_read_chunk(&self) -> usize {
        self.read_chunk.clamp(1, MAX_READ_CHUNK)
    }
}

// ============================================================================
// Actuator Config
// ============================================================================

/// H-bridge line assignment and magnitude scaling
///
/// Pin numbers are board GPIO numbers. Defaults match the reference wiring:
/// enables on 16 and 21, side A direction on 17/18, side B on 19/20.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorConfig {
    /// PWM enable for half-bridge A
    pub enable_a: PinId,
    /// Direction line A, high for normal polarity
    pub in1: PinId,
    /// Direction line A, high for reverse polarity
    pub in2: PinId,
    /// PWM enable for half-bridge B
    pub enable_b: PinId,
    /// Direction line B, high for normal polarity
    pub in3: PinId,
    /// Direction line B, high for reverse polarity
    pub in4: PinId,
    /// Magnitude that maps to 100% duty
    pub max_magnitude: f32,
    /// PWM carrier frequency
    pub pwm_frequency_hz: u32,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            enable_a: 16,
            in1: 17,
            in2: 18,
            enable_b: 21,
            in3: 19,
            in4: 20,
            max_magnitude: 100.0,
            pwm_frequency_hz: 1000,
        }
    }
}

impl ActuatorConfig {
    /// Set the half-bridge A lines (enable, normal, reverse)
    pub fn with_side_a(mut self, enable: PinId, normal: PinId, reverse: PinId) -> Self {
        self.enable_a = enable;
        self.in1 = normal;
        self.in2 = reverse;
        self
    }

    /// Set the half-bridge B lines (enable, normal, reverse)
    pub fn with_side_b(mut self, enable: PinId, normal: PinId, reverse: PinId) -> Self {
        self.enable_b = enable;
        self.in3 = normal;
        self.in4 = reverse;
        self
    }

    /// Set the full-scale magnitude (non-positive or NaN values are ignored)
    pub fn with_max_magnitude(mut self, max: f32) -> Self {
        if max > 0.0 {
            self.max_magnitude = max;
        }
        self
    }

    /// Set the PWM frequency
    pub fn with_pwm_frequency_hz(mut self, hz: u32) -> Self {
        self.pwm_frequency_hz = hz.max(1);
        self
    }

    /// All six pins, enables first
    pub fn pins(&self) -> [PinId; 6] {
        [
            self.enable_a,
            self.enable_b,
            self.in1,
            self.in2,
            self.in3,
            self.in4,
        ]
    }

    /// True if no pin is assigned twice
    pub fn pins_distinct(&self) -> bool {
        let pins = self.pins();
        pins.iter()
            .enumerate()
            .all(|(i, pin)| !pins[i + 1..].contains(pin))
    }
}

// ============================================================================
// WiFi Config
// ============================================================================

/// Station credentials and association retry policy.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WifiConfig {
    /// Access point SSID (empty means not configured)
    pub ssid: ShortString,
    /// WPA passphrase, empty for an open network
    pub password: ShortString,
    /// Pause between failed association attempts
    pub retry_delay_ms: u32,
    /// Association attempts before giving up (0 = keep trying)
    pub max_retries: u8,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: ShortString::new(),
            password: ShortString::new(),
            retry_delay_ms: 2_000,
            max_retries: 5,
        }
    }
}

impl WifiConfig {
    /// Set the SSID (truncated to [`MAX_SHORT_STRING`] bytes)
    pub fn with_ssid(mut self, ssid: &str) -> Self {
        self.ssid = short_string(ssid);
        self
    }

    /// Set the passphrase
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = short_string(password);
        self
    }

    /// Set the pause between association attempts
    pub fn with_retry_delay_ms(mut self, ms: u32) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// Set the attempt limit (0 = unlimited)
    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// True once an SSID has been set
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Device identification
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Human-readable device name
    pub name: ShortString,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: short_string("peltier-link"),
        }
    }
}

impl DeviceConfig {
    /// Set the device name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = short_string(name);
        self
    }
}
