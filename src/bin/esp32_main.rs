//! ESP32 Peltier controller firmware.
//!
//! Joins WiFi, then runs one loop that alternates:
//! - one connection-pool pass (accept, then service every client once)
//! - a short sleep so the idle loop yields to the WiFi/lwIP tasks
//!
//! Clients send `<magnitude> <direction>\n` text messages over WebSocket; the
//! last valid line of each message is applied to the H-bridge immediately.
//!
//! # Build
//!
//! ```bash
//! WIFI_SSID=lab WIFI_PASSWORD=secret WS_PORT=80 \
//!     cargo build --release --features esp32 --bin esp32_main
//! ```

use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};
use peltier_link::hal::esp32::{bridge_pins, DirectionGpios, Esp32Wifi};
use peltier_link::hal::bind_nonblocking;
use peltier_link::{
    ActuatorConfig, Config, ConnectionPool, ControlDispatcher, DeviceConfig, HBridge, ServerConfig,
    WifiConfig,
};
use std::thread;
use std::time::Duration;

/// Sleep between passes when nothing happened.
const IDLE_SLEEP_MS: u64 = 5;

/// Log a status line every this many passes.
const STATUS_EVERY_PASSES: u32 = 12_000;

fn ws_port() -> u16 {
    option_env!("WS_PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(ServerConfig::default().port)
}

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_hal::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // =========================================================================
    // Configuration
    // =========================================================================
    let config = Config::default()
        .with_wifi(
            WifiConfig::default()
                .with_ssid(option_env!("WIFI_SSID").unwrap_or(""))
                .with_password(option_env!("WIFI_PASSWORD").unwrap_or("")),
        )
        .with_server(ServerConfig::default().with_port(ws_port()))
        .with_actuator(ActuatorConfig::default())
        .with_device(DeviceConfig::default());

    info!("================================");
    info!("  {}", config.device.name);
    info!("================================");

    let peripherals = Peripherals::take()?;

    // =========================================================================
    // H-bridge (safe state before anything else)
    // =========================================================================
    let pins = bridge_pins(
        &config.actuator,
        peripherals.pins.gpio16,
        peripherals.pins.gpio21,
        DirectionGpios {
            in1: peripherals.pins.gpio17.downgrade_output(),
            in2: peripherals.pins.gpio18.downgrade_output(),
            in3: peripherals.pins.gpio19.downgrade_output(),
            in4: peripherals.pins.gpio20.downgrade_output(),
        },
        peripherals.ledc.timer0,
        peripherals.ledc.channel0,
        peripherals.ledc.channel1,
    )?;
    let mut bridge = HBridge::new(pins, &config.actuator)
        .map_err(|e| anyhow::anyhow!("H-bridge init failed: {e}"))?;
    info!("[OK] H-bridge initialized, output disabled");

    // =========================================================================
    // WiFi
    // =========================================================================
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let wifi = Esp32Wifi::new(peripherals.modem, sysloop, Some(nvs), &config.wifi)?;

    // =========================================================================
    // WebSocket server
    // =========================================================================
    let listener = bind_nonblocking(config.server.port)?;
    let mut pool = ConnectionPool::start(listener, &wifi, &config.server, ControlDispatcher::new())?;
    if let Some(ip) = wifi.ip_addr() {
        info!("[OK] Control endpoint ws://{ip}:{}/", config.server.port);
    }

    // =========================================================================
    // Main loop
    // =========================================================================
    let mut passes: u32 = 0;
    loop {
        let report = pool.poll(&mut bridge);
        if report.is_idle() {
            thread::sleep(Duration::from_millis(IDLE_SLEEP_MS));
        }

        passes = passes.wrapping_add(1);
        if passes % STATUS_EVERY_PASSES == 0 {
            let state = bridge.state();
            let ctrl = pool.dispatcher();
            info!(
                "[CTRL] {} clients, output {:.1}/{:.0} {:?}, applied {}, discarded {}, errors {}",
                pool.len(),
                state.magnitude,
                state.max_magnitude,
                state.polarity,
                ctrl.applied,
                ctrl.discarded,
                ctrl.actuator_errors
            );
            if !wifi.is_connected() {
                warn!("[WiFi] Link lost; existing clients will time out");
            }
        }
    }
}
