//! WiFi station mode for ESP32.
//!
//! Joining the network is the server's startup precondition: the firmware
//! builds an [`Esp32Wifi`] first and hands it to
//! [`ConnectionPool::start`](crate::ConnectionPool::start) as the
//! [`NetworkLink`].
//!
//! # Example
//!
//! ```ignore
//! use peltier_link::hal::esp32::Esp32Wifi;
//! use peltier_link::config::WifiConfig;
//!
//! let config = WifiConfig::default()
//!     .with_ssid("Lab")
//!     .with_password("secret123");
//!
//! let wifi = Esp32Wifi::new(modem, sysloop, nvs, &config)?;
//! log::info!("IP: {:?}", wifi.ip_addr());
//! ```

use crate::config::WifiConfig;
use crate::traits::NetworkLink;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

/// Station-mode WiFi connection.
///
/// The connection is established during construction and kept for the
/// lifetime of this struct.
pub struct Esp32Wifi<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
}

impl<'a> Esp32Wifi<'a> {
    /// Start the driver, associate with the configured access point and wait
    /// for DHCP.
    ///
    /// Association is retried up to `config.max_retries` times
    /// (0 = until it succeeds).
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot start, no SSID is configured,
    /// association keeps failing, or DHCP times out.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        config: &WifiConfig,
    ) -> anyhow::Result<Self> {
        if !config.is_configured() {
            anyhow::bail!("WiFi SSID not configured (set WIFI_SSID at build time)");
        }

        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        let mut ssid: heapless::String<32> = heapless::String::new();
        let _ = ssid.push_str(config.ssid.as_str());
        let mut password: heapless::String<64> = heapless::String::new();
        let _ = password.push_str(config.password.as_str());

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid,
            password,
            ..Default::default()
        }))?;

        info!("[WiFi] Starting...");
        wifi.start()?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            info!("[WiFi] Connecting to '{}' (attempt {attempt})...", config.ssid);
            match wifi.connect() {
                Ok(()) => break,
                Err(e) if config.max_retries == 0 || attempt < u32::from(config.max_retries) => {
                    warn!("[WiFi] Connect failed: {e}, retrying in {} ms", config.retry_delay_ms);
                    thread::sleep(Duration::from_millis(u64::from(config.retry_delay_ms)));
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!("[WiFi] Waiting for DHCP...");
        wifi.wait_netif_up()?;

        let link = Self { wifi };
        if let Some(ip) = link.ip_addr() {
            info!("[WiFi] Connected, IP {ip}");
        }
        Ok(link)
    }

    /// Current IP address, if connected.
    pub fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }

    /// Check if the station is associated.
    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }
}

impl NetworkLink for Esp32Wifi<'_> {
    fn is_ready(&self) -> bool {
        self.is_connected() && self.wifi.is_up().unwrap_or(false)
    }
}
