//! Desktop demo: the firmware loop on a real TCP socket, with pin writes
//! logged instead of driven.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example desktop_server -- 8080
//! ```
//!
//! Then connect with any WebSocket client (e.g. `websocat ws://127.0.0.1:8080/`)
//! and send lines such as `40 0` or `75 1`.

use log::info;
use peltier_link::hal::{bind_nonblocking, LoggingPins};
use peltier_link::{ActuatorConfig, ConnectionPool, ControlDispatcher, HBridge, ServerConfig};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Picks up `log` records from the library as well
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(8080);
    let server = ServerConfig::default().with_port(port).with_capacity(8);
    let actuator = ActuatorConfig::default();

    let mut bridge = HBridge::new(LoggingPins::new(), &actuator)?;
    let listener = bind_nonblocking(server.port)?;
    let host_is_up = || true;
    let mut pool = ConnectionPool::start(listener, &host_is_up, &server, ControlDispatcher::new())?;

    info!("Send '<magnitude 0-{}> <0|1>' lines to ws://127.0.0.1:{port}/", actuator.max_magnitude);

    loop {
        if pool.poll(&mut bridge).is_idle() {
            thread::sleep(Duration::from_millis(2));
        }
    }
}
