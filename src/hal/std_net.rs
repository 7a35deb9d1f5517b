//! `std::net` sockets in non-blocking mode.
//!
//! Works on any host and on ESP-IDF, whose lwIP sockets sit behind the same
//! `std::net` API.
//!
//! # Example
//!
//! ```rust,no_run
//! use peltier_link::hal::bind_nonblocking;
//!
//! let listener = bind_nonblocking(8080)?;
//! # Ok::<(), peltier_link::ServerError>(())
//! ```

use crate::server::ServerError;
use crate::traits::{ClientStream, Listener, ReadOutcome};
use log::{debug, info};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, TcpListener, TcpStream};

/// Bind a listening socket on all interfaces and switch it to non-blocking mode.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if the port cannot be bound.
pub fn bind_nonblocking(port: u16) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?;
    listener.set_nonblocking(true)?;
    info!("[WS] Listening on {}", listener.local_addr()?);
    Ok(listener)
}

fn would_block(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

impl Listener for TcpListener {
    type Stream = TcpStream;
    type Error = io::Error;

    fn try_accept(&mut self) -> io::Result<Option<TcpStream>> {
        match self.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(true)?;
                let _ = stream.set_nodelay(true);
                debug!("[WS] Incoming connection from {addr}");
                Ok(Some(stream))
            }
            Err(e) if would_block(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ClientStream for TcpStream {
    type Error = io::Error;

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        match self.read(buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if would_block(&e) => Ok(ReadOutcome::WouldBlock),
            Err(e) => Err(e),
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if would_block(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}
