//! Non-blocking socket abstraction for the WebSocket server.
//!
//! The server loop never waits on I/O. Every read, write and accept is a
//! single poll that either makes progress or reports "nothing yet".
//!
//! # Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Listener`] | Poll for newly accepted sockets |
//! | [`ClientStream`] | Poll-based read/write on one accepted socket |
//! | [`NetworkLink`] | "Network associated and listening" precondition |
//!
//! Implementations live in [`crate::hal`]: `std::net` sockets switched to
//! non-blocking mode, and scripted mocks for tests.

use core::fmt;

/// Result of a single non-blocking read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the buffer (`n > 0`).
    Data(usize),
    /// Nothing available right now; try again next pass.
    WouldBlock,
    /// The peer closed its side of the connection.
    Closed,
}

/// One accepted socket, polled without blocking.
///
/// # Implementation Notes
///
/// - `try_read` must never block; map "no data" to [`ReadOutcome::WouldBlock`]
/// - `try_write` returns the number of bytes accepted, `Ok(0)` meaning the
///   transport buffer is full; callers never pass an empty slice
/// - `close` is best-effort and infallible
pub trait ClientStream {
    /// Transport error type (peer reset, socket error).
    type Error: fmt::Debug;

    /// Read whatever is available into `buf`.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Self::Error>;

    /// Write as much of `buf` as the transport accepts right now.
    fn try_write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Shut the socket down. Further calls are no-ops.
    fn close(&mut self);
}

/// A listening socket polled for new connections.
pub trait Listener {
    /// Socket type produced by a successful accept.
    type Stream: ClientStream;
    /// Error type for accept failures.
    type Error: fmt::Debug;

    /// Accept one pending connection, or `Ok(None)` if none is waiting.
    fn try_accept(&mut self) -> Result<Option<Self::Stream>, Self::Error>;
}

/// Precondition consumed from the network bring-up layer.
///
/// Joining the wireless network happens before the server starts; the server
/// only asks whether it has happened.
///
/// # Example
///
/// ```rust
/// use peltier_link::traits::NetworkLink;
///
/// let always_up = || true;
/// assert!(always_up.is_ready());
/// ```
pub trait NetworkLink {
    /// Returns true once the link is associated and able to accept sockets.
    fn is_ready(&self) -> bool;
}

impl<F: Fn() -> bool> NetworkLink for F {
    fn is_ready(&self) -> bool {
        self()
    }
}
