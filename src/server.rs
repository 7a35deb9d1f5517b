//! Connection pool and the per-pass server loop.
//!
//! The pool owns the listener, a bounded list of connections and the
//! dispatcher. One call to [`ConnectionPool::poll`] is one pass:
//!
//! 1. [`accept`](ConnectionPool::accept) at most one pending socket
//!    (closing it straight away when the pool is full)
//! 2. [`service_all`](ConnectionPool::service_all): for each connection in
//!    insertion order, at most one read, one framer step and one write
//!
//! Nothing in a pass waits on the network, so the caller's outer loop can
//! interleave other work between passes.
//!
//! # Example
//!
//! ```rust
//! use peltier_link::hal::{MockListener, MockPins};
//! use peltier_link::{ActuatorConfig, ConnectionPool, ControlDispatcher, HBridge, Polarity};
//!
//! let listener = MockListener::new();
//! let mut pool = ConnectionPool::new(listener.clone(), 4, ControlDispatcher::new());
//! let mut bridge = HBridge::new(MockPins::new(), &ActuatorConfig::default()).unwrap();
//!
//! let peer = listener.connect();
//! peer.send_handshake();
//! peer.send_text("30 1\n");
//!
//! pool.poll(&mut bridge); // accept + handshake
//! pool.poll(&mut bridge); // command
//!
//! assert_eq!(bridge.state().polarity, Some(Polarity::Reverse));
//! assert_eq!(bridge.state().magnitude, 30.0);
//! ```

use crate::config::{ServerConfig, MAX_READ_CHUNK};
use crate::traits::{ClientStream, Listener, NetworkLink, ReadOutcome};
use crate::websocket::{encode_frame, Framer, FramerEvent, Opcode, ProtocolError, TX_BUFFER_SIZE};
use core::fmt;
use heapless::Vec as HVec;
use log::{debug, info, trace, warn};

/// Passes a closing connection gets to flush its close echo before it is
/// torn down regardless.
pub const CLOSE_FLUSH_PASSES: u8 = 4;

/// Identifier assigned to each accepted connection, for logs.
pub type ConnectionId = u32;

/// What a dispatcher did with one text message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A command was parsed and the actuator output changed.
    Applied,
    /// A command was parsed but matched the current output.
    Unchanged,
    /// The message did not contain a valid command.
    Discarded,
    /// The actuator rejected the command (pin write failure).
    Failed,
}

/// Receives every complete text message together with the actuator.
///
/// Implemented by [`ControlDispatcher`](crate::ControlDispatcher) and by any
/// closure `FnMut(&str, &mut A) -> DispatchOutcome`.
pub trait Dispatch<A> {
    /// Handle one text message. Must not block.
    fn dispatch(&mut self, payload: &str, actuator: &mut A) -> DispatchOutcome;
}

impl<A, F> Dispatch<A> for F
where
    F: FnMut(&str, &mut A) -> DispatchOutcome,
{
    fn dispatch(&mut self, payload: &str, actuator: &mut A) -> DispatchOutcome {
        self(payload, actuator)
    }
}

/// Errors raised when starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The network link is not associated yet.
    #[error("network link not ready")]
    NetworkNotReady,
    /// Creating or configuring the listening socket failed.
    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters for one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Connections added to the pool.
    pub accepted: usize,
    /// Connections closed at accept time because the pool was full.
    pub rejected: usize,
    /// Text messages handed to the dispatcher.
    pub dispatched: usize,
    /// Connections removed from the pool.
    pub closed: usize,
}

impl PassReport {
    /// True if the pass did nothing observable.
    pub fn is_idle(&self) -> bool {
        *self == PassReport::default()
    }
}

/// Why a connection was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the TCP stream.
    PeerClosed,
    /// Close handshake completed.
    CloseFrame,
    /// Read or write failed.
    Transport,
    /// Peer violated the protocol.
    Protocol(ProtocolError),
    /// Pool shut down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::CloseFrame => f.write_str("close frame"),
            CloseReason::Transport => f.write_str("transport error"),
            CloseReason::Protocol(e) => write!(f, "protocol error: {e}"),
            CloseReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// One accepted client and its framing state.
struct Connection<S> {
    id: ConnectionId,
    stream: S,
    framer: Framer,
    tx: HVec<u8, TX_BUFFER_SIZE>,
    closing: bool,
    close_passes: u8,
}

/// Result of servicing one connection for one pass.
enum Step {
    Keep { dispatched: bool },
    Drop(CloseReason),
}

impl<S: ClientStream> Connection<S> {
    fn new(id: ConnectionId, stream: S) -> Self {
        Self {
            id,
            stream,
            framer: Framer::new(),
            tx: HVec::new(),
            closing: false,
            close_passes: 0,
        }
    }

    fn service<A, D: Dispatch<A>>(
        &mut self,
        dispatcher: &mut D,
        actuator: &mut A,
        read_chunk: usize,
    ) -> Step {
        let mut dispatched = false;

        if !self.closing {
            if let Err(reason) = self.read(read_chunk) {
                return Step::Drop(reason);
            }
            match self.framer.poll() {
                Ok(event) => match self.handle(event, dispatcher, actuator) {
                    Ok(d) => dispatched = d,
                    Err(e) => return Step::Drop(CloseReason::Protocol(e)),
                },
                Err(e) => return Step::Drop(CloseReason::Protocol(e)),
            }
        }

        if let Err(reason) = self.flush() {
            return Step::Drop(reason);
        }
        if self.closing {
            self.close_passes = self.close_passes.saturating_add(1);
            if self.tx.is_empty() {
                return Step::Drop(CloseReason::CloseFrame);
            }
            if self.close_passes >= CLOSE_FLUSH_PASSES {
                debug!(
                    "[WS] #{} close echo not drained, {} bytes abandoned",
                    self.id,
                    self.tx.len()
                );
                return Step::Drop(CloseReason::CloseFrame);
            }
        }
        Step::Keep { dispatched }
    }

    fn read(&mut self, read_chunk: usize) -> Result<(), CloseReason> {
        let want = self.framer.free().min(read_chunk);
        if want == 0 {
            // Buffer full; the framer either drains it this pass or reports overflow.
            return Ok(());
        }
        let mut chunk = [0u8; MAX_READ_CHUNK];
        match self.stream.try_read(&mut chunk[..want]) {
            Ok(ReadOutcome::Data(n)) => {
                trace!("[WS] #{} read {n} bytes", self.id);
                self.framer
                    .ingest(&chunk[..n])
                    .map_err(CloseReason::Protocol)
            }
            Ok(ReadOutcome::WouldBlock) => Ok(()),
            Ok(ReadOutcome::Closed) => Err(CloseReason::PeerClosed),
            Err(e) => {
                debug!("[WS] #{} read failed: {e:?}", self.id);
                Err(CloseReason::Transport)
            }
        }
    }

    fn handle<A, D: Dispatch<A>>(
        &mut self,
        event: FramerEvent,
        dispatcher: &mut D,
        actuator: &mut A,
    ) -> Result<bool, ProtocolError> {
        match event {
            FramerEvent::Idle => Ok(false),
            FramerEvent::Handshake(reply) => {
                info!("[WS] #{} handshake complete", self.id);
                self.tx
                    .extend_from_slice(reply.as_bytes())
                    .map_err(|_| ProtocolError::TxOverflow)?;
                Ok(false)
            }
            FramerEvent::Text(text) => {
                let outcome = dispatcher.dispatch(&text, actuator);
                trace!("[WS] #{} message {:?} -> {outcome:?}", self.id, text.as_str());
                Ok(true)
            }
            FramerEvent::Binary(len) => {
                debug!("[WS] #{} ignoring {len}-byte binary message", self.id);
                Ok(false)
            }
            FramerEvent::Ping(payload) => {
                encode_frame(Opcode::Pong, &payload, &mut self.tx)?;
                Ok(false)
            }
            FramerEvent::Close(code) => {
                debug!("[WS] #{} close requested (code {code:?})", self.id);
                let echo = code.map(u16::to_be_bytes);
                let payload: &[u8] = match &echo {
                    Some(bytes) => bytes,
                    None => &[],
                };
                encode_frame(Opcode::Close, payload, &mut self.tx)?;
                self.closing = true;
                Ok(false)
            }
        }
    }

    /// At most one write per pass.
    fn flush(&mut self) -> Result<(), CloseReason> {
        if self.tx.is_empty() {
            return Ok(());
        }
        match self.stream.try_write(&self.tx) {
            Ok(0) => Ok(()),
            Ok(n) => {
                let n = n.min(self.tx.len());
                self.tx.rotate_left(n);
                self.tx.truncate(self.tx.len() - n);
                Ok(())
            }
            Err(e) => {
                debug!("[WS] #{} write failed: {e:?}", self.id);
                Err(CloseReason::Transport)
            }
        }
    }
}

// ============================================================================
// Connection Pool
// ============================================================================

/// Bounded set of WebSocket connections served from one thread.
///
/// # Type Parameters
///
/// - `L`: listening socket ([`Listener`])
/// - `D`: message handler ([`Dispatch`])
pub struct ConnectionPool<L: Listener, D> {
    listener: L,
    dispatcher: D,
    connections: Vec<Connection<L::Stream>>,
    capacity: usize,
    read_chunk: usize,
    next_id: ConnectionId,
}

impl<L: Listener, D> ConnectionPool<L, D> {
    /// Create a pool with room for `capacity` connections (at least 1).
    pub fn new(listener: L, capacity: usize, dispatcher: D) -> Self {
        let capacity = capacity.max(1);
        Self {
            listener,
            dispatcher,
            connections: Vec::with_capacity(capacity),
            capacity,
            read_chunk: ServerConfig::default().effective_read_chunk(),
            next_id: 1,
        }
    }

    /// Create a pool once the network is up.
    ///
    /// # Errors
    ///
    /// [`ServerError::NetworkNotReady`] if `link` is not ready.
    pub fn start<N: NetworkLink + ?Sized>(
        listener: L,
        link: &N,
        config: &ServerConfig,
        dispatcher: D,
    ) -> Result<Self, ServerError> {
        if !link.is_ready() {
            warn!("[POOL] Refusing to start: network not ready");
            return Err(ServerError::NetworkNotReady);
        }
        info!(
            "[POOL] Serving on port {} (capacity {})",
            config.port,
            config.effective_capacity()
        );
        let mut pool = Self::new(listener, config.effective_capacity(), dispatcher);
        pool.read_chunk = config.effective_read_chunk();
        Ok(pool)
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// True if no connection is open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connection limit.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids of open connections, oldest first.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|c| c.id).collect()
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Mutable access to the dispatcher.
    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    /// Accept at most one pending connection.
    ///
    /// Returns the new connection's id. A socket that arrives while the pool
    /// is full is closed immediately and `None` is returned; the counters in
    /// `report` tell the two cases apart.
    pub fn accept_into(&mut self, report: &mut PassReport) -> Option<ConnectionId> {
        let mut stream = match self.listener.try_accept() {
            Ok(Some(stream)) => stream,
            Ok(None) => return None,
            Err(e) => {
                warn!("[POOL] accept failed: {e:?}");
                return None;
            }
        };

        if self.connections.len() >= self.capacity {
            warn!(
                "[POOL] Full ({}/{}), rejecting connection",
                self.connections.len(),
                self.capacity
            );
            stream.close();
            report.rejected += 1;
            return None;
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.connections.push(Connection::new(id, stream));
        info!(
            "[POOL] Accepted #{id} ({}/{})",
            self.connections.len(),
            self.capacity
        );
        report.accepted += 1;
        Some(id)
    }

    /// Accept at most one pending connection.
    pub fn accept(&mut self) -> Option<ConnectionId> {
        self.accept_into(&mut PassReport::default())
    }

    /// Service every open connection once, in insertion order.
    pub fn service_all<A>(&mut self, actuator: &mut A) -> PassReport
    where
        D: Dispatch<A>,
    {
        let mut report = PassReport::default();
        self.service_into(actuator, &mut report);
        report
    }

    fn service_into<A>(&mut self, actuator: &mut A, report: &mut PassReport)
    where
        D: Dispatch<A>,
    {
        let mut i = 0;
        while i < self.connections.len() {
            let conn = &mut self.connections[i];
            match conn.service(&mut self.dispatcher, actuator, self.read_chunk) {
                Step::Keep { dispatched } => {
                    report.dispatched += usize::from(dispatched);
                    i += 1;
                }
                Step::Drop(reason) => {
                    let mut conn = self.connections.remove(i);
                    conn.stream.close();
                    match reason {
                        CloseReason::Protocol(_) | CloseReason::Transport => {
                            warn!("[POOL] Dropped #{}: {reason}", conn.id)
                        }
                        _ => info!("[POOL] Closed #{}: {reason}", conn.id),
                    }
                    report.closed += 1;
                }
            }
        }
    }

    /// One pass: accept, then service every connection.
    pub fn poll<A>(&mut self, actuator: &mut A) -> PassReport
    where
        D: Dispatch<A>,
    {
        let mut report = PassReport::default();
        self.accept_into(&mut report);
        self.service_into(actuator, &mut report);
        if !report.is_idle() {
            trace!("[POOL] pass: {report:?}");
        }
        report
    }

    /// Close every connection.
    pub fn close_all(&mut self) -> usize {
        let n = self.connections.len();
        for mut conn in self.connections.drain(..) {
            conn.stream.close();
            info!("[POOL] Closed #{}: {}", conn.id, CloseReason::Shutdown);
        }
        n
    }
}

impl<L: Listener, D> fmt::Debug for ConnectionPool<L, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.connection_ids())
            .field("capacity", &self.capacity)
            .field("read_chunk", &self.read_chunk)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockLink, MockListener};

    type Log = Vec<String>;

    fn recorder(payload: &str, log: &mut Log) -> DispatchOutcome {
        log.push(payload.to_owned());
        DispatchOutcome::Applied
    }

    type Handler = fn(&str, &mut Log) -> DispatchOutcome;

    fn pool(capacity: usize) -> (MockListener, ConnectionPool<MockListener, Handler>) {
        let listener = MockListener::new();
        let pool = ConnectionPool::new(listener.clone(), capacity, recorder as Handler);
        (listener, pool)
    }

    // =========================================================================
    // Accept
    // =========================================================================

    #[test]
    fn accept_one_per_call() {
        let (listener, mut pool) = pool(4);
        let _a = listener.connect();
        let _b = listener.connect();
        assert_eq!(pool.accept(), Some(1));
        assert_eq!(pool.len(), 1);
        assert_eq!(listener.pending(), 1);
        assert_eq!(pool.accept(), Some(2));
        assert_eq!(pool.accept(), None);
        assert_eq!(pool.connection_ids(), vec![1, 2]);
    }

    #[test]
    fn full_pool_rejects_and_closes() {
        let (listener, mut pool) = pool(1);
        let first = listener.connect();
        let second = listener.connect();
        let mut log = Log::new();

        let report = pool.poll(&mut log);
        assert_eq!(report.accepted, 1);
        let report = pool.poll(&mut log);
        assert_eq!(report.rejected, 1);
        assert_eq!(pool.len(), 1);
        assert!(second.is_closed_by_server());
        assert!(!first.is_closed_by_server());
    }

    #[test]
    fn accept_error_is_logged_not_fatal() {
        let (listener, mut pool) = pool(2);
        listener.fail_next_accept();
        let _peer = listener.connect();
        assert_eq!(pool.accept(), None);
        assert_eq!(pool.accept(), Some(1));
    }

    #[test]
    fn capacity_at_least_one() {
        let (_, pool) = pool(0);
        assert_eq!(pool.capacity(), 1);
    }

    // =========================================================================
    // Service
    // =========================================================================

    #[test]
    fn handshake_reply_sent_same_pass() {
        let (listener, mut pool) = pool(2);
        let peer = listener.connect();
        peer.send_handshake();
        let mut log = Log::new();
        pool.poll(&mut log);
        let reply = String::from_utf8(peer.take_received()).unwrap();
        assert!(reply.starts_with("HTTP/1.1 101"));
    }

    #[test]
    fn text_dispatched_once_per_pass() {
        let (listener, mut pool) = pool(2);
        let peer = listener.connect();
        peer.send_handshake();
        peer.send_text("1 0\n");
        peer.send_text("2 0\n");
        let mut log = Log::new();

        pool.poll(&mut log);
        assert!(log.is_empty());
        assert_eq!(pool.poll(&mut log).dispatched, 1);
        assert_eq!(pool.poll(&mut log).dispatched, 1);
        assert_eq!(log, vec!["1 0\n", "2 0\n"]);
    }

    #[test]
    fn ping_answered_with_pong() {
        let (listener, mut pool) = pool(2);
        let peer = listener.connect();
        peer.send_handshake();
        let mut log = Log::new();
        pool.poll(&mut log);
        peer.take_received();

        peer.send_frame(true, Opcode::Ping, b"hb");
        pool.poll(&mut log);
        assert_eq!(peer.take_received(), vec![0x8A, 0x02, b'h', b'b']);
    }

    #[test]
    fn close_frame_echoed_then_removed() {
        let (listener, mut pool) = pool(2);
        let peer = listener.connect();
        peer.send_handshake();
        let mut log = Log::new();
        pool.poll(&mut log);
        peer.take_received();

        peer.send_frame(true, Opcode::Close, &1001u16.to_be_bytes());
        let report = pool.poll(&mut log);
        assert_eq!(report.closed, 1);
        assert_eq!(peer.take_received(), vec![0x88, 0x02, 0x03, 0xE9]);
        assert!(peer.is_closed_by_server());
        assert!(pool.is_empty());
    }

    #[test]
    fn close_waits_for_flush() {
        let (listener, mut pool) = pool(2);
        let peer = listener.connect();
        peer.send_handshake();
        let mut log = Log::new();
        pool.poll(&mut log);

        peer.limit_writes(0);
        peer.send_frame(true, Opcode::Close, b"");
        assert_eq!(pool.poll(&mut log).closed, 0);
        assert_eq!(pool.len(), 1);

        peer.unlimit_writes();
        assert_eq!(pool.poll(&mut log).closed, 1);
    }

    #[test]
    fn protocol_error_drops_only_offender() {
        let (listener, mut pool) = pool(3);
        let good = listener.connect();
        let bad = listener.connect();
        let mut log = Log::new();
        pool.poll(&mut log);
        pool.poll(&mut log);

        good.send_handshake();
        bad.send(b"NOT HTTP\r\n\r\n");
        let report = pool.poll(&mut log);
        assert_eq!(report.closed, 1);
        assert_eq!(pool.connection_ids(), vec![1]);
        assert!(bad.is_closed_by_server());
    }

    #[test]
    fn peer_eof_and_reset_remove_connection() {
        let (listener, mut pool) = pool(3);
        let eof = listener.connect();
        let reset = listener.connect();
        let mut log = Log::new();
        pool.poll(&mut log);
        pool.poll(&mut log);

        eof.close();
        reset.reset();
        let report = pool.poll(&mut log);
        assert_eq!(report.closed, 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn close_all_empties_pool() {
        let (listener, mut pool) = pool(3);
        let a = listener.connect();
        let b = listener.connect();
        pool.accept();
        pool.accept();
        assert_eq!(pool.close_all(), 2);
        assert!(pool.is_empty());
        assert!(a.is_closed_by_server() && b.is_closed_by_server());
    }

    // =========================================================================
    // Start
    // =========================================================================

    #[test]
    fn start_requires_network() {
        let handler: Handler = recorder;
        let config = ServerConfig::default();

        let down = ConnectionPool::start(MockListener::new(), &MockLink::down(), &config, handler);
        assert!(matches!(down, Err(ServerError::NetworkNotReady)));

        let config = config.with_capacity(7);
        let up = ConnectionPool::start(MockListener::new(), &MockLink::up(), &config, handler)
            .unwrap();
        assert_eq!(up.capacity(), 7);
    }
}
