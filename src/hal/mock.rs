//! Mock implementations for testing without hardware or sockets.
//!
//! This module provides test doubles for the hardware and network traits,
//! enabling development and testing on desktop without a board attached.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockPins`] | [`BridgePins`] | Records every write, checks bridge safety |
//! | [`MockListener`] | [`Listener`] | Queue of connections to hand to the pool |
//! | [`MockStream`] | [`ClientStream`] | Server side of a scripted socket |
//! | [`MockPeer`] | - | Client side: push bytes, inspect replies |
//! | [`MockLink`] | [`NetworkLink`] | Fixed readiness flag |
//!
//! # Example
//!
//! ```rust
//! use peltier_link::{ActuatorConfig, BridgeLines, HBridge, Polarity};
//! use peltier_link::hal::MockPins;
//!
//! let config = ActuatorConfig::default();
//! let pins = MockPins::watching(BridgeLines::from(&config));
//! let mut bridge = HBridge::new(pins, &config).unwrap();
//!
//! bridge.set_output(60.0, Polarity::Normal).unwrap();
//! bridge.set_output(60.0, Polarity::Reverse).unwrap();
//!
//! // The reversal never created a shoot-through configuration
//! assert!(bridge.pins().violations.is_empty());
//! ```
//!
//! [`BridgePins`]: crate::traits::BridgePins
//! [`Listener`]: crate::traits::Listener
//! [`ClientStream`]: crate::traits::ClientStream
//! [`NetworkLink`]: crate::traits::NetworkLink

use crate::actuator::BridgeLines;
use crate::traits::{BridgePins, ClientStream, Level, Listener, NetworkLink, PinId, ReadOutcome};
use crate::websocket::Opcode;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

// ============================================================================
// Hardware Mocks
// ============================================================================

/// One recorded pin write.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PinWrite {
    /// `set_digital(pin, level)`.
    Digital(PinId, Level),
    /// `set_pwm_duty(pin, fraction)`.
    Pwm(PinId, f32),
}

/// A bridge configuration that could short the supply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeViolation {
    /// A line of each polarity pair was high at the same time.
    BothPairsAsserted {
        /// Index into [`MockPins::writes`] of the offending write.
        at: usize,
    },
    /// A direction line changed level while an enable had non-zero duty.
    DirectionChangedWhileEnabled {
        /// Index into [`MockPins::writes`] of the offending write.
        at: usize,
        /// Direction line that moved.
        pin: PinId,
    },
}

/// Mock pin driver for testing.
///
/// Records every write in order and keeps the current level/duty of each
/// pin. When created with [`watching`](Self::watching) it also replays each
/// write against the bridge layout and records any [`BridgeViolation`].
///
/// # Example
///
/// ```rust
/// use peltier_link::hal::{MockPins, PinWrite};
/// use peltier_link::traits::{BridgePins, Level};
///
/// let mut pins = MockPins::new();
/// pins.set_digital(17, Level::High).unwrap();
/// pins.set_pwm_duty(16, 0.25).unwrap();
///
/// assert_eq!(pins.writes, vec![
///     PinWrite::Digital(17, Level::High),
///     PinWrite::Pwm(16, 0.25),
/// ]);
///
/// // Injected failure on the third write
/// let mut pins = MockPins::new().fail_on_write(2);
/// pins.set_digital(1, Level::High).unwrap();
/// pins.set_digital(2, Level::High).unwrap();
/// assert!(pins.set_digital(3, Level::High).is_err());
/// assert!(pins.set_digital(3, Level::High).is_ok());
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockPins {
    /// Successful writes, oldest first.
    pub writes: Vec<PinWrite>,
    /// Unsafe configurations observed (only when watching a layout).
    pub violations: Vec<BridgeViolation>,
    levels: BTreeMap<PinId, Level>,
    duties: BTreeMap<PinId, f32>,
    watch: Option<BridgeLines>,
    fail_at: Option<usize>,
    attempts: usize,
}

impl MockPins {
    /// Creates a mock with every pin low and every duty at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that checks each write against `lines`.
    pub fn watching(lines: BridgeLines) -> Self {
        Self {
            watch: Some(lines),
            ..Self::default()
        }
    }

    /// Make the write attempt with index `n` (0-based, counting all writes) fail once.
    pub fn fail_on_write(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Current level of a digital line (low if never written).
    pub fn level(&self, pin: PinId) -> Level {
        self.levels.get(&pin).copied().unwrap_or_default()
    }

    /// Current duty of a PWM line (zero if never written).
    pub fn duty(&self, pin: PinId) -> f32 {
        self.duties.get(&pin).copied().unwrap_or(0.0)
    }

    /// Number of write attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    fn attempt(&mut self) -> Result<(), ()> {
        let index = self.attempts;
        self.attempts += 1;
        if self.fail_at == Some(index) {
            Err(())
        } else {
            Ok(())
        }
    }

    fn any_enabled(&self, lines: &BridgeLines) -> bool {
        lines.enables().iter().any(|pin| self.duty(*pin) > 0.0)
    }

    fn check(&mut self, lines: BridgeLines, write: PinWrite, previous: Level) {
        let at = self.writes.len() - 1;

        if let PinWrite::Digital(pin, level) = write {
            let is_direction = lines.direction_lines().contains(&pin);
            if is_direction && level != previous && self.any_enabled(&lines) {
                self.violations
                    .push(BridgeViolation::DirectionChangedWhileEnabled { at, pin });
            }
        }

        let normal = lines
            .pair(crate::Polarity::Normal)
            .iter()
            .any(|pin| self.level(*pin).is_high());
        let reverse = lines
            .pair(crate::Polarity::Reverse)
            .iter()
            .any(|pin| self.level(*pin).is_high());
        if normal && reverse {
            self.violations.push(BridgeViolation::BothPairsAsserted { at });
        }
    }
}

impl BridgePins for MockPins {
    type Error = ();

    fn set_digital(&mut self, pin: PinId, level: Level) -> Result<(), ()> {
        self.attempt()?;
        let previous = self.level(pin);
        self.levels.insert(pin, level);
        let write = PinWrite::Digital(pin, level);
        self.writes.push(write);
        if let Some(lines) = self.watch {
            self.check(lines, write, previous);
        }
        Ok(())
    }

    fn set_pwm_duty(&mut self, pin: PinId, fraction: f32) -> Result<(), ()> {
        self.attempt()?;
        self.duties.insert(pin, fraction);
        let write = PinWrite::Pwm(pin, fraction);
        self.writes.push(write);
        if let Some(lines) = self.watch {
            self.check(lines, write, Level::Low);
        }
        Ok(())
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Error returned by a [`MockStream`] after [`MockPeer::reset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("connection reset by peer")]
pub struct MockResetError;

#[derive(Debug, Default)]
struct StreamShared {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    peer_closed: bool,
    server_closed: bool,
    reset: bool,
    write_budget: Option<usize>,
    reads: usize,
}

/// Server side of a scripted connection.
///
/// Created in pairs with [`MockPeer`] via [`MockStream::pair`] or
/// [`MockListener::connect`].
#[derive(Debug)]
pub struct MockStream {
    shared: Rc<RefCell<StreamShared>>,
}

/// Client side of a scripted connection.
///
/// # Example
///
/// ```rust
/// use peltier_link::hal::MockStream;
/// use peltier_link::traits::{ClientStream, ReadOutcome};
///
/// let (mut server, peer) = MockStream::pair();
/// let mut buf = [0u8; 8];
/// assert_eq!(server.try_read(&mut buf).unwrap(), ReadOutcome::WouldBlock);
///
/// peer.send(b"hi");
/// assert_eq!(server.try_read(&mut buf).unwrap(), ReadOutcome::Data(2));
///
/// server.try_write(b"ok").unwrap();
/// assert_eq!(peer.received(), b"ok".to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct MockPeer {
    shared: Rc<RefCell<StreamShared>>,
}

impl MockStream {
    /// Create a connected server/client pair.
    pub fn pair() -> (MockStream, MockPeer) {
        let shared = Rc::new(RefCell::new(StreamShared::default()));
        (
            MockStream {
                shared: Rc::clone(&shared),
            },
            MockPeer { shared },
        )
    }
}

impl ClientStream for MockStream {
    type Error = MockResetError;

    fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, MockResetError> {
        let mut shared = self.shared.borrow_mut();
        shared.reads += 1;
        if shared.reset {
            return Err(MockResetError);
        }
        if shared.inbound.is_empty() {
            return Ok(if shared.peer_closed {
                ReadOutcome::Closed
            } else {
                ReadOutcome::WouldBlock
            });
        }
        let n = buf.len().min(shared.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(ReadOutcome::Data(n))
    }

    fn try_write(&mut self, buf: &[u8]) -> Result<usize, MockResetError> {
        let mut shared = self.shared.borrow_mut();
        if shared.reset {
            return Err(MockResetError);
        }
        let n = match shared.write_budget {
            Some(budget) => {
                let n = budget.min(buf.len());
                shared.write_budget = Some(budget - n);
                n
            }
            None => buf.len(),
        };
        shared.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn close(&mut self) {
        self.shared.borrow_mut().server_closed = true;
    }
}

impl MockPeer {
    /// Append raw bytes to what the server will read.
    pub fn send(&self, bytes: &[u8]) {
        self.shared.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    /// Send a standard opening handshake request.
    pub fn send_handshake(&self) {
        self.send(
            b"GET /ws HTTP/1.1\r\n\
              Host: 192.168.4.1\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
              Sec-WebSocket-Version: 13\r\n\r\n",
        );
    }

    /// Send one masked client frame.
    pub fn send_frame(&self, fin: bool, opcode: Opcode, payload: &[u8]) {
        self.send(&client_frame(fin, opcode, payload));
    }

    /// Send a complete masked text message in one frame.
    pub fn send_text(&self, text: &str) {
        self.send_frame(true, Opcode::Text, text.as_bytes());
    }

    /// Close the client side (reads then report EOF once drained).
    pub fn close(&self) {
        self.shared.borrow_mut().peer_closed = true;
    }

    /// Make every subsequent read and write fail.
    pub fn reset(&self) {
        self.shared.borrow_mut().reset = true;
    }

    /// Limit the total number of bytes the server may write from now on.
    pub fn limit_writes(&self, bytes: usize) {
        self.shared.borrow_mut().write_budget = Some(bytes);
    }

    /// Remove any write limit.
    pub fn unlimit_writes(&self) {
        self.shared.borrow_mut().write_budget = None;
    }

    /// Everything the server has written so far.
    pub fn received(&self) -> Vec<u8> {
        self.shared.borrow().outbound.clone()
    }

    /// Drain and return everything the server has written so far.
    pub fn take_received(&self) -> Vec<u8> {
        core::mem::take(&mut self.shared.borrow_mut().outbound)
    }

    /// Whether the server closed its side.
    pub fn is_closed_by_server(&self) -> bool {
        self.shared.borrow().server_closed
    }

    /// Number of bytes the server has not read yet.
    pub fn unread(&self) -> usize {
        self.shared.borrow().inbound.len()
    }

    /// Number of `try_read` calls the server made.
    pub fn read_calls(&self) -> usize {
        self.shared.borrow().reads
    }
}

/// Build a masked client-to-server frame.
pub fn client_frame(fin: bool, opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(if fin { 0x80 } else { 0x00 } | opcode.as_u8());
    match payload.len() {
        n if n < 126 => frame.push(0x80 | n as u8),
        n if n <= u16::MAX as usize => {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            frame.push(0x80 | 127);
            frame.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }
    frame.extend_from_slice(&MASK);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ MASK[i % 4]));
    frame
}

/// Error returned by [`MockListener`] when told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("accept failed")]
pub struct MockAcceptError;

/// Mock listening socket.
///
/// Connections queued with [`connect`](Self::connect) are handed out one per
/// `try_accept` call. Clones share the same queue, so a test can keep a
/// handle after moving the listener into a pool.
///
/// # Example
///
/// ```rust
/// use peltier_link::hal::MockListener;
/// use peltier_link::traits::Listener;
///
/// let mut listener = MockListener::new();
/// assert!(listener.try_accept().unwrap().is_none());
///
/// let _peer = listener.connect();
/// assert!(listener.try_accept().unwrap().is_some());
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockListener {
    pending: Rc<RefCell<VecDeque<MockStream>>>,
    fail_next: Rc<RefCell<bool>>,
}

impl MockListener {
    /// Creates a listener with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a new incoming connection and return its client side.
    pub fn connect(&self) -> MockPeer {
        let (stream, peer) = MockStream::pair();
        self.pending.borrow_mut().push_back(stream);
        peer
    }

    /// Make the next `try_accept` return an error.
    pub fn fail_next_accept(&self) {
        *self.fail_next.borrow_mut() = true;
    }

    /// Number of connections waiting to be accepted.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Listener for MockListener {
    type Stream = MockStream;
    type Error = MockAcceptError;

    fn try_accept(&mut self) -> Result<Option<MockStream>, MockAcceptError> {
        if core::mem::take(&mut *self.fail_next.borrow_mut()) {
            return Err(MockAcceptError);
        }
        Ok(self.pending.borrow_mut().pop_front())
    }
}

/// Network link with a fixed readiness flag.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockLink {
    /// Value returned by `is_ready`.
    pub ready: bool,
}

impl MockLink {
    /// A link that reports ready.
    pub fn up() -> Self {
        Self { ready: true }
    }

    /// A link that reports not ready.
    pub fn down() -> Self {
        Self { ready: false }
    }
}

impl NetworkLink for MockLink {
    fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // MockPins
    // =========================================================================

    fn lines() -> BridgeLines {
        BridgeLines {
            enable_a: 1,
            in1: 2,
            in2: 3,
            enable_b: 4,
            in3: 5,
            in4: 6,
        }
    }

    #[test]
    fn watching_flags_both_pairs_high() {
        let mut pins = MockPins::watching(lines());
        pins.set_digital(2, Level::High).unwrap();
        assert!(pins.violations.is_empty());
        pins.set_digital(6, Level::High).unwrap();
        assert_eq!(
            pins.violations,
            vec![BridgeViolation::BothPairsAsserted { at: 1 }]
        );
    }

    #[test]
    fn watching_flags_direction_change_under_power() {
        let mut pins = MockPins::watching(lines());
        pins.set_pwm_duty(1, 0.5).unwrap();
        pins.set_digital(3, Level::High).unwrap();
        assert_eq!(
            pins.violations,
            vec![BridgeViolation::DirectionChangedWhileEnabled { at: 1, pin: 3 }]
        );
    }

    #[test]
    fn rewriting_same_level_under_power_is_not_a_change() {
        let mut pins = MockPins::watching(lines());
        pins.set_digital(2, Level::High).unwrap();
        pins.set_pwm_duty(4, 0.5).unwrap();
        pins.set_digital(2, Level::High).unwrap();
        assert!(pins.violations.is_empty());
    }

    #[test]
    fn failed_write_is_not_recorded() {
        let mut pins = MockPins::new().fail_on_write(0);
        assert!(pins.set_pwm_duty(1, 1.0).is_err());
        assert!(pins.writes.is_empty());
        assert_eq!(pins.duty(1), 0.0);
        assert_eq!(pins.attempts(), 1);
    }

    // =========================================================================
    // MockStream / MockListener
    // =========================================================================

    #[test]
    fn stream_reports_close_after_drain() {
        let (mut server, peer) = MockStream::pair();
        peer.send(b"abc");
        peer.close();
        let mut buf = [0u8; 2];
        assert_eq!(server.try_read(&mut buf).unwrap(), ReadOutcome::Data(2));
        assert_eq!(server.try_read(&mut buf).unwrap(), ReadOutcome::Data(1));
        assert_eq!(server.try_read(&mut buf).unwrap(), ReadOutcome::Closed);
    }

    #[test]
    fn stream_reset_errors() {
        let (mut server, peer) = MockStream::pair();
        peer.reset();
        let mut buf = [0u8; 2];
        assert_eq!(server.try_read(&mut buf), Err(MockResetError));
        assert_eq!(server.try_write(b"x"), Err(MockResetError));
    }

    #[test]
    fn stream_write_budget() {
        let (mut server, peer) = MockStream::pair();
        peer.limit_writes(3);
        assert_eq!(server.try_write(b"hello").unwrap(), 3);
        assert_eq!(server.try_write(b"lo").unwrap(), 0);
        peer.unlimit_writes();
        assert_eq!(server.try_write(b"lo").unwrap(), 2);
        assert_eq!(peer.received(), b"hello".to_vec());
    }

    #[test]
    fn listener_fail_next_only_once() {
        let mut listener = MockListener::new();
        listener.fail_next_accept();
        assert_eq!(listener.try_accept().unwrap_err(), MockAcceptError);
        assert!(listener.try_accept().unwrap().is_none());
    }

    #[test]
    fn client_frame_is_masked() {
        let frame = client_frame(true, Opcode::Text, b"1 0\n");
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1], 0x80 | 4);
        assert_eq!(frame.len(), 2 + 4 + 4);
        assert_ne!(&frame[6..], b"1 0\n");
    }

    #[test]
    fn client_frame_extended_length() {
        let payload = vec![b'a'; 300];
        let frame = client_frame(true, Opcode::Binary, &payload);
        assert_eq!(frame[1], 0x80 | 126);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 300);
    }
}
