//! Per-connection WebSocket framing (RFC 6455 subset).
//!
//! [`Framer`] turns the raw bytes read from one socket into events: the
//! completed opening handshake, complete text messages, pings and close
//! requests. It never touches the socket itself; the connection pool reads
//! bytes in, feeds them to [`Framer::ingest`], and calls [`Framer::poll`]
//! once per pass.
//!
//! # Supported Subset
//!
//! - HTTP/1.1 `GET` upgrade with `Sec-WebSocket-Key`
//! - Masked client frames with 7, 16 and 64-bit lengths
//! - Text messages, single frame or fragmented (reassembled)
//! - Ping (answered with pong), pong (ignored), close (echoed)
//! - Binary messages are accepted and dropped
//!
//! # Memory Bounds
//!
//! All buffers are `heapless` and sized at compile time:
//!
//! | Buffer | Size |
//! |--------|------|
//! | Receive buffer | [`RX_BUFFER_SIZE`] |
//! | Reassembled message / single frame payload | [`MAX_MESSAGE_SIZE`] |
//! | Outbound queue (per connection, in the pool) | [`TX_BUFFER_SIZE`] |
//!
//! A handshake or frame that cannot fit is a protocol violation and the
//! connection is dropped.
//!
//! # Example
//!
//! ```rust
//! use peltier_link::websocket::{Framer, FramerEvent};
//! use peltier_link::hal::client_frame;
//! use peltier_link::websocket::Opcode;
//!
//! let mut framer = Framer::new();
//! framer
//!     .ingest(b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
//!               Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n")
//!     .unwrap();
//!
//! let FramerEvent::Handshake(reply) = framer.poll().unwrap() else { panic!() };
//! assert!(reply.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
//!
//! framer.ingest(&client_frame(true, Opcode::Text, b"50 1\n")).unwrap();
//! let FramerEvent::Text(text) = framer.poll().unwrap() else { panic!() };
//! assert_eq!(text.as_str(), "50 1\n");
//! ```

use core::fmt::Write as _;
use heapless::{String as HString, Vec as HVec};
use log::trace;

/// Receive buffer size per connection.
pub const RX_BUFFER_SIZE: usize = 1024;

/// Outbound queue size per connection (handshake reply, pong, close).
pub const TX_BUFFER_SIZE: usize = 256;

/// Largest text message (and largest single frame payload) accepted.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Largest opening handshake request accepted.
pub const MAX_HANDSHAKE_SIZE: usize = RX_BUFFER_SIZE;

/// Largest payload allowed in a control frame.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const ACCEPT_KEY_LEN: usize = 28;

/// Bounded frame/message payload.
pub type Payload = HVec<u8, MAX_MESSAGE_SIZE>;

/// Bounded text message.
pub type TextMessage = HString<MAX_MESSAGE_SIZE>;

/// Bounded handshake reply.
pub type HandshakeReply = HString<TX_BUFFER_SIZE>;

/// Protocol violations. Every variant closes the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The upgrade request could not be understood.
    #[error("malformed handshake: {0}")]
    MalformedHandshake(&'static str),
    /// The upgrade request did not end within the receive buffer.
    #[error("handshake exceeds {MAX_HANDSHAKE_SIZE} bytes")]
    HandshakeTooLarge,
    /// A client frame arrived without the mask bit.
    #[error("client frame not masked")]
    UnmaskedFrame,
    /// RSV1-3 set without a negotiated extension.
    #[error("reserved bits set")]
    ReservedBits,
    /// Opcode outside the RFC 6455 set.
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    /// Control frame without FIN.
    #[error("fragmented control frame")]
    FragmentedControl,
    /// Control frame payload over 125 bytes.
    #[error("control frame payload too long")]
    ControlTooLong,
    /// Frame payload larger than [`MAX_MESSAGE_SIZE`].
    #[error("frame payload of {0} bytes too large")]
    FrameTooLarge(u64),
    /// Continuation frame with no message in progress.
    #[error("continuation without a started message")]
    UnexpectedContinuation,
    /// New data frame while a fragmented message was still open.
    #[error("new message before previous one finished")]
    InterleavedMessage,
    /// Reassembled message larger than [`MAX_MESSAGE_SIZE`].
    #[error("message exceeds {MAX_MESSAGE_SIZE} bytes")]
    MessageTooLarge,
    /// Text message is not valid UTF-8.
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
    /// Peer sent more bytes than the receive buffer holds.
    #[error("receive buffer overflow")]
    BufferOverflow,
    /// Outbound queue full.
    #[error("transmit queue overflow")]
    TxOverflow,
}

/// WebSocket opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text data.
    Text,
    /// Binary data.
    Binary,
    /// Connection close.
    Close,
    /// Ping.
    Ping,
    /// Pong.
    Pong,
}

impl Opcode {
    /// Decode the low nibble of the first header byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Wire value.
    pub const fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    /// Close, ping and pong.
    pub const fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// One decoded, unmasked frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of its message.
    pub fin: bool,
    /// Frame type.
    pub opcode: Opcode,
    /// Unmasked payload.
    pub payload: Payload,
}

/// Outcome of [`decode_frame`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    /// Not enough bytes yet; at least `needed` bytes must be buffered.
    Incomplete {
        /// Total buffered length required to make progress.
        needed: usize,
    },
    /// A complete frame occupying the first `consumed` bytes.
    Complete {
        /// The decoded frame.
        frame: Frame,
        /// Bytes to drop from the front of the buffer.
        consumed: usize,
    },
}

/// Outcome of [`parse_handshake`] on a complete request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handshake {
    /// Bytes of the request, including the blank line.
    pub consumed: usize,
    /// `101 Switching Protocols` reply to send back.
    pub reply: HandshakeReply,
}

/// Event produced by [`Framer::poll`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FramerEvent {
    /// Nothing complete yet.
    Idle,
    /// Opening handshake accepted; send `reply`.
    Handshake(HandshakeReply),
    /// A complete text message.
    Text(TextMessage),
    /// A complete binary message of the given length (dropped).
    Binary(usize),
    /// Ping with payload to echo in a pong.
    Ping(Payload),
    /// Close requested, with the status code if the peer sent one.
    Close(Option<u16>),
}

/// Framing phase of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the HTTP upgrade request.
    Handshake,
    /// Exchanging frames.
    Open,
    /// Close received; no further input is processed.
    Closed,
}

// ============================================================================
// Handshake
// ============================================================================

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Try to parse an opening handshake from the front of `buf`.
///
/// Returns `Ok(None)` until the terminating blank line has arrived.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedHandshake`] for anything that is not a
/// well-formed WebSocket upgrade request.
pub fn parse_handshake(buf: &[u8]) -> Result<Option<Handshake>, ProtocolError> {
    let Some(end) = find_subsequence(buf, b"\r\n\r\n") else {
        return Ok(None);
    };
    let consumed = end + 4;
    let head = core::str::from_utf8(&buf[..end])
        .map_err(|_| ProtocolError::MalformedHandshake("request is not UTF-8"))?;

    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .ok_or(ProtocolError::MalformedHandshake("empty request"))?;
    let mut parts = request_line.split_ascii_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("GET"), Some(_path), Some(version), None) if version.starts_with("HTTP/1.") => {}
        _ => return Err(ProtocolError::MalformedHandshake("expected GET request line")),
    }

    let mut upgrade = false;
    let mut key = None;
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or(ProtocolError::MalformedHandshake("header without colon"))?;
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("upgrade") {
            upgrade = value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("websocket"));
        } else if name.eq_ignore_ascii_case("sec-websocket-key") {
            key = Some(value);
        }
    }

    if !upgrade {
        return Err(ProtocolError::MalformedHandshake("missing Upgrade: websocket"));
    }
    let key = key
        .filter(|k| !k.is_empty())
        .ok_or(ProtocolError::MalformedHandshake("missing Sec-WebSocket-Key"))?;

    let accept = tungstenite::handshake::derive_accept_key(key.as_bytes());
    debug_assert_eq!(accept.len(), ACCEPT_KEY_LEN);

    let mut reply = HandshakeReply::new();
    write!(
        reply,
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
    .map_err(|_| ProtocolError::TxOverflow)?;

    Ok(Some(Handshake { consumed, reply }))
}

// ============================================================================
// Frame decode / encode
// ============================================================================

/// Decode one masked client frame from the front of `buf`.
///
/// # Errors
///
/// Returns a [`ProtocolError`] for unmasked frames, reserved bits, unknown
/// opcodes, invalid control frames and payloads over [`MAX_MESSAGE_SIZE`].
/// Header checks run as soon as the header bytes are present, so an
/// oversize frame is rejected before its payload arrives.
pub fn decode_frame(buf: &[u8]) -> Result<Decoded, ProtocolError> {
    if buf.len() < 2 {
        return Ok(Decoded::Incomplete { needed: 2 });
    }

    let b0 = buf[0];
    let b1 = buf[1];
    let fin = b0 & 0x80 != 0;
    if b0 & 0x70 != 0 {
        return Err(ProtocolError::ReservedBits);
    }
    let opcode = Opcode::from_u8(b0 & 0x0F).ok_or(ProtocolError::UnknownOpcode(b0 & 0x0F))?;
    if b1 & 0x80 == 0 {
        return Err(ProtocolError::UnmaskedFrame);
    }

    let (len, ext) = match b1 & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(Decoded::Incomplete { needed: 4 });
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 2)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(Decoded::Incomplete { needed: 10 });
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(raw), 8)
        }
        n => (u64::from(n), 0),
    };

    if opcode.is_control() {
        if !fin {
            return Err(ProtocolError::FragmentedControl);
        }
        if len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(ProtocolError::ControlTooLong);
        }
    }
    if len > MAX_MESSAGE_SIZE as u64 {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let len = len as usize;
    let mask_at = 2 + ext;
    let payload_at = mask_at + 4;
    let total = payload_at + len;
    if buf.len() < total {
        return Ok(Decoded::Incomplete { needed: total });
    }

    let mask = [
        buf[mask_at],
        buf[mask_at + 1],
        buf[mask_at + 2],
        buf[mask_at + 3],
    ];
    let mut payload = Payload::new();
    for (i, byte) in buf[payload_at..total].iter().enumerate() {
        // Capacity was checked against MAX_MESSAGE_SIZE above.
        let _ = payload.push(byte ^ mask[i % 4]);
    }

    Ok(Decoded::Complete {
        frame: Frame {
            fin,
            opcode,
            payload,
        },
        consumed: total,
    })
}

/// Append one unmasked, final server frame to `out`.
///
/// # Errors
///
/// Returns [`ProtocolError::TxOverflow`] if the frame does not fit; `out`
/// is left unchanged in that case.
pub fn encode_frame<const N: usize>(
    opcode: Opcode,
    payload: &[u8],
    out: &mut HVec<u8, N>,
) -> Result<(), ProtocolError> {
    let header_len = match payload.len() {
        n if n < 126 => 2,
        n if n <= u16::MAX as usize => 4,
        _ => 10,
    };
    if out.len() + header_len + payload.len() > N {
        return Err(ProtocolError::TxOverflow);
    }

    let overflow = |_| ProtocolError::TxOverflow;
    out.push(0x80 | opcode.as_u8()).map_err(overflow)?;
    match payload.len() {
        n if n < 126 => out.push(n as u8).map_err(overflow)?,
        n if n <= u16::MAX as usize => {
            out.push(126).map_err(overflow)?;
            out.extend_from_slice(&(n as u16).to_be_bytes())
                .map_err(|_| ProtocolError::TxOverflow)?;
        }
        n => {
            out.push(127).map_err(overflow)?;
            out.extend_from_slice(&(n as u64).to_be_bytes())
                .map_err(|_| ProtocolError::TxOverflow)?;
        }
    }
    out.extend_from_slice(payload)
        .map_err(|_| ProtocolError::TxOverflow)
}

/// Status code carried by a close payload, if any.
pub fn close_code(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

// ============================================================================
// Framer
// ============================================================================

/// Per-connection framing state.
///
/// Holds buffered bytes across passes, so a handshake or frame split over
/// any number of reads completes once its last byte arrives.
#[derive(Debug)]
pub struct Framer {
    rx: HVec<u8, RX_BUFFER_SIZE>,
    phase: Phase,
    needed: usize,
    scanned: usize,
    message: Payload,
    assembling: Option<Opcode>,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    /// A framer waiting for the opening handshake.
    pub fn new() -> Self {
        Self {
            rx: HVec::new(),
            phase: Phase::Handshake,
            needed: 0,
            scanned: 0,
            message: Payload::new(),
            assembling: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the opening handshake has completed.
    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    /// Free space in the receive buffer.
    pub fn free(&self) -> usize {
        RX_BUFFER_SIZE - self.rx.len()
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// Whether a fragmented message is being reassembled.
    pub fn is_assembling(&self) -> bool {
        self.assembling.is_some()
    }

    /// Append received bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BufferOverflow`] if they do not fit.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.rx
            .extend_from_slice(bytes)
            .map_err(|_| ProtocolError::BufferOverflow)
    }

    /// Process buffered bytes and return at most one event.
    ///
    /// # Errors
    ///
    /// Any [`ProtocolError`] means the connection must be dropped.
    pub fn poll(&mut self) -> Result<FramerEvent, ProtocolError> {
        match self.phase {
            Phase::Handshake => self.poll_handshake(),
            Phase::Open => self.poll_frame(),
            Phase::Closed => Ok(FramerEvent::Idle),
        }
    }

    fn poll_handshake(&mut self) -> Result<FramerEvent, ProtocolError> {
        if self.rx.len() == self.scanned {
            return Ok(FramerEvent::Idle);
        }
        // Resume where the last pass stopped; a terminator may straddle reads.
        let from = self.scanned.saturating_sub(3);
        let terminated = find_subsequence(&self.rx[from..], b"\r\n\r\n").is_some();
        self.scanned = self.rx.len();
        if !terminated {
            if self.rx.len() >= MAX_HANDSHAKE_SIZE {
                return Err(ProtocolError::HandshakeTooLarge);
            }
            return Ok(FramerEvent::Idle);
        }
        match parse_handshake(&self.rx)? {
            None if self.rx.len() >= MAX_HANDSHAKE_SIZE => Err(ProtocolError::HandshakeTooLarge),
            None => Ok(FramerEvent::Idle),
            Some(handshake) => {
                self.consume(handshake.consumed);
                self.scanned = 0;
                self.phase = Phase::Open;
                Ok(FramerEvent::Handshake(handshake.reply))
            }
        }
    }

    fn poll_frame(&mut self) -> Result<FramerEvent, ProtocolError> {
        if self.rx.len() < self.needed {
            return Ok(FramerEvent::Idle);
        }
        match decode_frame(&self.rx)? {
            Decoded::Incomplete { needed } => {
                trace!("[WS] partial frame: {} of {needed} bytes", self.rx.len());
                self.needed = needed;
                Ok(FramerEvent::Idle)
            }
            Decoded::Complete { frame, consumed } => {
                self.consume(consumed);
                self.needed = 0;
                self.handle_frame(frame)
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<FramerEvent, ProtocolError> {
        match frame.opcode {
            Opcode::Ping => Ok(FramerEvent::Ping(frame.payload)),
            Opcode::Pong => Ok(FramerEvent::Idle),
            Opcode::Close => {
                self.phase = Phase::Closed;
                Ok(FramerEvent::Close(close_code(&frame.payload)))
            }
            Opcode::Text | Opcode::Binary => {
                if self.assembling.is_some() {
                    return Err(ProtocolError::InterleavedMessage);
                }
                if frame.fin {
                    return finish_message(frame.opcode, frame.payload);
                }
                self.assembling = Some(frame.opcode);
                self.message = frame.payload;
                Ok(FramerEvent::Idle)
            }
            Opcode::Continuation => {
                let opcode = self
                    .assembling
                    .ok_or(ProtocolError::UnexpectedContinuation)?;
                self.message
                    .extend_from_slice(&frame.payload)
                    .map_err(|_| ProtocolError::MessageTooLarge)?;
                if !frame.fin {
                    return Ok(FramerEvent::Idle);
                }
                self.assembling = None;
                let message = core::mem::take(&mut self.message);
                finish_message(opcode, message)
            }
        }
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.rx.len());
        self.rx.rotate_left(n);
        self.rx.truncate(self.rx.len() - n);
    }
}

fn finish_message(opcode: Opcode, payload: Payload) -> Result<FramerEvent, ProtocolError> {
    if opcode == Opcode::Binary {
        return Ok(FramerEvent::Binary(payload.len()));
    }
    TextMessage::from_utf8(payload)
        .map(FramerEvent::Text)
        .map_err(|_| ProtocolError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::client_frame;

    const UPGRADE: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    fn open_framer() -> Framer {
        let mut framer = Framer::new();
        framer.ingest(UPGRADE).unwrap();
        assert!(matches!(framer.poll().unwrap(), FramerEvent::Handshake(_)));
        framer
    }

    // =========================================================================
    // Handshake
    // =========================================================================

    #[test]
    fn handshake_reply_uses_rfc_accept_key() {
        let hs = parse_handshake(UPGRADE).unwrap().unwrap();
        assert_eq!(hs.consumed, UPGRADE.len());
        assert!(hs.reply.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(hs
            .reply
            .contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(hs.reply.ends_with("\r\n\r\n"));
    }

    #[test]
    fn handshake_incomplete_until_blank_line() {
        let partial = &UPGRADE[..UPGRADE.len() - 2];
        assert_eq!(parse_handshake(partial).unwrap(), None);
    }

    #[test]
    fn handshake_headers_case_insensitive() {
        let req = b"GET / HTTP/1.1\r\nUPGRADE: WebSocket\r\nsec-websocket-key: abc\r\n\r\n";
        assert!(parse_handshake(req).unwrap().is_some());
    }

    #[test]
    fn handshake_rejects_missing_key() {
        let req = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n";
        assert!(matches!(
            parse_handshake(req),
            Err(ProtocolError::MalformedHandshake(_))
        ));
    }

    #[test]
    fn handshake_rejects_plain_http() {
        let req = b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n";
        assert!(parse_handshake(req).is_err());
        let req = b"POST / HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Key: a\r\n\r\n";
        assert!(parse_handshake(req).is_err());
    }

    #[test]
    fn handshake_split_across_ingests() {
        let mut framer = Framer::new();
        for chunk in UPGRADE.chunks(7) {
            assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
            framer.ingest(chunk).unwrap();
        }
        assert!(matches!(framer.poll().unwrap(), FramerEvent::Handshake(_)));
        assert!(framer.is_open());
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn stalled_handshake_is_not_rescanned() {
        let mut framer = Framer::new();
        framer.ingest(&UPGRADE[..40]).unwrap();
        assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
        assert_eq!(framer.scanned, 40);

        // No new bytes: nothing to search
        for _ in 0..10 {
            assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
        }
        assert_eq!(framer.scanned, 40);

        // Terminator split between two reads
        let split = UPGRADE.len() - 2;
        framer.ingest(&UPGRADE[40..split]).unwrap();
        assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
        framer.ingest(&UPGRADE[split..]).unwrap();
        assert!(matches!(framer.poll().unwrap(), FramerEvent::Handshake(_)));
        assert_eq!(framer.scanned, 0);
    }

    #[test]
    fn bytes_after_handshake_are_kept() {
        let mut framer = Framer::new();
        framer.ingest(UPGRADE).unwrap();
        framer
            .ingest(&client_frame(true, Opcode::Text, b"1 0\n"))
            .unwrap();
        assert!(matches!(framer.poll().unwrap(), FramerEvent::Handshake(_)));
        assert_eq!(
            framer.poll().unwrap(),
            FramerEvent::Text(TextMessage::try_from("1 0\n").unwrap())
        );
    }

    #[test]
    fn oversize_handshake_rejected() {
        let mut framer = Framer::new();
        framer.ingest(b"GET / HTTP/1.1\r\n").unwrap();
        let filler = [b'a'; RX_BUFFER_SIZE];
        let free = framer.free();
        framer.ingest(&filler[..free]).unwrap();
        assert_eq!(framer.poll(), Err(ProtocolError::HandshakeTooLarge));
    }

    // =========================================================================
    // Frame decode
    // =========================================================================

    #[test]
    fn decode_single_masked_text() {
        let bytes = client_frame(true, Opcode::Text, b"hello");
        let Decoded::Complete { frame, consumed } = decode_frame(&bytes).unwrap() else {
            panic!("expected complete frame");
        };
        assert_eq!(consumed, bytes.len());
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(&frame.payload[..], b"hello");
    }

    #[test]
    fn decode_reports_needed_bytes() {
        let bytes = client_frame(true, Opcode::Text, b"hello");
        assert_eq!(
            decode_frame(&bytes[..1]).unwrap(),
            Decoded::Incomplete { needed: 2 }
        );
        assert_eq!(
            decode_frame(&bytes[..8]).unwrap(),
            Decoded::Incomplete {
                needed: bytes.len()
            }
        );
    }

    #[test]
    fn decode_extended_16_bit_length() {
        let payload = [b'x'; 300];
        let bytes = client_frame(true, Opcode::Text, &payload);
        let Decoded::Complete { frame, .. } = decode_frame(&bytes).unwrap() else {
            panic!("expected complete frame");
        };
        assert_eq!(frame.payload.len(), 300);
    }

    #[test]
    fn decode_rejects_unmasked() {
        assert_eq!(
            decode_frame(&[0x81, 0x02, b'h', b'i']),
            Err(ProtocolError::UnmaskedFrame)
        );
    }

    #[test]
    fn decode_rejects_reserved_bits_and_opcodes() {
        assert_eq!(decode_frame(&[0xC1, 0x80]), Err(ProtocolError::ReservedBits));
        assert_eq!(
            decode_frame(&[0x83, 0x80]),
            Err(ProtocolError::UnknownOpcode(0x3))
        );
    }

    #[test]
    fn decode_rejects_bad_control_frames() {
        assert_eq!(
            decode_frame(&[0x09, 0x80]),
            Err(ProtocolError::FragmentedControl)
        );
        assert_eq!(
            decode_frame(&[0x89, 0x80 | 126, 0x00, 0x80]),
            Err(ProtocolError::ControlTooLong)
        );
    }

    #[test]
    fn decode_rejects_oversize_from_header() {
        // 64-bit length header only; payload never needs to arrive
        let mut header = vec![0x81, 0x80 | 127];
        header.extend_from_slice(&(1u64 << 40).to_be_bytes());
        assert_eq!(
            decode_frame(&header),
            Err(ProtocolError::FrameTooLarge(1u64 << 40))
        );
    }

    // =========================================================================
    // Encode
    // =========================================================================

    #[test]
    fn encode_small_frame_unmasked() {
        let mut out: HVec<u8, 16> = HVec::new();
        encode_frame(Opcode::Pong, b"ab", &mut out).unwrap();
        assert_eq!(&out[..], &[0x8A, 0x02, b'a', b'b']);
    }

    #[test]
    fn encode_medium_frame_uses_16_bit_length() {
        let mut out: HVec<u8, 256> = HVec::new();
        encode_frame(Opcode::Text, &[b'z'; 130], &mut out).unwrap();
        assert_eq!(&out[..4], &[0x81, 126, 0x00, 130]);
        assert_eq!(out.len(), 134);
    }

    #[test]
    fn encode_overflow_leaves_buffer_untouched() {
        let mut out: HVec<u8, 4> = HVec::new();
        out.push(0xFF).unwrap();
        assert_eq!(
            encode_frame(Opcode::Text, b"abcd", &mut out),
            Err(ProtocolError::TxOverflow)
        );
        assert_eq!(&out[..], &[0xFF]);
    }

    // =========================================================================
    // Framer: messages and control frames
    // =========================================================================

    #[test]
    fn partial_frame_completes_across_polls() {
        let mut framer = open_framer();
        let bytes = client_frame(true, Opcode::Text, b"25 0\n");
        framer.ingest(&bytes[..3]).unwrap();
        assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
        framer.ingest(&bytes[3..]).unwrap();
        assert_eq!(
            framer.poll().unwrap(),
            FramerEvent::Text(TextMessage::try_from("25 0\n").unwrap())
        );
    }

    #[test]
    fn fragmented_text_reassembled_with_interleaved_ping() {
        let mut framer = open_framer();
        framer
            .ingest(&client_frame(false, Opcode::Text, b"10 "))
            .unwrap();
        framer.ingest(&client_frame(true, Opcode::Ping, b"p")).unwrap();
        framer
            .ingest(&client_frame(true, Opcode::Continuation, b"1\n"))
            .unwrap();

        assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
        assert!(framer.is_assembling());
        assert!(matches!(framer.poll().unwrap(), FramerEvent::Ping(p) if &p[..] == b"p"));
        assert_eq!(
            framer.poll().unwrap(),
            FramerEvent::Text(TextMessage::try_from("10 1\n").unwrap())
        );
        assert!(!framer.is_assembling());
    }

    #[test]
    fn continuation_without_start_is_error() {
        let mut framer = open_framer();
        framer
            .ingest(&client_frame(true, Opcode::Continuation, b"x"))
            .unwrap();
        assert_eq!(framer.poll(), Err(ProtocolError::UnexpectedContinuation));
    }

    #[test]
    fn new_message_during_fragmented_one_is_error() {
        let mut framer = open_framer();
        framer.ingest(&client_frame(false, Opcode::Text, b"a")).unwrap();
        framer.ingest(&client_frame(true, Opcode::Text, b"b")).unwrap();
        assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
        assert_eq!(framer.poll(), Err(ProtocolError::InterleavedMessage));
    }

    #[test]
    fn reassembled_message_is_bounded() {
        let mut framer = open_framer();
        let chunk = [b'1'; 300];
        framer.ingest(&client_frame(false, Opcode::Text, &chunk)).unwrap();
        assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
        framer
            .ingest(&client_frame(true, Opcode::Continuation, &chunk))
            .unwrap();
        assert_eq!(framer.poll(), Err(ProtocolError::MessageTooLarge));
    }

    #[test]
    fn invalid_utf8_text_rejected() {
        let mut framer = open_framer();
        framer
            .ingest(&client_frame(true, Opcode::Text, &[0xff, 0xfe]))
            .unwrap();
        assert_eq!(framer.poll(), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn binary_message_reported_and_dropped() {
        let mut framer = open_framer();
        framer
            .ingest(&client_frame(true, Opcode::Binary, &[1, 2, 3]))
            .unwrap();
        assert_eq!(framer.poll().unwrap(), FramerEvent::Binary(3));
    }

    #[test]
    fn close_carries_code_and_stops_processing() {
        let mut framer = open_framer();
        framer
            .ingest(&client_frame(true, Opcode::Close, &1000u16.to_be_bytes()))
            .unwrap();
        framer.ingest(&client_frame(true, Opcode::Text, b"1 1\n")).unwrap();
        assert_eq!(framer.poll().unwrap(), FramerEvent::Close(Some(1000)));
        assert_eq!(framer.phase(), Phase::Closed);
        assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
    }

    #[test]
    fn pong_is_ignored() {
        let mut framer = open_framer();
        framer.ingest(&client_frame(true, Opcode::Pong, b"")).unwrap();
        assert_eq!(framer.poll().unwrap(), FramerEvent::Idle);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn ingest_overflow() {
        let mut framer = Framer::new();
        let big = [0u8; RX_BUFFER_SIZE + 1];
        assert_eq!(framer.ingest(&big), Err(ProtocolError::BufferOverflow));
    }

    #[test]
    fn close_code_parsing() {
        assert_eq!(close_code(&[]), None);
        assert_eq!(close_code(&[0x03]), None);
        assert_eq!(close_code(&[0x03, 0xE8, b'b', b'y', b'e']), Some(1000));
    }
}
