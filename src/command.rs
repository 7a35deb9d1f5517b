//! Text command parsing.
//!
//! A control message is newline-delimited text. Only the most recent
//! complete line matters; earlier lines in the same message are stale
//! setpoints and are skipped. The line holds two whitespace-separated
//! tokens:
//!
//! ```text
//! <magnitude> <direction>\n
//! ```
//!
//! `magnitude` is a decimal number in the units of
//! [`ActuatorConfig::max_magnitude`](crate::ActuatorConfig) and `direction`
//! is the integer selector `0` (normal) or `1` (reverse). Numbers too large
//! for `f32` saturate to `±f32::MAX` and are clamped by the driver like any
//! other out-of-range value.
//!
//! # Line Selection
//!
//! | Payload | Selected line |
//! |---------|---------------|
//! | `"40 0\n"` | `40 0` |
//! | `"5 0\n3 1\n"` | `3 1` |
//! | `"5 0\n\n"` | `5 0` |
//! | `"5 0\n3 1"` | `5 0` (unterminated tail ignored) |
//! | `"3 1"` | none (no newline at all) |
//!
//! # Example
//!
//! ```rust
//! use peltier_link::command::parse_command;
//! use peltier_link::Polarity;
//!
//! let cmd = parse_command("5 0\n3 1\n").unwrap();
//! assert_eq!(cmd.magnitude, 3.0);
//! assert_eq!(cmd.polarity, Polarity::Reverse);
//!
//! assert!(parse_command("5 0\n3\n").is_err());
//! ```

use crate::traits::Polarity;
use core::fmt;

/// A parsed setpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Command {
    /// Requested magnitude, finite; clamping happens in the driver.
    pub magnitude: f32,
    /// Requested polarity.
    pub polarity: Polarity,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude, self.polarity.selector())
    }
}

/// Why a payload did not yield a command.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No non-empty line in the payload.
    #[error("no command line in payload")]
    Empty,
    /// The selected line did not have exactly two tokens.
    #[error("expected 2 tokens, found {0}")]
    TokenCount(usize),
    /// The first token is not a number, or spells out NaN or infinity.
    #[error("invalid magnitude")]
    InvalidMagnitude,
    /// The second token is not a known direction selector.
    #[error("invalid direction selector")]
    InvalidDirection,
}

/// Pick the line a payload is interpreted from.
///
/// Only newline-terminated lines are candidates and the last non-blank one
/// wins, so a payload without any newline yields nothing. Trailing `\r` is
/// stripped.
pub fn select_line(payload: &str) -> Option<&str> {
    let end = payload.rfind('\n')?;
    payload[..end]
        .split('\n')
        .map(|line| line.trim_end_matches('\r').trim())
        .rfind(|line| !line.is_empty())
}

/// Parse the most recent command line of a text message.
///
/// # Errors
///
/// Returns a [`CommandError`] when no line is present or the selected line
/// is malformed. Earlier well-formed lines are never used as a fallback.
pub fn parse_command(payload: &str) -> Result<Command, CommandError> {
    let line = select_line(payload).ok_or(CommandError::Empty)?;

    let mut tokens = line.split_ascii_whitespace();
    let (magnitude, direction) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(m), Some(d), None) => (m, d),
        _ => return Err(CommandError::TokenCount(line.split_ascii_whitespace().count())),
    };

    let magnitude = parse_magnitude(magnitude)?;

    let selector: i64 = direction
        .parse()
        .map_err(|_| CommandError::InvalidDirection)?;
    let polarity = Polarity::from_selector(selector).ok_or(CommandError::InvalidDirection)?;

    Ok(Command {
        magnitude,
        polarity,
    })
}

/// Overflowing numerals saturate; `inf`, `infinity` and `nan` are refused.
fn parse_magnitude(token: &str) -> Result<f32, CommandError> {
    let value: f32 = token.parse().map_err(|_| CommandError::InvalidMagnitude)?;
    if value.is_finite() {
        return Ok(value);
    }
    let spelled = token
        .bytes()
        .any(|b| b.is_ascii_alphabetic() && !b.eq_ignore_ascii_case(&b'e'));
    if value.is_nan() || spelled {
        return Err(CommandError::InvalidMagnitude);
    }
    Ok(f32::MAX.copysign(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Line selection
    // =========================================================================

    #[test]
    fn single_terminated_line() {
        assert_eq!(select_line("40 0\n"), Some("40 0"));
    }

    #[test]
    fn last_terminated_line_wins() {
        assert_eq!(select_line("5 0\n3 1\n"), Some("3 1"));
        assert_eq!(select_line("5 0\n3 1\n\n\n"), Some("3 1"));
    }

    #[test]
    fn unterminated_tail_ignored() {
        assert_eq!(select_line("5 0\n3 1"), Some("5 0"));
    }

    #[test]
    fn no_newline_selects_nothing() {
        assert_eq!(select_line("  7.5 1  "), None);
        assert_eq!(parse_command("3 1"), Err(CommandError::Empty));
    }

    #[test]
    fn crlf_lines() {
        assert_eq!(select_line("1 0\r\n2 1\r\n"), Some("2 1"));
    }

    #[test]
    fn blank_payloads() {
        assert_eq!(select_line(""), None);
        assert_eq!(select_line("\n"), None);
        assert_eq!(select_line(" \r\n \n"), None);
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn parses_integer_and_decimal_magnitudes() {
        assert_eq!(
            parse_command("40 0\n").unwrap(),
            Command {
                magnitude: 40.0,
                polarity: Polarity::Normal
            }
        );
        assert_eq!(parse_command("12.5 1\n").unwrap().magnitude, 12.5);
        assert_eq!(parse_command("0 1\n").unwrap().polarity, Polarity::Reverse);
    }

    #[test]
    fn malformed_last_line_discards_whole_message() {
        assert_eq!(
            parse_command("5 0\n3\n"),
            Err(CommandError::TokenCount(1))
        );
    }

    #[test]
    fn wrong_token_counts() {
        assert_eq!(parse_command("1 0 2\n"), Err(CommandError::TokenCount(3)));
        assert_eq!(parse_command("1\n"), Err(CommandError::TokenCount(1)));
    }

    #[test]
    fn empty_payload() {
        assert_eq!(parse_command(""), Err(CommandError::Empty));
        assert_eq!(parse_command("\n\n"), Err(CommandError::Empty));
    }

    #[test]
    fn bad_magnitude() {
        assert_eq!(parse_command("abc 0\n"), Err(CommandError::InvalidMagnitude));
        assert_eq!(parse_command("inf 0\n"), Err(CommandError::InvalidMagnitude));
        assert_eq!(parse_command("NaN 1\n"), Err(CommandError::InvalidMagnitude));
        assert_eq!(parse_command("-Infinity 1\n"), Err(CommandError::InvalidMagnitude));
    }

    #[test]
    fn overflowing_magnitude_saturates() {
        assert_eq!(parse_command("1e39 0\n").unwrap().magnitude, f32::MAX);
        assert_eq!(parse_command("-1e39 1\n").unwrap().magnitude, -f32::MAX);
    }

    #[test]
    fn negative_magnitude_passes_through() {
        // clamped to zero by the driver
        assert_eq!(parse_command("-5 0\n").unwrap().magnitude, -5.0);
    }

    #[test]
    fn bad_direction() {
        assert_eq!(parse_command("10 2\n"), Err(CommandError::InvalidDirection));
        assert_eq!(parse_command("10 -1\n"), Err(CommandError::InvalidDirection));
        assert_eq!(parse_command("10 x\n"), Err(CommandError::InvalidDirection));
        assert_eq!(parse_command("10 1.0\n"), Err(CommandError::InvalidDirection));
    }

    #[test]
    fn display_round_trip() {
        let cmd = parse_command("2.5 1\n").unwrap();
        assert_eq!(parse_command(&format!("{cmd}\n")).unwrap(), cmd);
    }
}
