use serde::{Deserialize, Serialize};
use std::fmt;

/// The candle interval advertised by the server.
///
/// Every known code has a canonical wire string and a duration in milliseconds.
/// `Unknown` is what unparsable input degrades to; it has no wire string and
/// must never be sent back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntervalCode {
    Min1,
    Min5,
    Min15,
    Min30,
    Min60,
    Hour4,
    Hour8,
    Day1,
    Week1,
    Unknown,
}

impl IntervalCode {
    /// All codes that can appear on the wire, shortest first.
    pub const KNOWN: [IntervalCode; 9] = [
        IntervalCode::Min1,
        IntervalCode::Min5,
        IntervalCode::Min15,
        IntervalCode::Min30,
        IntervalCode::Min60,
        IntervalCode::Hour4,
        IntervalCode::Hour8,
        IntervalCode::Day1,
        IntervalCode::Week1,
    ];

    /// Length of one bar in milliseconds. `Unknown` is zero.
    pub fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60 * 1000;
        match self {
            IntervalCode::Min1 => MINUTE,
            IntervalCode::Min5 => 5 * MINUTE,
            IntervalCode::Min15 => 15 * MINUTE,
            IntervalCode::Min30 => 30 * MINUTE,
            IntervalCode::Min60 => 60 * MINUTE,
            IntervalCode::Hour4 => 240 * MINUTE,
            IntervalCode::Hour8 => 480 * MINUTE,
            IntervalCode::Day1 => 1440 * MINUTE,
            IntervalCode::Week1 => 10080 * MINUTE,
            IntervalCode::Unknown => 0,
        }
    }

    /// The canonical wire string, or `None` for `Unknown`.
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            IntervalCode::Min1 => Some("1m"),
            IntervalCode::Min5 => Some("5m"),
            IntervalCode::Min15 => Some("15m"),
            IntervalCode::Min30 => Some("30m"),
            IntervalCode::Min60 => Some("60m"),
            IntervalCode::Hour4 => Some("4h"),
            IntervalCode::Hour8 => Some("8h"),
            IntervalCode::Day1 => Some("1d"),
            IntervalCode::Week1 => Some("1w"),
            IntervalCode::Unknown => None,
        }
    }

    /// Parses a wire string. Anything outside the canonical set is `Unknown`.
    pub fn parse(value: &str) -> Self {
        Self::KNOWN
            .iter()
            .copied()
            .find(|code| code.as_wire() == Some(value))
            .unwrap_or(IntervalCode::Unknown)
    }

    pub fn is_known(&self) -> bool {
        *self != IntervalCode::Unknown
    }
}

impl fmt::Display for IntervalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire().unwrap_or("unknown"))
    }
}
