use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{Candle, Detection, DetectionId};
use serde::{Deserialize, Serialize};

/// Enum representing the severity of a user-visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Maps the `Level` field of a server `UserMessages` entry.
    ///
    /// Returns `None` for levels the client does not surface (e.g. `DEBUG`).
    pub fn from_server(level: &str) -> Option<Self> {
        match level.to_ascii_uppercase().as_str() {
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" | "CRITICAL" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// A timestamped line in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogMessage {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// The event-log view of a detection: enough to list it and to look the full
/// bars up again by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionNotice {
    pub id: DetectionId,
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub symbol: String,
    pub interval: String,
    pub delta: f64,
    pub volume: f64,
    pub rising: bool,
    pub bars: usize,
    pub review_bars: usize,
}

impl DetectionNotice {
    /// One-line description, e.g. `MEXC->BTCUSDT Interval: 5m Delta=7.5 Volume=1200`.
    pub fn summary(&self) -> String {
        format!(
            "{}->{} Interval: {} Delta={} Volume={}",
            self.exchange, self.symbol, self.interval, self.delta, self.volume
        )
    }
}

impl From<&Detection> for DetectionNotice {
    fn from(detection: &Detection) -> Self {
        let head = detection.head();
        Self {
            id: detection.id,
            timestamp: Utc::now(),
            exchange: detection.exchange.clone(),
            symbol: head.map(|bar| bar.symbol.clone()).unwrap_or_default(),
            interval: head.map(|bar| bar.interval.to_string()).unwrap_or_default(),
            delta: detection.delta,
            volume: detection.volume,
            rising: head.is_some_and(Candle::is_rising),
            bars: detection.history.len(),
            review_bars: detection.review_history.len(),
        }
    }
}

/// Every user-visible event the session engine emits.
///
/// Serialized as `{"type": "...", "payload": {...}}` so a consumer reading
/// JSON lines can dispatch on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    /// A plain message: login results, connection loss, server notices.
    Log(LogMessage),
    /// A filter match pushed by the server.
    Detection(DetectionNotice),
    /// A session was established.
    SessionActive { session_id: i64, user: String },
    /// The catalog of exchanges, symbols and intervals was replaced.
    CatalogUpdated { exchanges: usize, symbols: usize },
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn level(&self) -> LogLevel {
        match self {
            ClientEvent::Log(log) => log.level,
            _ => LogLevel::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::IntervalCode;

    #[test]
    fn server_levels_map_case_insensitively() {
        assert_eq!(LogLevel::from_server("INFO"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_server("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_server("Error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_server("DEBUG"), None);
    }

    #[test]
    fn notice_summarises_the_head_bar() {
        let bar = Candle {
            symbol: "ETHUSDT".to_string(),
            interval: IntervalCode::Min15,
            open_time: None,
            close_time: None,
            open: 2.0,
            high: 3.0,
            low: 1.0,
            close: 1.5,
            volume: 10.0,
            quote_volume: 20.0,
        };
        let detection = Detection {
            id: 3,
            exchange: "KUCOIN".to_string(),
            delta: 7.5,
            volume: 1200.0,
            history: vec![bar],
            review_history: Vec::new(),
        };

        let notice = DetectionNotice::from(&detection);
        assert_eq!(notice.id, 3);
        assert!(!notice.rising);
        assert_eq!(notice.review_bars, 0);
        assert_eq!(
            notice.summary(),
            "KUCOIN->ETHUSDT Interval: 15m Delta=7.5 Volume=1200"
        );
    }

    #[test]
    fn a_notice_without_bars_is_blank_rather_than_a_panic() {
        let detection = Detection {
            id: 9,
            exchange: "GATE".to_string(),
            delta: 2.0,
            volume: 600.0,
            history: Vec::new(),
            review_history: Vec::new(),
        };
        let notice = DetectionNotice::from(&detection);
        assert_eq!(notice.symbol, "");
        assert_eq!(notice.interval, "");
        assert!(!notice.rising);
        assert_eq!(notice.bars, 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ClientEvent::SessionActive {
            session_id: 42,
            user: "alice".to_string(),
        };
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"SessionActive\""));
        assert!(json.contains("\"session_id\":42"));
    }
}
