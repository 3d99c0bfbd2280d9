use crate::enums::IntervalCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sent in place of an empty user name or password.
pub const ANONYMOUS: &str = "anonymous";

/// Local identifier of an ingested detection. Never transmitted.
pub type DetectionId = u64;

/// The user credential the session authenticates with.
///
/// `auto_login` is carried through the credential file untouched. This client
/// always logs in on start; the flag matters to interactive clients sharing
/// the same file, which skip their login prompt when it is set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credential {
    pub user: String,
    pub password: String,
    pub auto_login: bool,
}

impl Credential {
    pub fn new(user: impl Into<String>, password: impl Into<String>, auto_login: bool) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            auto_login,
        }
    }

    /// Creates a fresh random user/password pair.
    ///
    /// Both halves are the decimal rendering of a random `u64`, so they are
    /// never empty.
    pub fn generate(auto_login: bool) -> Self {
        Self {
            user: rand::random::<u64>().to_string(),
            password: rand::random::<u64>().to_string(),
            auto_login,
        }
    }

    /// True when either half is missing and a new user must be registered.
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() || self.password.is_empty()
    }

    /// The user name as it goes on the wire.
    pub fn wire_user(&self) -> &str {
        if self.user.is_empty() { ANONYMOUS } else { &self.user }
    }

    /// The password as it goes on the wire.
    pub fn wire_password(&self) -> &str {
        if self.password.is_empty() { ANONYMOUS } else { &self.password }
    }
}

/// One open-high-low-close-volume bar.
///
/// A timestamp that could not be parsed is kept as `None` rather than
/// rejecting the bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub interval: IntervalCode,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

impl Candle {
    /// High-to-low swing as a percentage of the low.
    pub fn delta_percent(&self) -> f64 {
        if self.low == 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.low * 100.0
    }

    /// Volume valued at the mid of open and close.
    pub fn quote_turnover(&self) -> f64 {
        (self.open + self.close) / 2.0 * self.volume
    }

    pub fn is_rising(&self) -> bool {
        self.open <= self.close
    }
}

/// One subscription rule the server matches detections against.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    pub exchange: String,
    pub symbol: String,
    pub interval: IntervalCode,
    pub min_delta_percent: f64,
    pub min_volume: f64,
}

/// A filter match pushed by the server.
///
/// `history` is never empty for detections read off the wire; an empty
/// `review_history` means the server had no long-range context for this match.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub id: DetectionId,
    pub exchange: String,
    pub delta: f64,
    pub volume: f64,
    pub history: Vec<Candle>,
    pub review_history: Vec<Candle>,
}

impl Detection {
    /// The most recent bar, which identifies the symbol and interval.
    ///
    /// `None` only for a detection assembled by hand with no bars.
    pub fn head(&self) -> Option<&Candle> {
        self.history.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            symbol: "BTCUSDT".to_string(),
            interval: IntervalCode::Min5,
            open_time: None,
            close_time: None,
            open,
            high,
            low,
            close,
            volume,
            quote_volume: 0.0,
        }
    }

    #[test]
    fn generated_credentials_are_non_empty_and_distinct() {
        let first = Credential::generate(false);
        let second = Credential::generate(false);
        assert!(!first.is_empty());
        assert!(first.user.parse::<u64>().is_ok());
        assert_ne!(first, second);
    }

    #[test]
    fn empty_halves_go_out_as_anonymous() {
        let credential = Credential::new("", "secret", false);
        assert!(credential.is_empty());
        assert_eq!(credential.wire_user(), ANONYMOUS);
        assert_eq!(credential.wire_password(), "secret");
    }

    #[test]
    fn a_detection_without_bars_has_no_head() {
        let mut detection = Detection {
            id: 0,
            exchange: "MEXC".to_string(),
            delta: 0.0,
            volume: 0.0,
            history: Vec::new(),
            review_history: Vec::new(),
        };
        assert_eq!(detection.head(), None);

        detection.history.push(candle(1.0, 2.0, 1.0, 2.0, 1.0));
        assert_eq!(detection.head().map(|bar| bar.close), Some(2.0));
    }

    #[test]
    fn candle_metrics() {
        let bar = candle(10.0, 12.0, 8.0, 11.0, 100.0);
        assert!((bar.delta_percent() - 50.0).abs() < 1e-9);
        assert!((bar.quote_turnover() - 1050.0).abs() < 1e-9);
        assert!(bar.is_rising());
        assert_eq!(candle(1.0, 1.0, 0.0, 1.0, 1.0).delta_percent(), 0.0);
    }
}
