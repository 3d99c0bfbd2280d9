use crate::error::EngineError;
use api_client::{WireCandle, WireDetection, parse_element};
use chrono::{DateTime, NaiveDateTime, Utc};
use core_types::{Candle, Detection, DetectionId, IntervalCode};
use serde_json::Value;

/// Wire format of bar timestamps. The fractional part is optional.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Every detection received during the process lifetime, indexed by local id.
#[derive(Debug, Default)]
pub struct KlineBook {
    detections: Vec<Detection>,
}

impl KlineBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the `DetectKLines` array of a data response.
    ///
    /// Elements are handled one by one; a malformed element or one with an
    /// empty `History` is logged and dropped without affecting the rest.
    /// Returns the ids assigned to the accepted detections, in order.
    pub fn ingest(&mut self, wire: &[Value]) -> Vec<DetectionId> {
        let mut accepted = Vec::with_capacity(wire.len());
        for value in wire {
            let id = self.detections.len() as DetectionId;
            match parse_detection(value, id) {
                Ok(detection) => {
                    tracing::debug!(
                        id,
                        exchange = %detection.exchange,
                        bars = detection.history.len(),
                        "Detection ingested."
                    );
                    self.detections.push(detection);
                    accepted.push(id);
                }
                Err(e) => tracing::error!(error = %e, "Dropping detection."),
            }
        }
        accepted
    }

    pub fn get(&self, id: DetectionId) -> Option<&Detection> {
        usize::try_from(id).ok().and_then(|index| self.detections.get(index))
    }

    pub fn latest(&self) -> Option<&Detection> {
        self.detections.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

fn parse_detection(value: &Value, id: DetectionId) -> Result<Detection, EngineError> {
    let wire: WireDetection = parse_element(value)?;
    if wire.history.is_empty() {
        return Err(EngineError::EmptyHistory(wire.stock_exchange));
    }
    Ok(Detection {
        id,
        exchange: wire.stock_exchange,
        delta: wire.delta,
        volume: wire.volume,
        history: wire.history.into_iter().map(into_candle).collect(),
        review_history: wire.review_history.into_iter().map(into_candle).collect(),
    })
}

fn into_candle(wire: WireCandle) -> Candle {
    Candle {
        interval: IntervalCode::parse(&wire.interval),
        open_time: parse_timestamp(&wire.open_time),
        close_time: parse_timestamp(&wire.close_time),
        symbol: wire.money,
        open: wire.open,
        high: wire.high,
        low: wire.low,
        close: wire.close,
        volume: wire.volume,
        quote_volume: wire.quote_asset_volume,
    }
}

/// Parses a bar timestamp as UTC. Unparsable text yields `None`.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    match NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            tracing::warn!(value = %text, error = %e, "Invalid bar timestamp.");
            None
        }
    }
}
