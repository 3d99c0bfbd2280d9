use crate::error::ApiError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// The service speaks PascalCase JSON; `#[serde(rename_all = "PascalCase")]`
// maps it onto snake_case fields. Missing fields fall back to their defaults,
// the way the server's other clients read them. Arrays may arrive as `null`.

/// The `Result` field every response carries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ResultCode {
    Ok,
    /// The session was invalidated server-side (data poll only).
    Logout,
    Other(String),
}

impl From<String> for ResultCode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "OK" => ResultCode::Ok,
            "LOGOUT" => ResultCode::Logout,
            _ => ResultCode::Other(value),
        }
    }
}

impl Default for ResultCode {
    fn default() -> Self {
        ResultCode::Other(String::new())
    }
}

impl ResultCode {
    pub fn is_ok(&self) -> bool {
        *self == ResultCode::Ok
    }
}

/// Response of `GET /login/...`.
///
/// `filter` is kept as raw values so a single malformed rule does not reject
/// the whole list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub result: ResultCode,
    #[serde(rename = "SessionID", default)]
    pub session_id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub filter: Vec<Value>,
    #[serde(default)]
    pub message: String,
}

/// Response of `GET /newuser/...` and `POST /config/...`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub result: ResultCode,
    #[serde(default)]
    pub message: String,
}

/// Response of `GET /klines/{sessionID}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KlinesResponse {
    #[serde(default)]
    pub result: ResultCode,
    #[serde(rename = "KLines", default, deserialize_with = "null_as_empty")]
    pub klines: Vec<Value>,
    #[serde(default)]
    pub message: String,
}

/// Response of `GET /data/{sessionID}`.
///
/// Both arrays stay raw; elements are parsed one at a time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataResponse {
    #[serde(default)]
    pub result: ResultCode,
    #[serde(rename = "DetectKLines", default, deserialize_with = "null_as_empty")]
    pub detect_klines: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub user_messages: Vec<Value>,
    #[serde(default)]
    pub message: String,
}

/// A notice the server wants shown to the user, one element of `UserMessages`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireUserMessage {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

/// One filter rule, as sent in `Filter` arrays in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireFilterRule {
    #[serde(default)]
    pub stock_exchange: String,
    #[serde(default)]
    pub money: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Body of `POST /config/{sessionID}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigRequest<'a> {
    pub filter: &'a [WireFilterRule],
}

impl ConfigRequest<'_> {
    pub fn to_body(&self) -> Result<Vec<u8>, ApiError> {
        serde_json::to_vec(self).map_err(|e| ApiError::Serialization(e.to_string()))
    }
}

/// One (exchange, symbol, interval) triple of the catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireCatalogEntry {
    #[serde(default)]
    pub stock_exchange: String,
    #[serde(default)]
    pub money: String,
    #[serde(default)]
    pub interval: String,
}

/// One bar inside a detection. Timestamps are text in a fixed format.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireCandle {
    #[serde(default)]
    pub money: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub open_time: String,
    #[serde(default)]
    pub close_time: String,
    #[serde(default)]
    pub open: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    #[serde(default)]
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub quote_asset_volume: f64,
}

/// One element of `DetectKLines`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireDetection {
    #[serde(default)]
    pub stock_exchange: String,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub history: Vec<WireCandle>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub review_history: Vec<WireCandle>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserializes a complete response body.
pub fn parse_response<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| ApiError::Deserialization(e.to_string()))
}

/// Deserializes one element of a raw array.
pub fn parse_element<T: DeserializeOwned>(value: &Value) -> Result<T, ApiError> {
    T::deserialize(value).map_err(|e| ApiError::InvalidData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_response_reads_session_and_filter() {
        let body = br#"{"Result":"OK","SessionID":42,"Filter":[{"StockExchange":"MEXC"}],"Message":""}"#;
        let response: LoginResponse = parse_response(body).unwrap();
        assert!(response.result.is_ok());
        assert_eq!(response.session_id, 42);
        assert_eq!(response.filter.len(), 1);
    }

    #[test]
    fn result_codes() {
        let logout: StatusResponse = parse_response(br#"{"Result":"LOGOUT"}"#).unwrap();
        assert_eq!(logout.result, ResultCode::Logout);

        let duplicate: StatusResponse =
            parse_response(br#"{"Result":"Duplicate","Message":"user exists"}"#).unwrap();
        assert_eq!(duplicate.result, ResultCode::Other("Duplicate".to_string()));
        assert_eq!(duplicate.message, "user exists");

        let missing: StatusResponse = parse_response(b"{}").unwrap();
        assert!(!missing.result.is_ok());
    }

    #[test]
    fn malformed_body_is_a_deserialization_error() {
        let err = parse_response::<StatusResponse>(b"<html>").unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn config_body_uses_wire_names() {
        let rules = vec![WireFilterRule {
            stock_exchange: "GATE".to_string(),
            money: "ALL".to_string(),
            interval: "1m".to_string(),
            delta: 5.0,
            volume: 1000.0,
        }];
        let body = ConfigRequest { filter: &rules }.to_body().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert_eq!(
            text,
            r#"{"Filter":[{"StockExchange":"GATE","Money":"ALL","Interval":"1m","Delta":5.0,"Volume":1000.0}]}"#
        );
    }

    #[test]
    fn null_arrays_read_as_empty() {
        let data: DataResponse = parse_response(
            br#"{"Result":"OK","DetectKLines":null,"UserMessages":null,"Message":""}"#,
        )
        .unwrap();
        assert!(data.detect_klines.is_empty());
        assert!(data.user_messages.is_empty());

        let login: LoginResponse = parse_response(br#"{"Result":"OK","Filter":null}"#).unwrap();
        assert!(login.filter.is_empty());

        let klines: KlinesResponse = parse_response(br#"{"Result":"OK","KLines":null}"#).unwrap();
        assert!(klines.klines.is_empty());

        let detection: WireDetection = parse_element(&serde_json::json!({
            "StockExchange": "MEXC",
            "History": [{"Money": "BTCUSDT", "Interval": "1m"}],
            "ReviewHistory": null
        }))
        .unwrap();
        assert_eq!(detection.history.len(), 1);
        assert!(detection.review_history.is_empty());
    }

    #[test]
    fn a_bad_user_message_does_not_reject_the_poll() {
        let data: DataResponse = parse_response(
            br#"{"Result":"OK","UserMessages":[{"Level":"INFO","Message":5},{"Level":"WARN","Message":"slow"}]}"#,
        )
        .unwrap();
        assert_eq!(data.user_messages.len(), 2);
        assert!(parse_element::<WireUserMessage>(&data.user_messages[0]).is_err());
        let good: WireUserMessage = parse_element(&data.user_messages[1]).unwrap();
        assert_eq!(good.message, "slow");
    }

    #[test]
    fn element_type_mismatch_is_invalid_data() {
        let value: Value = serde_json::json!({"Delta": "not a number"});
        let err = parse_element::<WireFilterRule>(&value).unwrap_err();
        assert!(matches!(err, ApiError::InvalidData(_)));
    }
}
