use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Filter rule {exchange}/{symbol} has an unknown interval and cannot be sent")]
    UnknownInterval { exchange: String, symbol: String },
}
