use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("API client error: {0}")]
    ApiClient(#[from] api_client::ApiError),

    #[error("Detection from '{0}' has an empty history.")]
    EmptyHistory(String),

    #[error("Stored credential unavailable: {0}")]
    Credentials(#[from] configuration::error::ConfigError),
    #[error("The session engine is no longer running.")]
    EngineStopped,
}
