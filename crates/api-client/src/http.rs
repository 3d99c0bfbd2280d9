use crate::error::ApiError;
use crate::transport::{
    CallGuard, Completion, HandleSequence, HttpRequest, InFlight, Transport, TransportError,
};
use configuration::ServerConfig;
use std::time::Duration;
use tokio::sync::mpsc;

/// A `Transport` backed by `reqwest`.
///
/// Each request runs on its own tokio task. When it finishes, the task posts a
/// [`Completion`] into the channel given at construction; the receiving end is
/// drained by the session engine's event loop.
pub struct ReqwestTransport {
    client: reqwest::Client,
    handles: HandleSequence,
    completions: mpsc::UnboundedSender<Completion>,
}

impl ReqwestTransport {
    pub fn new(
        server: &ServerConfig,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(server.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            handles: HandleSequence::default(),
            completions,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&mut self, request: HttpRequest) -> InFlight {
        let handle = self.handles.next();
        let client = self.client.clone();
        let completions = self.completions.clone();

        tracing::debug!(%handle, method = ?request.method(), url = %request.url, "Sending request.");

        let task = tokio::spawn(async move {
            let outcome = execute(&client, request).await;
            if completions.send(Completion { handle, outcome }).is_err() {
                tracing::debug!(%handle, "Engine is gone; dropping completion.");
            }
        });

        InFlight {
            handle,
            guard: CallGuard::abort_on_drop(task.abort_handle()),
        }
    }
}

async fn execute(client: &reqwest::Client, request: HttpRequest) -> Result<Vec<u8>, TransportError> {
    let HttpRequest { url, headers, body } = request;

    let mut builder = match body {
        Some(body) if !body.is_empty() => client.post(&url).body(body),
        _ => client.get(&url),
    };
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await.map_err(|e| connection_error(&url, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::new(
            u32::from(status.as_u16()),
            format!("Error code: {} URL: {}", status.as_u16(), url),
        ));
    }

    let bytes = response.bytes().await.map_err(|e| connection_error(&url, e))?;
    Ok(bytes.to_vec())
}

fn connection_error(url: &str, error: reqwest::Error) -> TransportError {
    let code = error.status().map(|s| u32::from(s.as_u16())).unwrap_or(0);
    TransportError::new(code, format!("{error} URL: {url}"))
}
