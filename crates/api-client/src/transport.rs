use std::fmt;
use tokio::task::AbortHandle;

/// Opaque identifier of one in-flight HTTP exchange.
///
/// Handles come from a [`HandleSequence`] and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(u64);

impl RequestHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic handle allocator, owned by a transport.
#[derive(Debug, Default)]
pub struct HandleSequence {
    last: u64,
}

impl HandleSequence {
    pub fn next(&mut self) -> RequestHandle {
        self.last += 1;
        RequestHandle(self.last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request as the session engine describes it. The method is implied by
/// the presence of a body.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> Method {
        match &self.body {
            Some(body) if !body.is_empty() => Method::Post,
            _ => Method::Get,
        }
    }
}

/// A connectivity or HTTP-status failure. `code` is the HTTP status, or 0
/// when no response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub code: u32,
    pub message: String,
}

impl TransportError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// The out-of-band result of one exchange.
#[derive(Debug)]
pub struct Completion {
    pub handle: RequestHandle,
    pub outcome: Result<Vec<u8>, TransportError>,
}

/// Ownership token for the work behind one in-flight request.
///
/// Dropping the guard releases the request: if its task is still running it
/// is aborted, so a discarded request can never complete later.
#[derive(Debug, Default)]
pub struct CallGuard {
    abort: Option<AbortHandle>,
}

impl CallGuard {
    /// A guard with nothing to release, for transports that do not spawn.
    pub fn detached() -> Self {
        Self { abort: None }
    }

    pub fn abort_on_drop(abort: AbortHandle) -> Self {
        Self { abort: Some(abort) }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

/// A request that has been handed to the transport.
#[derive(Debug)]
pub struct InFlight {
    pub handle: RequestHandle,
    pub guard: CallGuard,
}

/// The fire-and-forget HTTP primitive the session engine is written against.
pub trait Transport {
    /// Starts the exchange and returns immediately. The outcome arrives later
    /// as a [`Completion`] carrying the same handle.
    fn send(&mut self, request: HttpRequest) -> InFlight;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_never_reused() {
        let mut sequence = HandleSequence::default();
        let first = sequence.next();
        let second = sequence.next();
        assert_ne!(first, second);
        assert!(second > first);
        assert_eq!(first.to_string(), "#1");
    }

    #[test]
    fn method_follows_body_presence() {
        assert_eq!(HttpRequest::get("http://x/data/1").method(), Method::Get);
        assert_eq!(
            HttpRequest::post("http://x/config/1", b"{}".to_vec()).method(),
            Method::Post
        );
        assert_eq!(
            HttpRequest::post("http://x/config/1", Vec::new()).method(),
            Method::Get
        );
    }

    #[tokio::test]
    async fn dropping_the_guard_aborts_the_task() {
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        let guard = CallGuard::abort_on_drop(task.abort_handle());
        drop(guard);
        let joined = task.await;
        assert!(joined.unwrap_err().is_cancelled());
    }
}
