use api_client::{CallGuard, InFlight, RequestHandle};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// The logical purpose of an HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    NewUser,
    Login,
    FetchCatalog,
    FetchData,
    PushConfig,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::NewUser => "NEW USER",
            RequestKind::Login => "LOGIN",
            RequestKind::FetchCatalog => "KLINES",
            RequestKind::FetchData => "DATA",
            RequestKind::PushConfig => "CONFIG",
        };
        f.write_str(name)
    }
}

/// One live entry. The guard keeps the transport's work alive; dropping the
/// entry releases it.
#[derive(Debug)]
struct TrackedRequest {
    kind: RequestKind,
    issued_at: Instant,
    _guard: CallGuard,
}

/// Correlates transport completions with the request that caused them.
///
/// Every handle is resolvable at most once. Resolving an unknown handle (a
/// duplicate, or a late completion for a request discarded by a forced
/// relogin) yields `None` and is otherwise harmless.
#[derive(Debug, Default)]
pub struct RequestTracker {
    live: HashMap<RequestHandle, TrackedRequest>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request that has just been handed to the transport.
    pub fn issue(&mut self, kind: RequestKind, in_flight: InFlight, now: Instant) -> RequestHandle {
        let InFlight { handle, guard } = in_flight;
        let entry = TrackedRequest {
            kind,
            issued_at: now,
            _guard: guard,
        };
        if let Some(previous) = self.live.insert(handle, entry) {
            tracing::error!(%handle, previous = %previous.kind, "Transport reused a live handle; the older request is dropped.");
        }
        handle
    }

    /// Removes the entry for `handle` and returns its kind.
    pub fn resolve(&mut self, handle: RequestHandle) -> Option<RequestKind> {
        match self.live.remove(&handle) {
            Some(entry) => Some(entry.kind),
            None => {
                tracing::warn!(%handle, "Completion for an unknown request; ignoring.");
                None
            }
        }
    }

    /// Drops every live entry, releasing its transport work. Returns how many
    /// were discarded.
    pub fn discard_all(&mut self) -> usize {
        let discarded = self.live.len();
        self.live.clear();
        discarded
    }

    /// Removes the entries issued more than `max_age` before `now`.
    pub fn evict_stale(&mut self, now: Instant, max_age: Duration) -> Vec<(RequestHandle, RequestKind)> {
        let stale: Vec<RequestHandle> = self
            .live
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.issued_at) > max_age)
            .map(|(handle, _)| *handle)
            .collect();

        let mut evicted: Vec<_> = stale
            .into_iter()
            .filter_map(|handle| self.live.remove(&handle).map(|entry| (handle, entry.kind)))
            .collect();
        evicted.sort_by_key(|(handle, _)| *handle);
        evicted
    }

    pub fn kind_of(&self, handle: RequestHandle) -> Option<RequestKind> {
        self.live.get(&handle).map(|entry| entry.kind)
    }

    /// Number of live requests of the given kind.
    pub fn pending(&self, kind: RequestKind) -> usize {
        self.live.values().filter(|entry| entry.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
