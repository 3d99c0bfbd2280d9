use crate::tracker::RequestKind;
use core_types::FilterRule;

/// A delayed request. `epoch` is the session epoch it was scheduled in; the
/// machine drops timers from an earlier epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub action: RequestKind,
    pub epoch: u64,
}

/// Instructions from the user side of the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the local filter and push it to the server.
    ReplaceFilter(Vec<FilterRule>),
    /// Push the current filter again.
    PushFilter,
    /// Stop the event loop.
    Shutdown,
}
