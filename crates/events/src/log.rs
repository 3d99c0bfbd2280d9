use crate::messages::{ClientEvent, LogLevel, LogMessage};

/// The ordered, append-only record of everything surfaced to the user.
///
/// Nothing is ever removed. Consumers that stream the log keep a cursor and
/// read the tail with [`EventLog::since`].
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Vec<ClientEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ClientEvent) {
        self.entries.push(event);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(ClientEvent::Log(LogMessage::new(LogLevel::Info, message)));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(ClientEvent::Log(LogMessage::new(LogLevel::Warn, message)));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(ClientEvent::Log(LogMessage::new(LogLevel::Error, message)));
    }

    /// Entries appended at or after `cursor`.
    pub fn since(&self, cursor: usize) -> &[ClientEvent] {
        self.entries.get(cursor..).unwrap_or(&[])
    }

    pub fn entries(&self) -> &[ClientEvent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The text of every `Log` entry, in order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|event| match event {
            ClientEvent::Log(log) => Some(log.message.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_append_order() {
        let mut log = EventLog::new();
        log.info("first");
        log.warn("second");
        log.error("third");

        let messages: Vec<_> = log.messages().collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(log.entries()[1].level(), LogLevel::Warn);
    }

    #[test]
    fn since_returns_the_unread_tail() {
        let mut log = EventLog::new();
        log.info("a");
        log.info("b");
        assert_eq!(log.since(1).len(), 1);
        assert!(log.since(2).is_empty());
        assert!(log.since(10).is_empty());
    }
}
