//! Bounded per-session chat log.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use skirmish_protocol::ChatEntry;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A capped chat log. Oldest entries drop out first.
#[derive(Debug, Clone)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    capacity: usize,
    text_limit: usize,
}

impl ChatLog {
    pub fn new(capacity: usize, text_limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            text_limit,
        }
    }

    /// Appends a server-generated entry and returns it.
    pub fn push_system(&mut self, text: impl Into<String>) -> ChatEntry {
        self.push(ChatEntry::system(text, now_millis()))
    }

    /// Appends a member's message, truncated to the text limit (counted in
    /// characters), and returns the stored entry.
    pub fn push_player(&mut self, sender: &str, text: &str) -> ChatEntry {
        let text: String = text.chars().take(self.text_limit).collect();
        self.push(ChatEntry::player(sender, text, now_millis()))
    }

    /// The last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<ChatEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: ChatEntry) -> ChatEntry {
        if self.capacity == 0 {
            return entry;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_player_truncates_text_by_chars() {
        let mut log = ChatLog::new(100, 200);
        let long = "ü".repeat(250);

        let entry = log.push_player("Ana", &long);

        assert_eq!(entry.text.chars().count(), 200);
        assert_eq!(entry.sender.as_deref(), Some("Ana"));
        assert!(!entry.is_system);
    }

    #[test]
    fn test_push_system_has_no_sender() {
        let mut log = ChatLog::new(100, 200);
        let entry = log.push_system("Ana joined the lobby");
        assert!(entry.is_system);
        assert_eq!(entry.sender, None);
        assert!(entry.timestamp > 0);
    }

    #[test]
    fn test_capacity_drops_oldest_first() {
        let mut log = ChatLog::new(100, 200);
        for i in 0..105 {
            log.push_player("Ana", &format!("msg {i}"));
        }

        assert_eq!(log.len(), 100);
        let all = log.tail(100);
        assert_eq!(all.first().unwrap().text, "msg 5");
        assert_eq!(all.last().unwrap().text, "msg 104");
    }

    #[test]
    fn test_tail_returns_most_recent_in_order() {
        let mut log = ChatLog::new(100, 200);
        for i in 0..60 {
            log.push_player("Bo", &format!("{i}"));
        }

        let tail = log.tail(50);

        assert_eq!(tail.len(), 50);
        assert_eq!(tail[0].text, "10");
        assert_eq!(tail[49].text, "59");
    }

    #[test]
    fn test_tail_shorter_log_returns_everything() {
        let mut log = ChatLog::new(100, 200);
        log.push_system("hi");
        assert_eq!(log.tail(50).len(), 1);
    }
}
