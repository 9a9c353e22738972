use super::types::{ConversationEntry, SenderKind};

/// Ordered conversation log owned by the turn coordinator.
///
/// Only the coordinator writes to it, so it carries no lock.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ConversationEntry) -> &ConversationEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Replace the whole log with a snapshot from the server.
    pub fn replace(&mut self, entries: Vec<ConversationEntry>) {
        self.entries = entries;
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ConversationEntry> {
        self.entries.last()
    }

    pub fn count_of(&self, sender: SenderKind) -> usize {
        self.entries.iter().filter(|e| e.sender == sender).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
