//! Compile-time topic descriptions

use std::fmt;

/// Small integer identifying a topic; indexes the registry table
pub type TopicId = u16;

/// Immutable description of one message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicMetadata {
    /// Unique topic name
    pub name: &'static str,
    /// Record size in bytes
    pub size: usize,
    /// `;`-separated `<type> <name>` field list
    pub fields: &'static str,
    /// Registry index of the topic
    pub id: TopicId,
}

impl TopicMetadata {
    /// Create topic metadata
    pub const fn new(name: &'static str, size: usize, fields: &'static str, id: TopicId) -> Self {
        Self {
            name,
            size,
            fields,
            id,
        }
    }

    /// Whether two descriptions refer to the same message type
    pub fn same_topic(&self, other: &TopicMetadata) -> bool {
        std::ptr::eq(self, other)
            || (self.id == other.id && self.size == other.size && self.name == other.name)
    }
}

impl fmt::Display for TopicMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id {}, {} bytes)", self.name, self.id, self.size)
    }
}
