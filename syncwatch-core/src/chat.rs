use std::collections::VecDeque;

use crate::{normalize_text, ConnectionId, CoordinatorError, Id, Result, Timestamp};

pub type ChatMessageId = Id<ChatMessage>;

/// A chat message. Never changes once it has been posted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: ChatMessageId,
    pub author: String,
    pub connection: ConnectionId,
    pub text: String,
    pub sent_at: Timestamp,
}

/// An append-only chat history that forgets the oldest messages past its retention.
#[derive(Debug)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    retention: usize,
}

impl ChatMessage {
    /// Creates a message, rejecting empty text or text longer than `max_length` characters.
    pub fn new(
        author: String,
        connection: ConnectionId,
        text: &str,
        max_length: usize,
        now: Timestamp,
    ) -> Result<Self> {
        let text = normalize_text(text, max_length).ok_or_else(|| {
            CoordinatorError::invalid(format!(
                "chat message must be between 1 and {max_length} characters"
            ))
        })?;

        Ok(Self {
            id: ChatMessageId::new(),
            author,
            connection,
            text,
            sent_at: now,
        })
    }
}

impl ChatLog {
    pub fn new(retention: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(retention.min(64)),
            retention,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);

        while self.messages.len() > self.retention {
            self.messages.pop_front();
        }
    }

    /// Returns up to `limit` of the most recent messages, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::{ChatLog, ChatMessage};
    use crate::ConnectionId;

    fn message(text: &str) -> ChatMessage {
        ChatMessage::new("Alice".into(), ConnectionId::new(), text, 100, Utc::now()).unwrap()
    }

    #[test]
    fn oldest_messages_are_evicted() {
        let mut log = ChatLog::new(3);

        for text in ["one", "two", "three", "four"] {
            log.push(message(text));
        }

        let texts: Vec<_> = log.recent(10).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["two", "three", "four"]);
    }

    #[test]
    fn recent_returns_the_tail_in_order() {
        let mut log = ChatLog::new(10);

        for text in ["one", "two", "three"] {
            log.push(message(text));
        }

        let texts: Vec<_> = log.recent(2).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn blank_or_long_text_is_rejected() {
        let now = Utc::now();
        let connection = ConnectionId::new();

        assert!(ChatMessage::new("Alice".into(), connection, "   ", 10, now).is_err());
        assert!(ChatMessage::new("Alice".into(), connection, "hello world!", 10, now).is_err());
        assert_eq!(
            ChatMessage::new("Alice".into(), connection, " hi ", 10, now)
                .unwrap()
                .text,
            "hi"
        );
    }
}
