use crate::models::chat::{ Message, MessageId, Role };
use super::ConversationError;

/// Ordered conversation log. Messages are appended or patched in place by
/// id, never reordered.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, mut message: Message) -> Result<(), ConversationError> {
        if self.find_by_id(message.id).is_some() {
            return Err(ConversationError::DuplicateId(message.id));
        }
        if let Some(last) = self.messages.last() {
            if message.created_at < last.created_at {
                message.created_at = last.created_at;
            }
        }
        self.messages.push(message);
        Ok(())
    }

    /// Patches the message with `id`. Returns `false` (and does nothing) when
    /// the message is gone, e.g. after a clear raced an async update.
    pub fn update_by_id<F>(&mut self, id: MessageId, patch: F) -> bool where F: FnOnce(&mut Message) {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                patch(message);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn find_by_id(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn find_latest_with_places(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.places.is_empty())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
