//! Messages within provisioned conversations

use crate::db::{Conversation, ConversationId, Database, Message, UserId};
use crate::error::{CoreError, CoreResult};

const MAX_CONTENT_CHARS: usize = 5000;

#[derive(Clone)]
pub struct Messenger {
    db: Database,
}

impl Messenger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Post a message as one of the conversation's participants.
    ///
    /// The sender's name comes from the participant snapshot, so it matches
    /// what the conversation shows.
    pub fn send(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
    ) -> CoreResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::validation("content", "must not be empty"));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(CoreError::validation(
                "content",
                format!("must be at most {MAX_CONTENT_CHARS} characters"),
            ));
        }

        let conversation = self.db.get_conversation(conversation_id)?;
        let sender = conversation.participant(sender_id).ok_or_else(|| {
            CoreError::validation("senderId", "sender is not a participant of this conversation")
        })?;

        let message = self
            .db
            .add_message(conversation_id, sender_id, &sender.name, content)?;
        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            "Message sent"
        );
        Ok(message)
    }

    /// Messages oldest first; an unknown conversation is an error, not an empty list
    pub fn list_messages(&self, conversation_id: ConversationId) -> CoreResult<Vec<Message>> {
        self.db.get_conversation(conversation_id)?;
        Ok(self.db.get_messages(conversation_id)?)
    }

    pub fn mark_read(&self, conversation_id: ConversationId) -> CoreResult<Conversation> {
        Ok(self.db.mark_conversation_read(conversation_id)?)
    }

    pub fn list_conversations(&self, user: UserId) -> CoreResult<Vec<Conversation>> {
        Ok(self.db.list_conversations_for_user(user)?)
    }
}
