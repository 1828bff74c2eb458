//! Conversation provisioning
//!
//! Guarantees a single conversation per unordered pair of users. Creation is
//! an insert-or-read against the pair's unique constraint, so repeated or
//! concurrent calls converge on the same row.

use crate::db::{Conversation, Database, NewConversation, Participant, ParticipantPair, RequestId, User, UserId};
use crate::directory::UserDirectory;
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;

/// Outcome of [`ConversationProvisioner::ensure_conversation`]
#[derive(Debug, Clone, PartialEq)]
pub enum Provisioned {
    Created(Conversation),
    Existing(Conversation),
}

impl Provisioned {
    pub fn conversation(&self) -> &Conversation {
        match self {
            Provisioned::Created(c) | Provisioned::Existing(c) => c,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Provisioned::Created(_))
    }
}

#[derive(Clone)]
pub struct ConversationProvisioner {
    db: Database,
    directory: Arc<dyn UserDirectory>,
}

impl ConversationProvisioner {
    pub fn new(db: Database, directory: Arc<dyn UserDirectory>) -> Self {
        Self { db, directory }
    }

    /// Return the pair's conversation, creating it if it does not exist yet.
    ///
    /// An existing conversation is returned untouched. A new one snapshots both
    /// users' display names and roles as they are now.
    pub async fn ensure_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
        origin: Option<RequestId>,
    ) -> CoreResult<Provisioned> {
        let pair = pair_of(user_a, user_b)?;
        if let Some(existing) = self.db.find_conversation_by_pair(pair)? {
            tracing::debug!(conversation_id = %existing.id, "Conversation already exists");
            return Ok(Provisioned::Existing(existing));
        }

        let new_conversation = self.prepare(user_a, user_b, origin).await?;
        let (conversation, created) = self.db.insert_conversation_if_absent(&new_conversation)?;
        if created {
            tracing::info!(
                conversation_id = %conversation.id,
                request_id = ?origin,
                "Created conversation"
            );
            Ok(Provisioned::Created(conversation))
        } else {
            // Lost the race to a concurrent caller; theirs is the conversation.
            tracing::info!(conversation_id = %conversation.id, "Conversation created concurrently, reusing");
            Ok(Provisioned::Existing(conversation))
        }
    }

    /// Resolve both users and build the conversation to insert.
    ///
    /// Reads only, so it can run before a status change is committed.
    pub async fn prepare(
        &self,
        user_a: UserId,
        user_b: UserId,
        origin: Option<RequestId>,
    ) -> CoreResult<NewConversation> {
        let pair = pair_of(user_a, user_b)?;
        let first = self.resolve(user_a).await?;
        let second = self.resolve(user_b).await?;

        Ok(NewConversation {
            pair,
            title: format!(
                "Mentorship: {} & {}",
                first.display_name(),
                second.display_name()
            ),
            participants: [Participant::from(&first), Participant::from(&second)],
            mentorship_request_id: origin,
        })
    }

    async fn resolve(&self, id: UserId) -> CoreResult<User> {
        self.directory
            .lookup(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("User not found: {id}")))
    }
}

fn pair_of(a: UserId, b: UserId) -> CoreResult<ParticipantPair> {
    ParticipantPair::new(a, b).ok_or_else(|| {
        CoreError::validation("participants", "a conversation needs two distinct users")
    })
}
