//! Mentorship request manager
//!
//! Owns the request lifecycle: submission, the mentor's decision, and listing.
//! Decisions go through the pure [`transition`] function; this module runs the
//! effects it returns.

use crate::db::{Database, MentorshipRequest, RequestId, RequestParty, RequestStatus, Role, User, UserId};
use crate::directory::UserDirectory;
use crate::error::{CoreError, CoreResult};
use crate::provisioner::ConversationProvisioner;
use crate::state_machine::{transition, Effect, Event, TransitionError};
use std::sync::Arc;

const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Clone)]
pub struct RequestManager {
    db: Database,
    directory: Arc<dyn UserDirectory>,
    provisioner: ConversationProvisioner,
}

impl RequestManager {
    pub fn new(db: Database, directory: Arc<dyn UserDirectory>) -> Self {
        let provisioner = ConversationProvisioner::new(db.clone(), directory.clone());
        Self {
            db,
            directory,
            provisioner,
        }
    }

    /// Create a pending request from a student to an alumni mentor.
    ///
    /// Both ids must resolve to a user of the matching role, otherwise the
    /// reference is not found. One user therefore can never be both sides.
    pub async fn submit(
        &self,
        student_id: UserId,
        mentor_id: UserId,
        message: Option<&str>,
    ) -> CoreResult<MentorshipRequest> {
        let message = message.map(str::trim).filter(|m| !m.is_empty());
        if message.is_some_and(|m| m.chars().count() > MAX_MESSAGE_CHARS) {
            return Err(CoreError::validation(
                "message",
                format!("must be at most {MAX_MESSAGE_CHARS} characters"),
            ));
        }

        self.require_role(student_id, Role::Student).await?;
        self.require_role(mentor_id, Role::Alumni).await?;

        let request = self.db.insert_request(student_id, mentor_id, message)?;
        tracing::info!(
            request_id = %request.id,
            student_id = %student_id,
            mentor_id = %mentor_id,
            "Mentorship request submitted"
        );
        Ok(request)
    }

    /// Apply the mentor's decision.
    ///
    /// Only `accepted` and `declined` are valid targets, and only a pending
    /// request can move. Acceptance provisions the pair's conversation before
    /// returning.
    pub async fn transition(
        &self,
        id: RequestId,
        target: RequestStatus,
    ) -> CoreResult<MentorshipRequest> {
        let event = Event::for_target(target)
            .ok_or_else(|| CoreError::validation("status", "must be one of accepted, declined"))?;

        let request = self.db.get_request(id)?;
        let result = transition(request.status, event).map_err(|e| match e {
            TransitionError::AlreadyDecided { current } => {
                CoreError::Conflict(format!("Mentorship request {id} is already {current}"))
            }
        })?;

        // Participants are resolved before anything is written, so a failed
        // lookup leaves the request pending and the accept can be retried.
        let conversation = if result.effects.contains(&Effect::ProvisionConversation) {
            Some(
                self.provisioner
                    .prepare(request.student_id, request.mentor_id, Some(id))
                    .await?,
            )
        } else {
            None
        };

        let mut updated = request;
        for effect in result.effects {
            match effect {
                Effect::PersistStatus { from, to } => {
                    updated = match &conversation {
                        Some(new_conversation) => {
                            let (request, conversation, created) = self
                                .db
                                .update_request_status_with_conversation(id, from, to, new_conversation)?;
                            tracing::info!(
                                request_id = %id,
                                conversation_id = %conversation.id,
                                created,
                                "Provisioned conversation for accepted request"
                            );
                            request
                        }
                        None => self.db.update_request_status(id, from, to)?,
                    };
                }
                // Committed in the same transaction as the status
                Effect::ProvisionConversation => {}
            }
        }

        tracing::info!(request_id = %id, status = %updated.status, "Mentorship request decided");
        Ok(updated)
    }

    /// Requests the user sent (student) or received (alumni), newest first
    pub fn list_for_user(&self, user: UserId, role: Role) -> CoreResult<Vec<MentorshipRequest>> {
        let party = match role {
            Role::Student => RequestParty::Student,
            Role::Alumni => RequestParty::Mentor,
            Role::Admin => {
                return Err(CoreError::validation("role", "must be one of student, alumni"));
            }
        };
        Ok(self.db.list_requests(party, user)?)
    }

    /// Provision conversations for accepted requests that have none.
    ///
    /// Repairs rows written outside [`RequestManager::transition`], which
    /// stores both together. Returns the number of conversations created.
    pub async fn reconcile(&self) -> CoreResult<usize> {
        let mut created = 0;
        for request in self.db.list_unprovisioned_requests()? {
            let provisioned = self
                .provisioner
                .ensure_conversation(request.student_id, request.mentor_id, Some(request.id))
                .await?;
            if provisioned.was_created() {
                created += 1;
            }
        }
        if created > 0 {
            tracing::warn!(created, "Provisioned conversations for accepted requests missing one");
        }
        Ok(created)
    }

    async fn require_role(&self, id: UserId, role: Role) -> CoreResult<User> {
        match self.directory.lookup(id).await? {
            Some(user) if user.role == role => Ok(user),
            _ => Err(CoreError::NotFound(format!("No {role} with id {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, ParticipantPair};
    use crate::directory::testing::FlakyDirectory;
    use tokio::task::JoinSet;

    struct Fixture {
        db: Database,
        manager: RequestManager,
        student: User,
        mentor: User,
    }

    fn add_user(db: &Database, username: &str, role: Role) -> User {
        db.insert_user(&NewUser {
            username: username.to_string(),
            email: format!("{username}@example.org"),
            role,
            company: None,
            designation: None,
            industry: None,
            expertise: vec![],
            availability: 1,
        })
        .unwrap()
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let manager = RequestManager::new(db.clone(), Arc::new(db.clone()));
        let student = add_user(&db, "sam", Role::Student);
        let mentor = add_user(&db, "ada", Role::Alumni);
        Fixture {
            db,
            manager,
            student,
            mentor,
        }
    }

    fn conversation_count(f: &Fixture) -> usize {
        let pair = ParticipantPair::new(f.student.id, f.mentor.id).unwrap();
        usize::from(f.db.find_conversation_by_pair(pair).unwrap().is_some())
    }

    #[tokio::test]
    async fn test_submit_creates_pending_request() {
        let f = fixture();
        let request = f
            .manager
            .submit(f.student.id, f.mentor.id, Some("  career advice "))
            .await
            .unwrap();

        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.message.as_deref(), Some("career advice"));
        assert_eq!(request.created_at, request.updated_at);
        assert_eq!(f.db.get_request(request.id).unwrap(), request);
    }

    #[tokio::test]
    async fn test_blank_message_is_dropped() {
        let f = fixture();
        let request = f.manager.submit(f.student.id, f.mentor.id, Some("   ")).await.unwrap();
        assert_eq!(request.message, None);
    }

    #[tokio::test]
    async fn test_overlong_message_is_invalid() {
        let f = fixture();
        let message = "x".repeat(MAX_MESSAGE_CHARS + 1);
        let err = f
            .manager
            .submit(f.student.id, f.mentor.id, Some(&message))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "message", .. }));
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_or_miscast_users() {
        let f = fixture();

        let err = f
            .manager
            .submit(UserId::generate(), f.mentor.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        // Roles swapped: the mentor is not a student
        let err = f
            .manager
            .submit(f.mentor.id, f.student.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        // The same user cannot be both the student and the alumni
        let err = f
            .manager
            .submit(f.student.id, f.student.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_pending_conflicts_until_decided() {
        let f = fixture();
        let first = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();

        let err = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap_err();
        assert!(matches!(&err, CoreError::Conflict(msg) if msg.contains("already pending")));

        f.manager
            .transition(first.id, RequestStatus::Accepted)
            .await
            .unwrap();
        f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_provisions_exactly_one_conversation() {
        let f = fixture();
        let request = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();

        let accepted = f
            .manager
            .transition(request.id, RequestStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);

        let conversations = f.db.list_conversations_for_user(f.student.id).unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].mentorship_request_id, Some(request.id));
        assert_eq!(conversations[0].title, "Mentorship: sam & ada");
    }

    #[tokio::test]
    async fn test_decline_never_provisions() {
        let f = fixture();
        let request = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();

        let declined = f
            .manager
            .transition(request.id, RequestStatus::Declined)
            .await
            .unwrap();
        assert_eq!(declined.status, RequestStatus::Declined);
        assert_eq!(conversation_count(&f), 0);
    }

    #[tokio::test]
    async fn test_terminal_request_rejects_transition_with_current_status() {
        let f = fixture();
        let request = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();
        f.manager
            .transition(request.id, RequestStatus::Declined)
            .await
            .unwrap();

        let err = f
            .manager
            .transition(request.id, RequestStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(&err, CoreError::Conflict(msg) if msg.contains("already declined")));
        assert_eq!(f.db.get_request(request.id).unwrap().status, RequestStatus::Declined);
        assert_eq!(conversation_count(&f), 0);
    }

    #[tokio::test]
    async fn test_pending_target_is_invalid() {
        let f = fixture();
        let request = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();

        let err = f
            .manager
            .transition(request.id, RequestStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "status", .. }));
    }

    #[tokio::test]
    async fn test_unknown_request_is_not_found() {
        let f = fixture();
        let err = f
            .manager
            .transition(RequestId::generate(), RequestStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_decline_resubmit_accept_scenario() {
        let f = fixture();

        let r1 = f
            .manager
            .submit(f.student.id, f.mentor.id, Some("career advice"))
            .await
            .unwrap();
        f.manager.transition(r1.id, RequestStatus::Declined).await.unwrap();
        assert_eq!(conversation_count(&f), 0);

        let r2 = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();
        f.manager.transition(r2.id, RequestStatus::Accepted).await.unwrap();

        let conversations = f.db.list_conversations_for_user(f.student.id).unwrap();
        assert_eq!(conversations.len(), 1);
        let conv = &conversations[0];
        assert!(conv.participant(f.student.id).is_some());
        assert!(conv.participant(f.mentor.id).is_some());

        // A later accepted request for the same pair reuses the conversation
        let r3 = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();
        f.manager.transition(r3.id, RequestStatus::Accepted).await.unwrap();
        let again = f.db.list_conversations_for_user(f.student.id).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].mentorship_request_id, Some(r2.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_provision_once() {
        let f = fixture();
        let request = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let manager = f.manager.clone();
            let id = request.id;
            tasks.spawn(async move { manager.transition(id, RequestStatus::Accepted).await });
        }

        let mut succeeded = 0;
        let mut conflicts = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(r) => {
                    assert_eq!(r.status, RequestStatus::Accepted);
                    succeeded += 1;
                }
                Err(CoreError::Conflict(msg)) => {
                    assert!(msg.contains("already accepted"));
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(f.db.list_conversations_for_user(f.mentor.id).unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_leave_one_pending() {
        let f = fixture();

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let manager = f.manager.clone();
            let (student, mentor) = (f.student.id, f.mentor.id);
            tasks.spawn(async move { manager.submit(student, mentor, None).await });
        }

        let mut succeeded = 0;
        let mut conflicts = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(r) => {
                    assert_eq!(r.status, RequestStatus::Pending);
                    succeeded += 1;
                }
                Err(CoreError::Conflict(msg)) => {
                    assert!(msg.contains("already pending"));
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(conflicts, 7);
        let stored = f.manager.list_for_user(f.student.id, Role::Student).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_participant_lookup_leaves_request_pending() {
        let f = fixture();
        let directory = Arc::new(FlakyDirectory::new(f.db.clone(), 2));
        let manager = RequestManager::new(f.db.clone(), directory.clone());

        // The two submit lookups succeed, every later one fails
        let request = manager.submit(f.student.id, f.mentor.id, None).await.unwrap();
        let err = manager
            .transition(request.id, RequestStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
        assert_eq!(f.db.get_request(request.id).unwrap().status, RequestStatus::Pending);
        assert_eq!(conversation_count(&f), 0);

        directory.recover();
        let accepted = manager
            .transition(request.id, RequestStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert_eq!(conversation_count(&f), 1);
    }

    #[tokio::test]
    async fn test_list_for_user_newest_first() {
        let f = fixture();
        let other_mentor = add_user(&f.db, "grace", Role::Alumni);
        let third_mentor = add_user(&f.db, "linus", Role::Alumni);

        let t1 = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();
        let t2 = f.manager.submit(f.student.id, other_mentor.id, None).await.unwrap();
        let t3 = f.manager.submit(f.student.id, third_mentor.id, None).await.unwrap();

        let ids: Vec<_> = f
            .manager
            .list_for_user(f.student.id, Role::Student)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![t3.id, t2.id, t1.id]);

        let received = f.manager.list_for_user(f.mentor.id, Role::Alumni).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, t1.id);

        assert!(f
            .manager
            .list_for_user(UserId::generate(), Role::Student)
            .unwrap()
            .is_empty());
        assert!(matches!(
            f.manager.list_for_user(f.student.id, Role::Admin),
            Err(CoreError::Validation { field: "role", .. })
        ));
    }

    #[tokio::test]
    async fn test_reconcile_provisions_missing_conversations() {
        let f = fixture();
        let request = f.manager.submit(f.student.id, f.mentor.id, None).await.unwrap();
        // Simulate a crash after the status write but before provisioning
        f.db.update_request_status(request.id, RequestStatus::Pending, RequestStatus::Accepted)
            .unwrap();
        assert_eq!(conversation_count(&f), 0);

        assert_eq!(f.manager.reconcile().await.unwrap(), 1);
        assert_eq!(conversation_count(&f), 1);
        assert_eq!(f.manager.reconcile().await.unwrap(), 0);
    }
}
