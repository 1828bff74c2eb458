//! Database module
//!
//! Persistence for users, mentorship requests, conversations and messages.
//! Both uniqueness invariants (one pending request per pair, one conversation
//! per pair) are enforced by indexes, not by find-then-insert.

mod schema;

pub use schema::*;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

const MAX_BUSY_ATTEMPTS: u32 = 3;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLUMNS: &str = "id, username, email, role, company, designation, industry, expertise, availability, created_at, updated_at";
const REQUEST_COLUMNS: &str = "id, student_id, mentor_id, message, status, created_at, updated_at";
const CONVERSATION_COLUMNS: &str = "id, participants, title, last_message, unread_count, mentorship_request_id, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_name, content, created_at";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[source] rusqlite::Error),
    #[error("Database busy after {attempts} attempts")]
    Busy { attempts: u32 },
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("User not found: {0}")]
    UserNotFound(UserId),
    #[error("Mentorship request not found: {0}")]
    RequestNotFound(RequestId),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),
    #[error("A user with username '{username}' or email '{email}' already exists")]
    DuplicateUser { username: String, email: String },
    #[error("A mentorship request from {student} to {mentor} is already pending")]
    PendingRequestExists { student: UserId, mentor: UserId },
    #[error("Mentorship request {id} is already {current}")]
    StatusChanged {
        id: RequestId,
        current: RequestStatus,
    },
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(idx, _, source) => {
                DbError::Corrupt(format!("column {idx}: {source}"))
            }
            other => DbError::Sqlite(other),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Which side of a mentorship request a user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestParty {
    Student,
    Mentor,
}

impl RequestParty {
    fn column(self) -> &'static str {
        match self {
            RequestParty::Student => "student_id",
            RequestParty::Mentor => "mentor_id",
        }
    }
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied transaction
        // behind (it rolls back on drop), so the connection is still usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` against the connection, retrying a bounded number of times
    /// while SQLite reports the database as busy or locked.
    ///
    /// Each attempt already waits out the connection's `busy_timeout` inside
    /// SQLite before failing, so retries are issued immediately.
    fn with_conn<T>(&self, mut op: impl FnMut(&mut Connection) -> DbResult<T>) -> DbResult<T> {
        let mut attempt = 1;
        loop {
            let result = {
                let mut conn = self.lock();
                op(&mut conn)
            };

            match result {
                Err(DbError::Sqlite(ref e)) if is_transient(e) => {
                    if attempt >= MAX_BUSY_ATTEMPTS {
                        tracing::error!(attempts = attempt, error = %e, "Database still busy, giving up");
                        return Err(DbError::Busy { attempts: attempt });
                    }
                    tracing::warn!(attempt, error = %e, "Database busy, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    // ==================== User Operations ====================

    /// Add a user to the directory
    pub fn insert_user(&self, new_user: &NewUser) -> DbResult<User> {
        let id = UserId::generate();
        let now = now();
        let expertise = serde_json::to_string(&new_user.expertise)
            .map_err(|e| DbError::Corrupt(e.to_string()))?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, role, company, designation, industry, expertise, availability, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    id.to_string(),
                    new_user.username,
                    new_user.email,
                    new_user.role.as_str(),
                    new_user.company,
                    new_user.designation,
                    new_user.industry,
                    expertise,
                    new_user.availability,
                    timestamp(&now),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::DuplicateUser {
                        username: new_user.username.clone(),
                        email: new_user.email.clone(),
                    }
                } else {
                    DbError::from(e)
                }
            })?;
            Ok(())
        })?;

        Ok(User {
            id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            role: new_user.role,
            company: new_user.company.clone(),
            designation: new_user.designation.clone(),
            industry: new_user.industry.clone(),
            expertise: new_user.expertise.clone(),
            availability: new_user.availability,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn find_user(&self, id: UserId) -> DbResult<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                parse_user_row,
            )
            .optional()
            .map_err(DbError::from)
        })
    }

    pub fn get_user(&self, id: UserId) -> DbResult<User> {
        self.find_user(id)?.ok_or(DbError::UserNotFound(id))
    }

    /// List alumni, optionally filtered by industry and availability
    pub fn list_mentors(&self, filter: &MentorFilter) -> DbResult<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE role = 'alumni'
                   AND (?1 IS NULL OR industry = ?1)
                   AND (?2 = 0 OR availability > 0)
                 ORDER BY username ASC"
            ))?;
            let rows = stmt.query_map(
                params![filter.industry, filter.available_only],
                parse_user_row,
            )?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
    }

    // ==================== Mentorship Request Operations ====================

    /// Insert a new pending request.
    ///
    /// Fails with [`DbError::PendingRequestExists`] when the pair already has a
    /// pending request; the partial unique index makes this race-free.
    pub fn insert_request(
        &self,
        student_id: UserId,
        mentor_id: UserId,
        message: Option<&str>,
    ) -> DbResult<MentorshipRequest> {
        let id = RequestId::generate();
        let now = now();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mentorship_requests (id, student_id, mentor_id, message, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
                params![
                    id.to_string(),
                    student_id.to_string(),
                    mentor_id.to_string(),
                    message,
                    timestamp(&now),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::PendingRequestExists {
                        student: student_id,
                        mentor: mentor_id,
                    }
                } else {
                    DbError::from(e)
                }
            })?;
            Ok(())
        })?;

        Ok(MentorshipRequest {
            id,
            student_id,
            mentor_id,
            message: message.map(String::from),
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_request(&self, id: RequestId) -> DbResult<MentorshipRequest> {
        self.with_conn(|conn| query_request(conn, id))
    }

    /// Move a request from `from` to `to`, only if it is still in `from`.
    ///
    /// Of two racing updates exactly one succeeds; the other gets
    /// [`DbError::StatusChanged`] carrying the status the winner wrote.
    pub fn update_request_status(
        &self,
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> DbResult<MentorshipRequest> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let request = update_status(&tx, id, from, to)?;
            tx.commit()?;
            Ok(request)
        })
    }

    /// Compare-and-set the status and provision the pair's conversation in one
    /// transaction.
    ///
    /// Either both are stored or neither is: a request is never left accepted
    /// without a conversation. Returns the updated request, the pair's
    /// conversation, and whether this call created it.
    pub fn update_request_status_with_conversation(
        &self,
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
        new_conversation: &NewConversation,
    ) -> DbResult<(MentorshipRequest, Conversation, bool)> {
        let conversation_id = ConversationId::generate();
        let participants = serde_json::to_string(&new_conversation.participants)
            .map_err(|e| DbError::Corrupt(e.to_string()))?;

        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let request = update_status(&tx, id, from, to)?;
            let (conversation, created) =
                insert_conversation(&tx, conversation_id, new_conversation, &participants)?;
            tx.commit()?;
            Ok((request, conversation, created))
        })
    }

    /// Requests where the user is on the given side, newest first
    pub fn list_requests(&self, party: RequestParty, user: UserId) -> DbResult<Vec<MentorshipRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM mentorship_requests
                 WHERE {} = ?1
                 ORDER BY created_at DESC, rowid DESC",
                party.column()
            ))?;
            let rows = stmt.query_map(params![user.to_string()], parse_request_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
    }

    /// Accepted requests whose pair has no conversation yet
    pub fn list_unprovisioned_requests(&self) -> DbResult<Vec<MentorshipRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM mentorship_requests r
                 WHERE r.status = 'accepted'
                   AND NOT EXISTS (
                       SELECT 1 FROM conversations c
                       WHERE c.participant_low = MIN(r.student_id, r.mentor_id)
                         AND c.participant_high = MAX(r.student_id, r.mentor_id)
                   )
                 ORDER BY r.created_at ASC"
            ))?;
            let rows = stmt.query_map([], parse_request_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
    }

    // ==================== Conversation Operations ====================

    pub fn find_conversation_by_pair(&self, pair: ParticipantPair) -> DbResult<Option<Conversation>> {
        self.with_conn(|conn| query_conversation_by_pair(conn, pair))
    }

    /// Insert a conversation unless the pair already has one.
    ///
    /// Returns the stored conversation and whether this call created it. The
    /// insert and the read happen in one transaction, so concurrent callers for
    /// the same pair all observe the same row.
    pub fn insert_conversation_if_absent(
        &self,
        new_conversation: &NewConversation,
    ) -> DbResult<(Conversation, bool)> {
        let id = ConversationId::generate();
        let participants = serde_json::to_string(&new_conversation.participants)
            .map_err(|e| DbError::Corrupt(e.to_string()))?;

        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = insert_conversation(&tx, id, new_conversation, &participants)?;
            tx.commit()?;
            Ok(result)
        })
    }

    pub fn get_conversation(&self, id: ConversationId) -> DbResult<Conversation> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Conversations the user takes part in, most recently updated first
    pub fn list_conversations_for_user(&self, user: UserId) -> DbResult<Vec<Conversation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE participant_low = ?1 OR participant_high = ?1
                 ORDER BY updated_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![user.to_string()], parse_conversation_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
    }

    /// Reset the unread counter
    pub fn mark_conversation_read(&self, id: ConversationId) -> DbResult<Conversation> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE conversations SET unread_count = 0 WHERE id = ?1",
                params![id.to_string()],
            )?;
            if updated == 0 {
                return Err(DbError::ConversationNotFound(id));
            }
            query_conversation(conn, id)
        })
    }

    // ==================== Message Operations ====================

    /// Append a message and update the conversation's denormalized summary
    pub fn add_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: &str,
        content: &str,
    ) -> DbResult<Message> {
        let id = MessageId::generate();
        let now = now();

        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let updated = tx.execute(
                "UPDATE conversations
                 SET last_message = ?1, unread_count = unread_count + 1, updated_at = ?2
                 WHERE id = ?3",
                params![content, timestamp(&now), conversation_id.to_string()],
            )?;
            if updated == 0 {
                return Err(DbError::ConversationNotFound(conversation_id));
            }

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, sender_name, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    sender_id.to_string(),
                    sender_name,
                    content,
                    timestamp(&now),
                ],
            )?;

            tx.commit()?;
            Ok(())
        })?;

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            sender_name: sender_name.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Messages of a conversation, oldest first
    pub fn get_messages(&self, conversation_id: ConversationId) -> DbResult<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![conversation_id.to_string()], parse_message_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
    }
}

// ==================== Queries shared with transactions ====================

/// Move a request from `from` to `to` only if it is still in `from`
fn update_status(
    conn: &Connection,
    id: RequestId,
    from: RequestStatus,
    to: RequestStatus,
) -> DbResult<MentorshipRequest> {
    let updated = conn.execute(
        "UPDATE mentorship_requests SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status = ?4",
        params![to.as_str(), timestamp(&now()), id.to_string(), from.as_str()],
    )?;

    let request = query_request(conn, id)?;
    if updated == 0 {
        return Err(DbError::StatusChanged {
            id,
            current: request.status,
        });
    }
    Ok(request)
}

/// Insert unless the pair already has a conversation, then read the pair's row
fn insert_conversation(
    conn: &Connection,
    id: ConversationId,
    new_conversation: &NewConversation,
    participants: &str,
) -> DbResult<(Conversation, bool)> {
    let pair = new_conversation.pair;
    let inserted = conn.execute(
        "INSERT INTO conversations (id, participant_low, participant_high, participants, title, last_message, unread_count, mentorship_request_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0, ?6, ?7, ?7)
         ON CONFLICT (participant_low, participant_high) DO NOTHING",
        params![
            id.to_string(),
            pair.low().to_string(),
            pair.high().to_string(),
            participants,
            new_conversation.title,
            new_conversation.mentorship_request_id.map(|r| r.to_string()),
            timestamp(&now()),
        ],
    )?;

    let conversation = query_conversation_by_pair(conn, pair)?.ok_or_else(|| {
        DbError::Corrupt(format!(
            "conversation for {} and {} vanished after insert",
            pair.low(),
            pair.high()
        ))
    })?;
    Ok((conversation, inserted == 1))
}

fn query_request(conn: &Connection, id: RequestId) -> DbResult<MentorshipRequest> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM mentorship_requests WHERE id = ?1"),
        params![id.to_string()],
        parse_request_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::RequestNotFound(id),
        other => DbError::from(other),
    })
}

fn query_conversation(conn: &Connection, id: ConversationId) -> DbResult<Conversation> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
        params![id.to_string()],
        parse_conversation_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::ConversationNotFound(id),
        other => DbError::from(other),
    })
}

fn query_conversation_by_pair(conn: &Connection, pair: ParticipantPair) -> DbResult<Option<Conversation>> {
    conn.query_row(
        &format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE participant_low = ?1 AND participant_high = ?2"
        ),
        params![pair.low().to_string(), pair.high().to_string()],
        parse_conversation_row,
    )
    .optional()
    .map_err(DbError::from)
}

// ==================== Row parsing ====================

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_column(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        role: parse_column(row, 3)?,
        company: row.get(4)?,
        designation: row.get(5)?,
        industry: row.get(6)?,
        expertise: parse_json(row, 7)?,
        availability: row.get(8)?,
        created_at: parse_time(row, 9)?,
        updated_at: parse_time(row, 10)?,
    })
}

fn parse_request_row(row: &Row<'_>) -> rusqlite::Result<MentorshipRequest> {
    Ok(MentorshipRequest {
        id: parse_column(row, 0)?,
        student_id: parse_column(row, 1)?,
        mentor_id: parse_column(row, 2)?,
        message: row.get(3)?,
        status: parse_column(row, 4)?,
        created_at: parse_time(row, 5)?,
        updated_at: parse_time(row, 6)?,
    })
}

fn parse_conversation_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let mentorship_request_id = row
        .get::<_, Option<String>>(5)?
        .map(|raw| raw.parse::<RequestId>().map_err(|e| conversion_error(5, &e)))
        .transpose()?;

    Ok(Conversation {
        id: parse_column(row, 0)?,
        participants: parse_json(row, 1)?,
        title: row.get(2)?,
        last_message: row.get(3)?,
        unread_count: row.get(4)?,
        mentorship_request_id,
        created_at: parse_time(row, 6)?,
        updated_at: parse_time(row, 7)?,
    })
}

fn parse_message_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: parse_column(row, 0)?,
        conversation_id: parse_column(row, 1)?,
        sender_id: parse_column(row, 2)?,
        sender_name: row.get(3)?,
        content: row.get(4)?,
        created_at: parse_time(row, 5)?,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: T::Err| conversion_error(idx, &e))
}

fn parse_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, &e))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, &e))
}

fn conversion_error(idx: usize, err: &dyn fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.to_string().into())
}

// ==================== Helpers ====================

/// Current time at the precision we store, so returned records equal re-read ones
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339, so lexical order on the column is time order
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
