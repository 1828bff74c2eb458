//! Database schema and types

pub use crate::state_machine::RequestStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL,
    company TEXT,
    designation TEXT,
    industry TEXT,
    expertise TEXT NOT NULL DEFAULT '[]',
    availability INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users(role, username);

CREATE TABLE IF NOT EXISTS mentorship_requests (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    mentor_id TEXT NOT NULL,
    message TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (student_id) REFERENCES users(id),
    FOREIGN KEY (mentor_id) REFERENCES users(id)
);

-- At most one pending request per (student, mentor) pair
CREATE UNIQUE INDEX IF NOT EXISTS idx_requests_one_pending
    ON mentorship_requests(student_id, mentor_id) WHERE status = 'pending';
CREATE INDEX IF NOT EXISTS idx_requests_student ON mentorship_requests(student_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_requests_mentor ON mentorship_requests(mentor_id, created_at DESC);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    participant_low TEXT NOT NULL,
    participant_high TEXT NOT NULL,
    participants TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    last_message TEXT,
    unread_count INTEGER NOT NULL DEFAULT 0,
    mentorship_request_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE (participant_low, participant_high),
    CHECK (participant_low < participant_high),
    FOREIGN KEY (mentorship_request_id) REFERENCES mentorship_requests(id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_high ON conversations(participant_high);
CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
";

// ============================================================
// Identifiers
// ============================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Hyphenated lower-case: the stored form, so text comparison is stable
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }
    };
}

id_type!(
    /// Canonical user identifier
    UserId
);
id_type!(
    /// Canonical mentorship request identifier
    RequestId
);
id_type!(
    /// Canonical conversation identifier
    ConversationId
);
id_type!(
    /// Canonical message identifier
    MessageId
);

/// Unordered pair of distinct users, stored sorted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    /// Returns `None` when both ids are the same user.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }
}

// ============================================================
// Users
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Alumni,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Alumni => "alumni",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "student" => Ok(Role::Student),
            "alumni" => Ok(Role::Alumni),
            "admin" => Ok(Role::Admin),
            other => Err(format!(
                "unknown role '{other}' (expected one of student, alumni, admin)"
            )),
        }
    }
}

/// User record, owned by the directory and read-only to the mentorship core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub company: Option<String>,
    pub designation: Option<String>,
    pub industry: Option<String>,
    pub expertise: Vec<String>,
    pub availability: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Username, or the local part of the email when the username is blank
    pub fn display_name(&self) -> String {
        let name = self.username.trim();
        if name.is_empty() {
            self.email.split('@').next().unwrap_or_default().to_string()
        } else {
            name.to_string()
        }
    }
}

/// Validated input for a new directory entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub company: Option<String>,
    pub designation: Option<String>,
    pub industry: Option<String>,
    pub expertise: Vec<String>,
    pub availability: u32,
}

/// Filters for mentor search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentorFilter {
    pub industry: Option<String>,
    pub available_only: bool,
}

// ============================================================
// Mentorship requests
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorshipRequest {
    pub id: RequestId,
    pub student_id: UserId,
    pub mentor_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================
// Conversations
// ============================================================

/// Participant snapshot taken when the conversation is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
}

impl From<&User> for Participant {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            name: user.display_name(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: [Participant; 2],
    pub title: String,
    pub last_message: Option<String>,
    pub unread_count: u32,
    pub mentorship_request_id: Option<RequestId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn participant(&self, user: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user)
    }
}

/// Input for conversation creation
#[derive(Debug, Clone, PartialEq)]
pub struct NewConversation {
    pub pair: ParticipantPair,
    pub participants: [Participant; 2],
    pub title: String,
    pub mentorship_request_id: Option<RequestId>,
}

// ============================================================
// Messages
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
