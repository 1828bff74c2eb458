//! API request and response types
//!
//! Request bodies keep ids and enums as strings so they can be validated at the
//! edge with an error naming the offending field.

use serde::{Deserialize, Serialize};

/// Request to submit a mentorship request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMentorshipRequest {
    pub student_id: Option<String>,
    pub mentor_id: Option<String>,
    pub message: Option<String>,
}

/// Request to accept or decline a mentorship request
#[derive(Debug, Deserialize)]
pub struct UpdateMentorshipRequest {
    pub status: Option<String>,
}

/// Request to post a message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: Option<String>,
    pub sender_id: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorshipQuery {
    pub user_id: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MentorQuery {
    pub industry: Option<String>,
    pub available: Option<String>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            field: None,
        }
    }

    pub fn for_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            field: Some(field.into()),
        }
    }
}
