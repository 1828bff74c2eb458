//! Events that can occur on a mentorship request

use super::state::RequestStatus;

/// A mentor's decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Accept,
    Decline,
}

impl Event {
    /// Map a requested target status onto the decision that produces it.
    ///
    /// Returns `None` for `pending`: a request can never be moved back to, or
    /// re-entered into, the initial state.
    pub fn for_target(status: RequestStatus) -> Option<Self> {
        match status {
            RequestStatus::Accepted => Some(Self::Accept),
            RequestStatus::Declined => Some(Self::Decline),
            RequestStatus::Pending => None,
        }
    }

    pub fn target(self) -> RequestStatus {
        match self {
            Self::Accept => RequestStatus::Accepted,
            Self::Decline => RequestStatus::Declined,
        }
    }
}
