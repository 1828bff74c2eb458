//! Effects produced by state transitions

use super::state::RequestStatus;

/// Effects to be executed, in order, after a successful transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Compare-and-set the stored status from `from` to `to`
    PersistStatus {
        from: RequestStatus,
        to: RequestStatus,
    },

    /// Ensure a conversation exists between the student and the mentor
    ProvisionConversation,
}
