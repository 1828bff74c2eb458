//! Pure state transition function
//!
//! Given the same status and event it always yields the same result; the
//! manager is responsible for executing the returned effects.

use super::{Effect, Event, RequestStatus};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_status: RequestStatus,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(status: RequestStatus) -> Self {
        Self {
            new_status: status,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("request has already been {current}")]
    AlreadyDecided { current: RequestStatus },
}

pub fn transition(status: RequestStatus, event: Event) -> Result<TransitionResult, TransitionError> {
    // Terminal states reject every decision, including a repeat of the same one,
    // so a second accept can never re-run provisioning.
    if status.is_terminal() {
        return Err(TransitionError::AlreadyDecided { current: status });
    }

    let to = event.target();
    let result = TransitionResult::new(to).with_effect(Effect::PersistStatus { from: status, to });
    Ok(match event {
        Event::Accept => result.with_effect(Effect::ProvisionConversation),
        Event::Decline => result,
    })
}
