//! Mentorship request state machine
//!
//! Pure transitions over `pending → accepted | declined`, returning the
//! effects the request manager must execute.

mod effect;
mod event;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::RequestStatus;
pub use transition::{transition, TransitionError};
