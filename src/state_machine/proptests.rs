//! Property-based tests for the request state machine
//!
//! These tests verify key invariants hold across all possible event sequences.

use super::transition::*;
use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![Just(Event::Accept), Just(Event::Decline)]
}

fn arb_status() -> impl Strategy<Value = RequestStatus> {
    prop_oneof![
        Just(RequestStatus::Pending),
        Just(RequestStatus::Accepted),
        Just(RequestStatus::Declined),
    ]
}

/// Replay events from `pending`, keeping failed transitions as no-ops.
fn replay(events: &[Event]) -> (Vec<RequestStatus>, usize) {
    let mut status = RequestStatus::Pending;
    let mut history = vec![status];
    let mut provisions = 0;

    for event in events {
        if let Ok(result) = transition(status, *event) {
            provisions += result
                .effects
                .iter()
                .filter(|e| matches!(e, Effect::ProvisionConversation))
                .count();
            status = result.new_status;
            history.push(status);
        }
    }

    (history, provisions)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Status moves at most once, and only out of pending.
    #[test]
    fn prop_status_changes_at_most_once(events in proptest::collection::vec(arb_event(), 0..20)) {
        let (history, _) = replay(&events);

        prop_assert!(history.len() <= 2);
        prop_assert_eq!(history[0], RequestStatus::Pending);
        if let Some(last) = history.get(1) {
            prop_assert!(last.is_terminal());
        }
    }

    /// Terminal states reject every event and never produce effects.
    #[test]
    fn prop_terminal_states_are_closed(status in arb_status(), event in arb_event()) {
        let result = transition(status, event);
        if status.is_terminal() {
            prop_assert_eq!(result, Err(TransitionError::AlreadyDecided { current: status }));
        } else {
            let result = result.unwrap();
            prop_assert_ne!(result.new_status, RequestStatus::Pending);
            prop_assert_eq!(result.new_status, event.target());
        }
    }

    /// Provisioning happens exactly once if the first event is an accept, never otherwise.
    #[test]
    fn prop_provisioning_only_on_first_accept(events in proptest::collection::vec(arb_event(), 1..20)) {
        let (_, provisions) = replay(&events);
        let expected = usize::from(events[0] == Event::Accept);
        prop_assert_eq!(provisions, expected);
    }

    /// Every successful transition persists the status before any other effect.
    #[test]
    fn prop_persist_comes_first(event in arb_event()) {
        let result = transition(RequestStatus::Pending, event).unwrap();
        prop_assert_eq!(
            result.effects.first().copied(),
            Some(Effect::PersistStatus { from: RequestStatus::Pending, to: event.target() })
        );
    }
}

#[test]
fn test_pending_is_never_a_target() {
    assert_eq!(Event::for_target(RequestStatus::Pending), None);
    assert_eq!(Event::for_target(RequestStatus::Accepted), Some(Event::Accept));
    assert_eq!(Event::for_target(RequestStatus::Declined), Some(Event::Decline));
}
