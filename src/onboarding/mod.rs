//! Client onboarding and approval workflow.
//!
//! A client carries two statuses: how far onboarding has progressed and
//! where the admin decision stands. [`apply`] is the only place that moves
//! them; persistence applies its result under the client's version counter.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{ApprovalStatus, OnboardingStatus};
use crate::permissions;

/// How long a confirmation link stays valid.
pub const CONFIRMATION_TTL_DAYS: i64 = 7;

pub fn confirmation_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(CONFIRMATION_TTL_DAYS)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingEvent {
    /// Email the client a confirmation link. Repeating it resends the link.
    SendConfirmation {
        token_hash: String,
        expires_at: DateTime<Utc>,
    },
    ClientConfirm,
    SubmitForReview,
    Approve,
    RequestChanges { reason: String },
    Reject { reason: String },
    Reopen,
}

impl OnboardingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendConfirmation { .. } => "SEND_CONFIRMATION",
            Self::ClientConfirm => "CLIENT_CONFIRM",
            Self::SubmitForReview => "SUBMIT_FOR_REVIEW",
            Self::Approve => "APPROVE",
            Self::RequestChanges { .. } => "REQUEST_CHANGES",
            Self::Reject { .. } => "REJECT",
            Self::Reopen => "REOPEN",
        }
    }

    /// Permission the acting user needs. The client's own confirmation
    /// arrives through a public link and needs none.
    pub fn required_permission(&self) -> Option<&'static str> {
        match self {
            Self::ClientConfirm => None,
            Self::SendConfirmation { .. } | Self::SubmitForReview => Some(permissions::CLIENTS_WRITE),
            Self::Approve | Self::RequestChanges { .. } | Self::Reject { .. } | Self::Reopen => {
                Some(permissions::CLIENTS_APPROVE)
            }
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::RequestChanges { reason } | Self::Reject { reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkflowState {
    pub onboarding: OnboardingStatus,
    pub approval: ApprovalStatus,
}

impl WorkflowState {
    pub fn new(onboarding: OnboardingStatus, approval: ApprovalStatus) -> Self {
        Self { onboarding, approval }
    }

    pub fn initial() -> Self {
        Self::new(OnboardingStatus::PendingValidation, ApprovalStatus::NotRequested)
    }

    /// Approval is APPROVED exactly when onboarding is, and likewise for REJECTED.
    pub fn is_consistent(&self) -> bool {
        let approved = self.onboarding == OnboardingStatus::Approved;
        let rejected = self.onboarding == OnboardingStatus::Rejected;
        approved == (self.approval == ApprovalStatus::Approved)
            && rejected == (self.approval == ApprovalStatus::Rejected)
    }
}

/// Facts the guards need that are not part of the status pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct Guards {
    /// The most recent validation run passed.
    pub validation_passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub event: &'static str,
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub reason: Option<String>,
}

fn invalid(event: &OnboardingEvent, state: WorkflowState) -> Error {
    Error::InvalidTransition {
        event: event.name(),
        onboarding: state.onboarding,
        approval: state.approval,
    }
}

/// Computes the state after `event`, or why it cannot be applied.
pub fn apply(state: WorkflowState, event: &OnboardingEvent, guards: Guards) -> Result<Transition> {
    use OnboardingStatus as O;

    if let Some(reason) = event.reason() {
        if reason.trim().is_empty() {
            return Err(Error::validation(format!("{} requires a reason", event.name())));
        }
    }

    let to = match (event, state.onboarding) {
        (OnboardingEvent::SendConfirmation { .. }, O::PendingValidation | O::EmailSent) => {
            if !guards.validation_passed {
                return Err(Error::validation(
                    "client identifiers must pass validation before a confirmation is sent",
                ));
            }
            WorkflowState::new(O::EmailSent, state.approval)
        }
        (OnboardingEvent::ClientConfirm, O::EmailSent) => WorkflowState::new(O::ClientConfirmed, state.approval),
        (OnboardingEvent::SubmitForReview, O::ClientConfirmed) => {
            WorkflowState::new(O::AdminReview, ApprovalStatus::Pending)
        }
        (OnboardingEvent::Approve, O::AdminReview) => WorkflowState::new(O::Approved, ApprovalStatus::Approved),
        (OnboardingEvent::RequestChanges { .. }, O::AdminReview) => {
            WorkflowState::new(O::PendingValidation, ApprovalStatus::ChangesRequested)
        }
        (OnboardingEvent::Reject { .. }, current) if !current.is_terminal() => {
            WorkflowState::new(O::Rejected, ApprovalStatus::Rejected)
        }
        (OnboardingEvent::Reopen, O::Rejected) => WorkflowState::initial(),
        _ => return Err(invalid(event, state)),
    };

    debug_assert!(to.is_consistent(), "{to:?}");
    Ok(Transition {
        event: event.name(),
        from: state,
        to,
        reason: event.reason().map(|r| r.trim().to_string()),
    })
}

/// State after a client's validated identifiers were edited.
///
/// Onboarding starts over unless it had not progressed yet; decided
/// clients keep their decision and must be reopened explicitly.
pub fn after_identifier_change(state: WorkflowState) -> Result<WorkflowState> {
    match state.onboarding {
        OnboardingStatus::PendingValidation => Ok(state),
        OnboardingStatus::EmailSent | OnboardingStatus::ClientConfirmed | OnboardingStatus::AdminReview => {
            let approval = match state.approval {
                ApprovalStatus::ChangesRequested => ApprovalStatus::ChangesRequested,
                _ => ApprovalStatus::NotRequested,
            };
            Ok(WorkflowState::new(OnboardingStatus::PendingValidation, approval))
        }
        OnboardingStatus::Approved | OnboardingStatus::Rejected => Err(Error::conflict(format!(
            "identifiers of a client in {} cannot be changed; reopen it first",
            state.onboarding
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use OnboardingStatus as O;

    fn passed() -> Guards {
        Guards { validation_passed: true }
    }

    fn send() -> OnboardingEvent {
        OnboardingEvent::SendConfirmation {
            token_hash: "abc".into(),
            expires_at: confirmation_expiry(Utc::now()),
        }
    }

    fn run(events: &[OnboardingEvent]) -> Result<WorkflowState> {
        let mut state = WorkflowState::initial();
        for event in events {
            state = apply(state, event, passed())?.to;
        }
        Ok(state)
    }

    #[test]
    fn happy_path_reaches_approved() {
        let state = run(&[
            send(),
            OnboardingEvent::ClientConfirm,
            OnboardingEvent::SubmitForReview,
            OnboardingEvent::Approve,
        ])
        .unwrap();
        assert_eq!(state, WorkflowState::new(O::Approved, ApprovalStatus::Approved));
    }

    #[test]
    fn submit_sets_approval_pending() {
        let state = run(&[send(), OnboardingEvent::ClientConfirm, OnboardingEvent::SubmitForReview]).unwrap();
        assert_eq!(state.onboarding, O::AdminReview);
        assert_eq!(state.approval, ApprovalStatus::Pending);
    }

    #[test]
    fn confirmation_requires_passed_validation() {
        let err = apply(WorkflowState::initial(), &send(), Guards::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn confirmation_can_be_resent() {
        let state = run(&[send(), send()]).unwrap();
        assert_eq!(state.onboarding, O::EmailSent);
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let err = run(&[OnboardingEvent::ClientConfirm]).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { event: "CLIENT_CONFIRM", .. }));
        assert!(run(&[send(), OnboardingEvent::Approve]).is_err());
        assert!(run(&[send(), OnboardingEvent::SubmitForReview]).is_err());
    }

    #[test]
    fn request_changes_sends_client_back() {
        let state = run(&[
            send(),
            OnboardingEvent::ClientConfirm,
            OnboardingEvent::SubmitForReview,
            OnboardingEvent::RequestChanges { reason: "IBAN belongs to someone else".into() },
        ])
        .unwrap();
        assert_eq!(state, WorkflowState::new(O::PendingValidation, ApprovalStatus::ChangesRequested));

        // and the flow can be completed afterwards
        let mut state = state;
        for event in [send(), OnboardingEvent::ClientConfirm, OnboardingEvent::SubmitForReview, OnboardingEvent::Approve] {
            state = apply(state, &event, passed()).unwrap().to;
        }
        assert_eq!(state.approval, ApprovalStatus::Approved);
    }

    #[test]
    fn reject_from_any_open_stage_and_reopen() {
        for prefix in [
            vec![],
            vec![send()],
            vec![send(), OnboardingEvent::ClientConfirm],
            vec![send(), OnboardingEvent::ClientConfirm, OnboardingEvent::SubmitForReview],
        ] {
            let mut events = prefix;
            events.push(OnboardingEvent::Reject { reason: "not a business".into() });
            let state = run(&events).unwrap();
            assert_eq!(state, WorkflowState::new(O::Rejected, ApprovalStatus::Rejected));
        }

        let reopened = run(&[OnboardingEvent::Reject { reason: "dup".into() }, OnboardingEvent::Reopen]).unwrap();
        assert_eq!(reopened, WorkflowState::initial());
    }

    #[test]
    fn terminal_states_refuse_further_decisions() {
        let approved = WorkflowState::new(O::Approved, ApprovalStatus::Approved);
        assert!(apply(approved, &OnboardingEvent::Reject { reason: "late".into() }, passed()).is_err());
        assert!(apply(approved, &OnboardingEvent::Reopen, passed()).is_err());
        assert!(apply(approved, &OnboardingEvent::Approve, passed()).is_err());
    }

    #[test]
    fn decisions_need_a_reason() {
        let review = WorkflowState::new(O::AdminReview, ApprovalStatus::Pending);
        let err = apply(review, &OnboardingEvent::Reject { reason: "  ".into() }, passed()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let t = apply(review, &OnboardingEvent::Reject { reason: " fraud ".into() }, passed()).unwrap();
        assert_eq!(t.reason.as_deref(), Some("fraud"));
        assert_eq!(t.from, review);
    }

    #[test]
    fn every_reachable_state_is_consistent() {
        let events = [
            send(),
            OnboardingEvent::ClientConfirm,
            OnboardingEvent::SubmitForReview,
            OnboardingEvent::Approve,
            OnboardingEvent::RequestChanges { reason: "x".into() },
            OnboardingEvent::Reject { reason: "x".into() },
            OnboardingEvent::Reopen,
        ];
        let mut seen = vec![WorkflowState::initial()];
        let mut frontier = seen.clone();
        while let Some(state) = frontier.pop() {
            for event in &events {
                if let Ok(t) = apply(state, event, passed()) {
                    assert!(t.to.is_consistent(), "{:?} via {}", t.to, t.event);
                    if !seen.contains(&t.to) {
                        seen.push(t.to);
                        frontier.push(t.to);
                    }
                }
            }
        }
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn identifier_changes_restart_open_onboarding() {
        let confirmed = WorkflowState::new(O::ClientConfirmed, ApprovalStatus::NotRequested);
        assert_eq!(after_identifier_change(confirmed).unwrap(), WorkflowState::initial());

        let reviewing = WorkflowState::new(O::AdminReview, ApprovalStatus::Pending);
        assert_eq!(after_identifier_change(reviewing).unwrap(), WorkflowState::initial());

        let approved = WorkflowState::new(O::Approved, ApprovalStatus::Approved);
        assert!(matches!(after_identifier_change(approved), Err(Error::Conflict(_))));
    }

    #[test]
    fn public_confirmation_needs_no_permission() {
        assert_eq!(OnboardingEvent::ClientConfirm.required_permission(), None);
        assert_eq!(OnboardingEvent::Reopen.required_permission(), Some(permissions::CLIENTS_APPROVE));
    }
}
