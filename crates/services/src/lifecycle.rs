//! # Fragment Lifecycle
//!
//! The status state machine. Everything here is pure: callers pass the
//! current state and the classifier verdict, and get back the next state
//! plus the notification the transition warrants.
//!
//! ```text
//!            publish                 rejected edit / admin
//!   draft ─────────────▶ published ─────────────────────▶ blocked
//!     ▲  ◀─────────────      │                               │
//!     │     unpublish        │        admin review           │
//!     │                      ◀───────────────────────────────┘
//!   create (approved / needs_review)
//! ```
//!
//! Deletion is orthogonal: the tombstone is set alongside `blocked` and
//! the service refuses every later transition.

use domains::{ContentStatus, DomainError, ModerationRecord, NotificationKind, Result, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: ContentStatus,
    pub notify: Option<NotificationKind>,
}

impl Transition {
    fn quiet(status: ContentStatus) -> Self {
        Self { status, notify: None }
    }

    fn announce(status: ContentStatus, kind: NotificationKind) -> Self {
        Self { status, notify: Some(kind) }
    }
}

/// Authors may ask for `draft` or `published`; `blocked` is moderation's.
pub fn check_requested(requested: ContentStatus) -> Result<()> {
    if requested == ContentStatus::Blocked {
        return Err(DomainError::InvalidTransition(
            "blocked can only be set by moderation".to_string(),
        ));
    }
    Ok(())
}

/// Initial status of a new fragment. A rejection overrides author intent;
/// anything short of approval holds a requested publication as a draft.
pub fn on_create(requested: ContentStatus, verdict: Verdict) -> Transition {
    match (verdict, requested) {
        (Verdict::Rejected, _) => Transition::quiet(ContentStatus::Blocked),
        (Verdict::Approved, ContentStatus::Published) => {
            Transition::announce(ContentStatus::Published, NotificationKind::NewFragment)
        }
        _ => Transition::quiet(ContentStatus::Draft),
    }
}

/// Status after an author edit. `verdict` is `None` when no moderated text
/// changed, in which case the status is kept and nobody is notified.
pub fn on_edit(current: ContentStatus, verdict: Option<Verdict>) -> Transition {
    match (current, verdict) {
        (_, None) => Transition::quiet(current),
        (_, Some(Verdict::Rejected)) => Transition::quiet(ContentStatus::Blocked),
        (ContentStatus::Published, Some(Verdict::Approved)) => {
            Transition::announce(ContentStatus::Published, NotificationKind::FragmentUpdated)
        }
        // needs_review on a published fragment stays up, flagged for triage
        (status, Some(_)) => Transition::quiet(status),
    }
}

/// Reply status after its author edits the text. Mirrors `on_edit`, except
/// that a reply held back for review goes live once the new text passes.
pub fn reply_status_after_edit(current: ContentStatus, verdict: Verdict) -> ContentStatus {
    match (current, verdict) {
        (_, Verdict::Rejected) => ContentStatus::Blocked,
        (ContentStatus::Draft, Verdict::Approved) => ContentStatus::Published,
        (status, _) => status,
    }
}

/// An explicit author request to move between `draft` and `published`.
pub fn request_status_change(
    current: ContentStatus,
    requested: ContentStatus,
    moderation: &ModerationRecord,
) -> Result<Transition> {
    check_requested(requested)?;
    if current == requested {
        return Err(DomainError::InvalidTransition(format!("fragment is already {current}")));
    }
    if current == ContentStatus::Blocked {
        return Err(DomainError::InvalidTransition(
            "fragment is blocked by moderation and awaits admin review".to_string(),
        ));
    }
    if requested == ContentStatus::Published && moderation.awaiting_review() {
        return Err(DomainError::InvalidTransition(
            "fragment awaits moderation review before it can be published".to_string(),
        ));
    }

    Ok(match requested {
        ContentStatus::Published => {
            Transition::announce(ContentStatus::Published, NotificationKind::NewFragment)
        }
        other => Transition::quiet(other),
    })
}

/// Soft deletion forces `blocked`.
pub fn on_delete() -> Transition {
    Transition::quiet(ContentStatus::Blocked)
}

/// Admin override after human review: publish or keep blocked.
pub fn on_admin_review(current: ContentStatus, decision: ContentStatus) -> Result<Transition> {
    match decision {
        ContentStatus::Draft => Err(DomainError::InvalidTransition(
            "review decision must be published or blocked".to_string(),
        )),
        ContentStatus::Published if current != ContentStatus::Published => Ok(
            Transition::announce(ContentStatus::Published, NotificationKind::NewFragment),
        ),
        decision => Ok(Transition::quiet(decision)),
    }
}
