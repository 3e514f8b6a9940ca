//! # Vote Ledger
//!
//! One contract for every votable entity. A user holds at most one vote per
//! target: each call first clears the voter from both sets, then records the
//! new polarity.

use domains::{DomainError, Result, UserId, Votable, VoteAction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub up: usize,
    pub down: usize,
    /// Who to tell about the vote. `None` for removals and self-votes.
    pub notify_author: Option<UserId>,
}

pub fn apply_vote<V: Votable>(target: &mut V, voter: UserId, action: VoteAction) -> Result<VoteOutcome> {
    if target.is_tombstoned() {
        return Err(DomainError::NotFound(V::KIND, target.target_id()));
    }

    target.upvotes_mut().remove(&voter);
    target.downvotes_mut().remove(&voter);
    match action {
        VoteAction::Upvote => {
            target.upvotes_mut().insert(voter);
        }
        VoteAction::Downvote => {
            target.downvotes_mut().insert(voter);
        }
        VoteAction::Remove => {}
    }

    let author = target.author_id();
    let notify_author = (action != VoteAction::Remove && author != voter).then_some(author);

    Ok(VoteOutcome { up: target.upvotes().len(), down: target.downvotes().len(), notify_author })
}
