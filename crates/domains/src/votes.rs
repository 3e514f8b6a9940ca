//! Votes are not stored as entities; a vote is a user id's membership in
//! a target's `upvotes` or `downvotes` set.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::models::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Upvote,
    Downvote,
    /// Clears whatever the user had cast
    Remove,
}

impl fmt::Display for VoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
            Self::Remove => "remove",
        })
    }
}

impl FromStr for VoteAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(Self::Upvote),
            "downvote" => Ok(Self::Downvote),
            "remove" => Ok(Self::Remove),
            other => Err(DomainError::ValidationError(format!("invalid vote type: {other}"))),
        }
    }
}

/// Anything users can vote on. Implemented by `Fragment` and `Reply`.
pub trait Votable {
    /// Entity name used in error messages.
    const KIND: &'static str;

    fn target_id(&self) -> String;
    fn author_id(&self) -> UserId;
    fn is_tombstoned(&self) -> bool;
    fn upvotes(&self) -> &BTreeSet<UserId>;
    fn downvotes(&self) -> &BTreeSet<UserId>;
    fn upvotes_mut(&mut self) -> &mut BTreeSet<UserId>;
    fn downvotes_mut(&mut self) -> &mut BTreeSet<UserId>;

    fn vote_score(&self) -> i64 {
        self.upvotes().len() as i64 - self.downvotes().len() as i64
    }
}
