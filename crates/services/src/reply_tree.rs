//! # Reply Tree
//!
//! Locating and mutating replies anywhere in a fragment's forest.
//!
//! Callers address replies by id only, never by path. Every lookup is a
//! pre-order depth-first search that stops at the first match and never
//! descends into a tombstoned node, so a deleted subtree is invisible to
//! all operations here. Depth is counted from the fragment: a top-level
//! reply sits at depth 1.

use chrono::{DateTime, Utc};
use domains::{Actor, ContentStatus, DomainError, Reply, ReplyId, Result, UserId};

/// Replies may nest this many levels below the fragment, no deeper.
pub const MAX_REPLY_DEPTH: usize = 3;

/// Result of a successful insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub reply_id: ReplyId,
    pub depth: usize,
    /// Author of the reply we answered, `None` for top-level replies.
    pub parent_author: Option<UserId>,
}

/// A reply seen from the admin listing: where it sits in the forest.
#[derive(Debug, Clone, Copy)]
pub struct FlatReply<'a> {
    pub reply: &'a Reply,
    pub depth: usize,
    pub parent_id: Option<ReplyId>,
}

pub fn find(forest: &[Reply], id: ReplyId) -> Option<(&Reply, usize)> {
    find_at(forest, id, 1)
}

fn find_at(forest: &[Reply], id: ReplyId, depth: usize) -> Option<(&Reply, usize)> {
    for reply in forest.iter().filter(|r| r.is_live()) {
        if reply.id == id {
            return Some((reply, depth));
        }
        if let Some(found) = find_at(&reply.replies, id, depth + 1) {
            return Some(found);
        }
    }
    None
}

pub fn find_mut(forest: &mut [Reply], id: ReplyId) -> Option<(&mut Reply, usize)> {
    find_mut_at(forest, id, 1)
}

fn find_mut_at(forest: &mut [Reply], id: ReplyId, depth: usize) -> Option<(&mut Reply, usize)> {
    for reply in forest.iter_mut() {
        if reply.is_deleted {
            continue;
        }
        if reply.id == id {
            return Some((reply, depth));
        }
        if let Some(found) = find_mut_at(&mut reply.replies, id, depth + 1) {
            return Some(found);
        }
    }
    None
}

/// Attaches `reply` under `parent`, or at the root when `parent` is `None`.
///
/// Fails with `NotFound` if the parent does not resolve to a live node and
/// with `DepthExceeded` if the new node would sit below `MAX_REPLY_DEPTH`.
/// The forest is untouched on failure.
pub fn insert(
    forest: &mut Vec<Reply>,
    reply: Reply,
    parent: Option<ReplyId>,
) -> Result<InsertOutcome> {
    let reply_id = reply.id;

    let Some(parent_id) = parent else {
        forest.push(reply);
        return Ok(InsertOutcome { reply_id, depth: 1, parent_author: None });
    };

    let (parent, depth) =
        find_mut(forest, parent_id).ok_or_else(|| DomainError::reply_not_found(parent_id))?;
    if depth + 1 > MAX_REPLY_DEPTH {
        return Err(DomainError::DepthExceeded { max: MAX_REPLY_DEPTH });
    }

    let parent_author = parent.author;
    parent.replies.push(reply);
    Ok(InsertOutcome { reply_id, depth: depth + 1, parent_author: Some(parent_author) })
}

/// Replaces the content of a live reply. Children and votes are kept.
pub fn edit<'a>(
    forest: &'a mut [Reply],
    id: ReplyId,
    content: &str,
    now: DateTime<Utc>,
) -> Result<&'a mut Reply> {
    let (reply, _) = find_mut(forest, id).ok_or_else(|| DomainError::reply_not_found(id))?;
    reply.content = content.to_owned();
    reply.updated_at = now;
    Ok(reply)
}

/// Tombstones a reply and its whole subtree.
///
/// Only the root of the cascade is authorized; descendants written by
/// other users go down with it. Returns how many nodes were marked.
pub fn soft_delete_subtree(
    forest: &mut [Reply],
    id: ReplyId,
    actor: UserId,
    is_admin: bool,
) -> Result<usize> {
    let (reply, _) = find_mut(forest, id).ok_or_else(|| DomainError::reply_not_found(id))?;
    if !is_admin && reply.author != actor {
        return Err(DomainError::Unauthorized(format!(
            "user {actor} may not delete reply {id}"
        )));
    }
    Ok(tombstone(reply))
}

fn tombstone(reply: &mut Reply) -> usize {
    reply.is_deleted = true;
    reply.status = ContentStatus::Blocked;
    1 + reply.replies.iter_mut().map(tombstone).sum::<usize>()
}

/// Sets the status of one node. Children keep their own status.
pub fn set_status(forest: &mut [Reply], id: ReplyId, status: ContentStatus) -> Result<()> {
    let (reply, _) = find_mut(forest, id).ok_or_else(|| DomainError::reply_not_found(id))?;
    reply.status = status;
    Ok(())
}

pub fn find_author_of(forest: &[Reply], id: ReplyId) -> Result<UserId> {
    find(forest, id)
        .map(|(reply, _)| reply.author)
        .ok_or_else(|| DomainError::reply_not_found(id))
}

/// Pre-order listing of every live reply with its depth and parent.
pub fn flatten(forest: &[Reply]) -> Vec<FlatReply<'_>> {
    let mut rows = Vec::new();
    flatten_into(forest, 1, None, &mut rows);
    rows
}

fn flatten_into<'a>(
    forest: &'a [Reply],
    depth: usize,
    parent_id: Option<ReplyId>,
    rows: &mut Vec<FlatReply<'a>>,
) {
    for reply in forest.iter().filter(|r| r.is_live()) {
        rows.push(FlatReply { reply, depth, parent_id });
        flatten_into(&reply.replies, depth + 1, Some(reply.id), rows);
    }
}

fn readable_by(reply: &Reply, actor: Option<&Actor>) -> bool {
    reply.status == ContentStatus::Published || actor.is_some_and(|a| a.can_manage(reply.author))
}

/// The part of the forest `actor` may read.
///
/// Tombstoned subtrees are dropped. Unpublished replies are kept only for
/// their author and admins; hiding a reply hides its descendants too.
pub fn visible_forest(forest: &[Reply], actor: Option<&Actor>) -> Vec<Reply> {
    forest
        .iter()
        .filter(|r| r.is_live() && readable_by(r, actor))
        .map(|r| Reply { replies: visible_forest(&r.replies, actor), ..r.clone() })
        .collect()
}

/// Like [`find`], but only through replies `actor` may read, so a hidden
/// reply or anything below it resolves to `None`.
pub fn find_visible<'a>(forest: &'a [Reply], id: ReplyId, actor: &Actor) -> Option<(&'a Reply, usize)> {
    find_visible_at(forest, id, actor, 1)
}

fn find_visible_at<'a>(
    forest: &'a [Reply],
    id: ReplyId,
    actor: &Actor,
    depth: usize,
) -> Option<(&'a Reply, usize)> {
    for reply in forest.iter().filter(|r| r.is_live() && readable_by(r, Some(actor))) {
        if reply.id == id {
            return Some((reply, depth));
        }
        if let Some(found) = find_visible_at(&reply.replies, id, actor, depth + 1) {
            return Some(found);
        }
    }
    None
}
