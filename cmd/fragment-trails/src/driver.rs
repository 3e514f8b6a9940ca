//! # JSON-lines driver
//!
//! Reads one command object per line and answers with one response object
//! per line, in order. A failed command does not stop the loop.
//!
//! ```text
//! {"op":"add_category","category":"0190..."}
//! {"op":"create_fragment","actor":{"user_id":"0190..."},"request":{...}}
//! {"ok":true,"result":{...}}
//! ```

use domains::{Actor, CategoryId, ContentStatus, DomainError, FragmentId, PageRequest, ReplyId, UserId};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use services::{
    retry_on_conflict, AdminFragmentFilter, AdminReplyFilter, CreateFragmentRequest,
    FragmentListFilter, ReplyRequest, UpdateFragmentRequest, VoteRequest,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::wiring::App;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateFragment { actor: Actor, request: CreateFragmentRequest },
    UpdateFragment { actor: Actor, fragment_id: FragmentId, request: UpdateFragmentRequest },
    DeleteFragment { actor: Actor, fragment_id: FragmentId },
    ChangeFragmentStatus { actor: Actor, fragment_id: FragmentId, status: ContentStatus },
    ReviewFragment { actor: Actor, fragment_id: FragmentId, decision: ContentStatus },
    ViewFragment { actor: Option<Actor>, fragment_id: FragmentId },
    Reply { actor: Actor, fragment_id: FragmentId, request: ReplyRequest },
    DeleteReply { actor: Actor, fragment_id: FragmentId, reply_id: ReplyId },
    SetReplyStatus { actor: Actor, fragment_id: FragmentId, reply_id: ReplyId, status: ContentStatus },
    Vote { actor: Actor, fragment_id: FragmentId, request: VoteRequest },
    BrowseFragments {
        #[serde(default)]
        actor: Option<Actor>,
        #[serde(default)]
        filter: FragmentListFilter,
        #[serde(default)]
        page: PageRequest,
    },
    MyFragments {
        actor: Actor,
        #[serde(default)]
        filter: FragmentListFilter,
        #[serde(default)]
        page: PageRequest,
    },
    ListFragments {
        actor: Actor,
        #[serde(default)]
        filter: AdminFragmentFilter,
        #[serde(default)]
        page: PageRequest,
    },
    ListReplies {
        actor: Actor,
        #[serde(default)]
        filter: AdminReplyFilter,
        #[serde(default)]
        page: PageRequest,
    },
    AuthorStats { actor: Actor, author: UserId },
    AddCategory { category: CategoryId },
    Follow { follower: UserId, author: UserId },
    Notifications { user: UserId },
    Metrics,
}

#[derive(Debug, Serialize)]
struct Failure {
    kind: &'static str,
    message: String,
}

fn error_kind(err: &DomainError) -> &'static str {
    match err {
        DomainError::NotFound(..) => "not_found",
        DomainError::Unauthorized(_) => "unauthorized",
        DomainError::InvalidTransition(_) => "invalid_transition",
        DomainError::DepthExceeded { .. } => "depth_exceeded",
        DomainError::ValidationError(_) => "validation_error",
        DomainError::VersionConflict { .. } => "version_conflict",
        DomainError::ClassifierUnavailable(_) => "classifier_unavailable",
        DomainError::Internal(_) => "internal",
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, DomainError> {
    serde_json::to_value(value).map_err(|e| DomainError::Internal(e.to_string()))
}

pub struct Driver {
    app: App,
    registry: Registry,
}

impl Driver {
    pub fn new(app: App, registry: Registry) -> Self {
        Self { app, registry }
    }

    /// Executes one command. Writes retry on version conflicts.
    pub async fn execute(&self, command: Command) -> Result<Value, DomainError> {
        let service = &self.app.service;
        let attempts = self.app.max_attempts;

        match command {
            Command::CreateFragment { actor, request } => {
                to_value(service.create_fragment(actor, request).await?)
            }
            Command::UpdateFragment { actor, fragment_id, request } => to_value(
                retry_on_conflict(attempts, move || {
                    service.update_fragment(actor, fragment_id, request.clone())
                })
                .await?,
            ),
            Command::DeleteFragment { actor, fragment_id } => to_value(
                retry_on_conflict(attempts, move || service.delete_fragment(actor, fragment_id)).await?,
            ),
            Command::ChangeFragmentStatus { actor, fragment_id, status } => to_value(
                retry_on_conflict(attempts, move || {
                    service.change_fragment_status(actor, fragment_id, status)
                })
                .await?,
            ),
            Command::ReviewFragment { actor, fragment_id, decision } => to_value(
                retry_on_conflict(attempts, move || service.review_fragment(actor, fragment_id, decision))
                    .await?,
            ),
            Command::ViewFragment { actor, fragment_id } => {
                to_value(service.view_fragment(actor, fragment_id).await?)
            }
            Command::Reply { actor, fragment_id, request } => to_value(
                retry_on_conflict(attempts, move || {
                    service.add_or_edit_reply(actor, fragment_id, request.clone())
                })
                .await?,
            ),
            Command::DeleteReply { actor, fragment_id, reply_id } => {
                let removed = retry_on_conflict(attempts, move || {
                    service.delete_reply(actor, fragment_id, reply_id)
                })
                .await?;
                Ok(json!({ "removed": removed }))
            }
            Command::SetReplyStatus { actor, fragment_id, reply_id, status } => to_value(
                retry_on_conflict(attempts, move || {
                    service.set_reply_status(actor, fragment_id, reply_id, status)
                })
                .await?,
            ),
            Command::Vote { actor, fragment_id, request } => to_value(
                retry_on_conflict(attempts, move || service.vote(actor, fragment_id, request)).await?,
            ),
            Command::BrowseFragments { actor, filter, page } => {
                to_value(service.list_published_fragments(actor, filter, page).await?)
            }
            Command::MyFragments { actor, filter, page } => {
                to_value(service.list_own_fragments(actor, filter, page).await?)
            }
            Command::ListFragments { actor, filter, page } => {
                to_value(service.list_fragments_for_admin(actor, filter, page).await?)
            }
            Command::ListReplies { actor, filter, page } => {
                to_value(service.list_replies_for_admin(actor, filter, page).await?)
            }
            Command::AuthorStats { actor, author } => {
                to_value(service.author_stats(actor, author).await?)
            }
            Command::AddCategory { category } => {
                let categories = self.app.categories.as_ref().ok_or_else(|| {
                    DomainError::ValidationError("categories are managed by the database".into())
                })?;
                categories.add(category);
                Ok(json!({ "category": category }))
            }
            Command::Follow { follower, author } => {
                let followers = self.app.followers.as_ref().ok_or_else(|| {
                    DomainError::ValidationError("follows are managed by the database".into())
                })?;
                followers.follow(follower, author);
                Ok(json!({ "follower": follower, "author": author }))
            }
            Command::Notifications { user } => {
                let outbox = self.app.outbox.as_ref().ok_or_else(|| {
                    DomainError::ValidationError("notifications are not kept with the log sink".into())
                })?;
                to_value(outbox.for_recipient(user))
            }
            Command::Metrics => {
                let mut text = String::new();
                encode(&mut text, &self.registry).map_err(|e| DomainError::Internal(e.to_string()))?;
                Ok(Value::String(text))
            }
        }
    }

    /// Parses and executes one input line, returning the response object.
    pub async fn handle_line(&self, line: &str) -> Value {
        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(err) => {
                debug!(error = %err, "unparseable command");
                let failure = Failure { kind: "bad_command", message: err.to_string() };
                return json!({ "ok": false, "error": failure });
            }
        };

        match self.execute(command).await {
            Ok(result) => json!({ "ok": true, "result": result }),
            Err(err) => {
                if !err.is_client_error() {
                    warn!(error = %err, "command failed");
                }
                let failure = Failure { kind: error_kind(&err), message: err.to_string() };
                json!({ "ok": false, "error": failure })
            }
        }
    }

    pub async fn run<R, W>(&self, input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            output.write_all(response.to_string().as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use configs::Settings;
    use services::Metrics;

    async fn driver() -> Driver {
        let settings = Settings::from_toml(
            "[moderation]\nblocked_terms = [\"scam\"]\n[notifications]\nsink = \"outbox\"",
        )
        .unwrap();
        let metrics = Arc::new(Metrics::new());
        let mut registry = Registry::default();
        metrics.register(&mut registry);
        let app = crate::wiring::build(&settings, metrics).await.unwrap();
        Driver::new(app, registry)
    }

    fn ok(response: &Value) -> &Value {
        assert_eq!(response["ok"], true, "{response}");
        &response["result"]
    }

    #[tokio::test]
    async fn publishes_and_replies_over_json_lines() {
        let driver = driver().await;
        let category = CategoryId::new();
        let (author, reader) = (UserId::new(), UserId::new());

        ok(&driver.handle_line(&json!({ "op": "add_category", "category": category }).to_string()).await);
        let created = driver
            .handle_line(
                &json!({
                    "op": "create_fragment",
                    "actor": { "user_id": author },
                    "request": {
                        "title": "Borrowing",
                        "description": "Shared vs unique",
                        "content": "&T and &mut T",
                        "category": category,
                        "status": "published"
                    }
                })
                .to_string(),
            )
            .await;
        let fragment = ok(&created);
        assert_eq!(fragment["status"], "published");

        let replied = driver
            .handle_line(
                &json!({
                    "op": "reply",
                    "actor": { "user_id": reader },
                    "fragment_id": fragment["id"],
                    "request": { "content": "Clear!", "action": { "type": "add", "parent": null } }
                })
                .to_string(),
            )
            .await;
        assert_eq!(ok(&replied)["depth"], 1);

        let inbox = driver
            .handle_line(&json!({ "op": "notifications", "user": author }).to_string())
            .await;
        assert_eq!(ok(&inbox)[0]["kind"], "NEW_REPLY");

        let feed = driver
            .handle_line(&json!({ "op": "browse_fragments", "filter": { "search": "borrow" } }).to_string())
            .await;
        assert_eq!(ok(&feed)["total"], 1);
        assert_eq!(ok(&feed)["items"][0]["total_replies"], 1);

        let mine = driver
            .handle_line(&json!({ "op": "my_fragments", "actor": { "user_id": reader } }).to_string())
            .await;
        assert_eq!(ok(&mine)["total"], 0);
    }

    #[tokio::test]
    async fn errors_are_reported_in_band() {
        let driver = driver().await;
        let response = driver.handle_line("{\"op\":\"nope\"}").await;
        assert_eq!(response["error"]["kind"], "bad_command");

        let response = driver
            .handle_line(
                &json!({
                    "op": "view_fragment",
                    "actor": null,
                    "fragment_id": FragmentId::new()
                })
                .to_string(),
            )
            .await;
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn inbox_needs_the_outbox_sink() {
        let settings = Settings::from_toml("").unwrap();
        let app = crate::wiring::build(&settings, Arc::new(Metrics::new())).await.unwrap();
        let driver = Driver::new(app, Registry::default());

        let response = driver
            .handle_line(&json!({ "op": "notifications", "user": UserId::new() }).to_string())
            .await;
        assert_eq!(response["error"]["kind"], "validation_error");
    }

    #[tokio::test]
    async fn run_answers_one_line_per_command() {
        let driver = driver().await;
        let input = "{\"op\":\"metrics\"}\n\n{\"op\":\"metrics\"}\n";
        let mut output = Vec::new();
        driver.run(input.as_bytes(), &mut output).await.unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("fragment_version_conflicts"));
    }
}
