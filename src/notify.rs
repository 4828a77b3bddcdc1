//! Fan-out of review events and service notifications to chat and the
//! workflow store.
//!
//! Every pull request gets exactly one chat thread. The first event seen for
//! a pull request opens it and the thread id is stored in the identity
//! mapping; later events post into it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::clients::{ChatClient, MentionScope, RoleMentions, WorkflowClient};
use crate::error::Error;
use crate::hooks::{BuildResult, MergeNotification, ServiceNotification};
use crate::mail::{EventKind, ParsedReviewEvent};
use crate::store::{IdentityMapping, IdentityStore, RecordKind};

/// Consumer of parsed review events.
#[async_trait]
pub trait ReviewEventSink: Send + Sync {
    /// Must not fail; implementations log their own errors.
    async fn handle_review(&self, event: ParsedReviewEvent);
}

/// Which roles get pinged for a lifecycle event.
pub fn mention_scope(kind: EventKind) -> MentionScope {
    match kind {
        EventKind::Created => MentionScope::Both,
        EventKind::Completed => MentionScope::Design,
        _ => MentionScope::Dev,
    }
}

fn thread_name(id: &str, title: &str) -> String {
    format!("PR {id}: {title}")
}

/// Chat message for a review event.
pub fn render_review(event: &ParsedReviewEvent, mentions: &str) -> String {
    let pr = &event.pull_request;
    let headline = match event.kind {
        EventKind::Created => format!("{} opened [{}]({})", event.author, pr.title, pr.url),
        EventKind::Completed => format!("{} completed the pull request", event.author),
        EventKind::Commented => format!("{} commented", event.author),
        EventKind::Replied => format!("{} replied to a comment", event.author),
        EventKind::Approved => format!("{} approved", event.author),
        EventKind::Pushed => format!("{} pushed new changes", event.author),
        EventKind::Abandoned => format!("{} abandoned the pull request", event.author),
        EventKind::AutoComplete => format!("{} set the pull request to auto-complete", event.author),
    };

    let mut lines = Vec::new();
    if mentions.is_empty() {
        lines.push(headline);
    } else {
        lines.push(format!("{mentions} {headline}"));
    }

    if let Some(comment) = event.comment.as_deref().filter(|c| !c.is_empty()) {
        lines.extend(comment.lines().map(|l| format!("> {l}")));
    }
    if let Some(reviewers) = &event.reviewers {
        let list: Vec<String> = reviewers
            .iter()
            .map(|r| {
                let mark = if r.approved { "✅" } else { "⏳" };
                let required = if r.is_required { " (required)" } else { "" };
                format!("{mark} {}{required}", r.user)
            })
            .collect();
        if !list.is_empty() {
            lines.push(format!("Reviewers: {}", list.join(", ")));
        }
    }
    if let Some(commits) = &event.commits {
        lines.extend(commits.iter().map(|c| format!("• {} ({})", c.title, c.author)));
    }
    lines.join("\n")
}

/// Routes events to the chat thread of their pull request and mirrors
/// review comments onto the replica record.
pub struct EventDispatcher {
    store: Arc<dyn IdentityStore>,
    chat: Arc<dyn ChatClient>,
    workflow: Option<Arc<dyn WorkflowClient>>,
    roles: RoleMentions,
}

impl EventDispatcher {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        chat: Arc<dyn ChatClient>,
        workflow: Option<Arc<dyn WorkflowClient>>,
        roles: RoleMentions,
    ) -> Self {
        Self {
            store,
            chat,
            workflow,
            roles,
        }
    }

    /// Post into the pull request's thread, opening it if needed.
    async fn post_for_pull_request(
        &self,
        canonical_id: &str,
        title: &str,
        author: &str,
        content: &str,
    ) -> Result<Option<IdentityMapping>, Error> {
        let mapping = self.store.get_mapping(canonical_id).await?;

        match mapping.as_ref().and_then(|m| m.chat_thread_id.as_deref()) {
            Some(thread_id) => {
                self.chat.post_in_thread(thread_id, content).await?;
                debug!(canonical_id = canonical_id, thread_id = thread_id, "Posted to existing thread");
            }
            None => {
                let thread_id = self
                    .chat
                    .start_thread(&thread_name(canonical_id, title), content)
                    .await?;
                self.store
                    .upsert_mapping(
                        &IdentityMapping::new(canonical_id, RecordKind::PullRequest, author, title)
                            .with_chat_thread(&thread_id),
                    )
                    .await?;
                info!(canonical_id = canonical_id, thread_id = %thread_id, "Opened chat thread");
            }
        }
        Ok(mapping)
    }

    pub async fn dispatch_review(&self, event: &ParsedReviewEvent) -> Result<(), Error> {
        let Some(canonical_id) = event.canonical_id() else {
            warn!(title = %event.pull_request.title, "Review event without pull request id, not routed");
            return Ok(());
        };

        let mentions = self.roles.render(mention_scope(event.kind));
        let content = render_review(event, &mentions);
        // Only the creator of the pull request is a reliable author.
        let author = if event.kind == EventKind::Created {
            event.author.as_str()
        } else {
            ""
        };

        let mapping = self
            .post_for_pull_request(&canonical_id, &event.pull_request.title, author, &content)
            .await?;

        let is_comment = matches!(event.kind, EventKind::Commented | EventKind::Replied);
        let comment = event.comment.as_deref().filter(|c| !c.is_empty());
        let record_id = mapping.and_then(|m| m.replica_record_id);
        if let (true, Some(comment), Some(record_id), Some(workflow)) =
            (is_comment, comment, record_id, &self.workflow)
        {
            workflow
                .append_comment(&record_id, &format!("{}: {comment}", event.author))
                .await?;
            debug!(canonical_id = %canonical_id, record_id = %record_id, "Mirrored comment to replica");
        }
        Ok(())
    }

    pub async fn dispatch_notification(&self, notification: &ServiceNotification) -> Result<(), Error> {
        match notification {
            ServiceNotification::Merge(merge) => self.dispatch_merge(merge).await,
            ServiceNotification::Build(build) => {
                if matches!(build.result, BuildResult::Failed | BuildResult::PartiallySucceeded) {
                    let who = build
                        .requested_for
                        .as_ref()
                        .map(|i| i.display_name.as_str())
                        .unwrap_or("unknown");
                    let mentions = self.roles.render(MentionScope::Dev);
                    let content = format!(
                        "{mentions} Build {} on {} {:?} (requested by {who}) {}",
                        build.build_number, build.source_branch, build.result, build.url
                    );
                    self.chat
                        .start_thread(&format!("Build {}", build.build_number), content.trim())
                        .await?;
                    info!(build = %build.build_number, "Reported failed build");
                } else {
                    debug!(build = %build.build_number, result = ?build.result, "Build notification ignored");
                }
                Ok(())
            }
            ServiceNotification::Unknown(_) => {
                debug!(event_type = notification.event_type(), "Unhandled notification type");
                Ok(())
            }
        }
    }

    async fn dispatch_merge(&self, merge: &MergeNotification) -> Result<(), Error> {
        let canonical_id = merge.pull_request_id.to_string();
        let mut content = format!("Merged: {}", merge.title);
        if let Some(status) = &merge.merge_status {
            content.push_str(&format!(" ({status})"));
        }
        if let Some(commit) = &merge.last_merge_commit {
            content.push_str(&format!("\nMerge commit {}", commit.commit_id));
        }
        let author = merge
            .created_by
            .as_ref()
            .map(|i| i.display_name.as_str())
            .unwrap_or("");
        self.post_for_pull_request(&canonical_id, &merge.title, author, &content)
            .await?;
        Ok(())
    }
}

/// Sink used when chat is not configured: events are only logged.
pub struct LoggingSink;

#[async_trait]
impl ReviewEventSink for LoggingSink {
    async fn handle_review(&self, event: ParsedReviewEvent) {
        info!(
            kind = event.kind.label(),
            author = %event.author,
            title = %event.pull_request.title,
            "Review event (no chat configured)"
        );
    }
}

#[async_trait]
impl ReviewEventSink for EventDispatcher {
    async fn handle_review(&self, event: ParsedReviewEvent) {
        if let Err(e) = self.dispatch_review(&event).await {
            warn!(
                kind = event.kind.label(),
                title = %event.pull_request.title,
                error = %e,
                "Failed to dispatch review event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::error::ClientError;
    use crate::mail::{PullRequestRef, Reviewer};
    use crate::store::LibSqlBackend;
    use crate::sync::replica::testing::MemoryWorkflow;

    #[derive(Default)]
    struct RecordingChat {
        threads: Mutex<Vec<(String, String)>>,
        posts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn start_thread(&self, name: &str, content: &str) -> Result<String, ClientError> {
            let mut threads = self.threads.lock().unwrap();
            threads.push((name.to_string(), content.to_string()));
            Ok(format!("thread-{}", threads.len()))
        }

        async fn post_in_thread(&self, thread_id: &str, content: &str) -> Result<(), ClientError> {
            self.posts
                .lock()
                .unwrap()
                .push((thread_id.to_string(), content.to_string()));
            Ok(())
        }
    }

    fn event(kind: EventKind, comment: Option<&str>) -> ParsedReviewEvent {
        ParsedReviewEvent {
            action: format!("Jane Doe {}", kind.label()),
            author: "Jane Doe".into(),
            kind,
            pull_request: PullRequestRef {
                id: Some(42),
                title: "Add login".into(),
                url: "https://dev.example.com/pullrequest/42".into(),
            },
            comment: comment.map(str::to_string),
            reviewers: None,
            commits: None,
        }
    }

    fn roles() -> RoleMentions {
        RoleMentions {
            dev: Some("1".into()),
            design: Some("2".into()),
        }
    }

    async fn dispatcher() -> (EventDispatcher, Arc<RecordingChat>, Arc<MemoryWorkflow>, Arc<LibSqlBackend>) {
        let chat = Arc::new(RecordingChat::default());
        let workflow = Arc::new(MemoryWorkflow::default());
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let d = EventDispatcher::new(store.clone(), chat.clone(), Some(workflow.clone()), roles());
        (d, chat, workflow, store)
    }

    #[tokio::test]
    async fn first_event_opens_thread_then_reuses_it() {
        let (d, chat, _workflow, store) = dispatcher().await;

        d.dispatch_review(&event(EventKind::Created, None)).await.unwrap();
        d.dispatch_review(&event(EventKind::Approved, None)).await.unwrap();

        let threads = chat.threads.lock().unwrap().clone();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].0, "PR 42: Add login");
        assert!(threads[0].1.starts_with("<@&1> <@&2> Jane Doe opened"));

        let posts = chat.posts.lock().unwrap().clone();
        assert_eq!(posts, vec![("thread-1".to_string(), "<@&1> Jane Doe approved".to_string())]);

        let mapping = store.get_mapping("42").await.unwrap().unwrap();
        assert_eq!(mapping.chat_thread_id.as_deref(), Some("thread-1"));
        assert_eq!(mapping.author, "Jane Doe");
    }

    #[tokio::test]
    async fn comments_are_mirrored_when_replica_record_known() {
        let (d, _chat, workflow, store) = dispatcher().await;
        store
            .upsert_mapping(
                &IdentityMapping::new("42", RecordKind::PullRequest, "Jane Doe", "Add login")
                    .with_replica_record("page-9"),
            )
            .await
            .unwrap();

        d.dispatch_review(&event(EventKind::Commented, Some("Looks good"))).await.unwrap();
        d.dispatch_review(&event(EventKind::Approved, None)).await.unwrap();

        let comments = workflow.comments.lock().unwrap().clone();
        assert_eq!(comments, vec![("page-9".to_string(), "Jane Doe: Looks good".to_string())]);
    }

    #[tokio::test]
    async fn comment_without_replica_record_only_posts_to_chat() {
        let (d, chat, workflow, _store) = dispatcher().await;
        d.dispatch_review(&event(EventKind::Replied, Some("Done"))).await.unwrap();
        assert!(workflow.comments.lock().unwrap().is_empty());
        assert!(chat.threads.lock().unwrap()[0].1.ends_with("> Done"));
    }

    #[tokio::test]
    async fn event_without_id_is_dropped() {
        let (d, chat, _workflow, _store) = dispatcher().await;
        let mut e = event(EventKind::Approved, None);
        e.pull_request.id = None;
        d.dispatch_review(&e).await.unwrap();
        assert!(chat.threads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_notification_posts_into_existing_thread() {
        let (d, chat, _workflow, _store) = dispatcher().await;
        d.dispatch_review(&event(EventKind::Created, None)).await.unwrap();

        let merge = ServiceNotification::from_json(json!({
            "eventType": "git.pullrequest.merged",
            "resource": { "pullRequestId": 42, "title": "Add login", "mergeStatus": "succeeded" }
        }))
        .unwrap();
        d.dispatch_notification(&merge).await.unwrap();

        let posts = chat.posts.lock().unwrap().clone();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, "Merged: Add login (succeeded)");
    }

    #[tokio::test]
    async fn only_failed_builds_are_reported() {
        let (d, chat, _workflow, _store) = dispatcher().await;
        for result in ["succeeded", "failed"] {
            let n = ServiceNotification::from_json(json!({
                "eventType": "build.complete",
                "resource": { "buildNumber": format!("b-{result}"), "result": result }
            }))
            .unwrap();
            d.dispatch_notification(&n).await.unwrap();
        }
        let threads = chat.threads.lock().unwrap().clone();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].0, "Build b-failed");
    }

    #[test]
    fn render_includes_reviewers_in_given_order() {
        let mut e = event(EventKind::Approved, None);
        e.reviewers = Some(vec![
            Reviewer {
                user: "Bob".into(),
                approved: true,
                is_required: true,
            },
            Reviewer {
                user: "Ann".into(),
                approved: false,
                is_required: false,
            },
        ]);
        let text = render_review(&e, "");
        assert_eq!(text, "Jane Doe approved\nReviewers: ✅ Bob (required), ⏳ Ann");
    }

    #[test]
    fn scopes() {
        assert_eq!(mention_scope(EventKind::Created), MentionScope::Both);
        assert_eq!(mention_scope(EventKind::Completed), MentionScope::Design);
        assert_eq!(mention_scope(EventKind::Commented), MentionScope::Dev);
    }
}
