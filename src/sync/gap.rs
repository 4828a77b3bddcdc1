//! Commits that reached the branch without going through a pull request.

use chrono::{DateTime, Duration, Utc};

use crate::clients::SourcePullRequest;
use crate::mail::CommitRecord;

/// How far back a commit may be and still count.
pub const GAP_WINDOW_DAYS: i64 = 30;

/// Commits whose id matches no pull request's merge commit, in input order.
pub fn detect_unreviewed_commits(
    commits: &[CommitRecord],
    pull_requests: &[SourcePullRequest],
) -> Vec<CommitRecord> {
    commits
        .iter()
        .filter(|commit| {
            !pull_requests
                .iter()
                .any(|pr| pr.merge_commit_id.as_deref() == Some(commit.id.as_str()))
        })
        .cloned()
        .collect()
}

/// Feature or fix commits authored within the trailing window.
pub fn is_gap_candidate(message: &str, author_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let subject = message.trim_start().to_ascii_lowercase();
    let typed = subject.starts_with("feat") || subject.starts_with("fix");
    typed && author_date >= now - Duration::days(GAP_WINDOW_DAYS)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clients::PullRequestStatus;

    fn commit(id: &str) -> CommitRecord {
        CommitRecord {
            id: id.into(),
            title: format!("feat: {id}"),
            author: "Jane".into(),
            created_at: String::new(),
            url: String::new(),
        }
    }

    fn merged_pr(merge_commit: Option<&str>) -> SourcePullRequest {
        SourcePullRequest {
            id: 1,
            title: "t".into(),
            author: "a".into(),
            status: PullRequestStatus::Completed,
            merge_status: None,
            merge_commit_id: merge_commit.map(str::to_string),
            url: String::new(),
        }
    }

    #[test]
    fn reports_commits_without_pull_request() {
        let gaps = detect_unreviewed_commits(&[commit("a"), commit("b")], &[merged_pr(Some("a"))]);
        let ids: Vec<_> = gaps.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn preserves_input_order_and_ignores_unmerged() {
        let commits = [commit("c"), commit("a"), commit("b")];
        let gaps = detect_unreviewed_commits(&commits, &[merged_pr(None), merged_pr(Some("a"))]);
        let ids: Vec<_> = gaps.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c", "b"]);
    }

    #[test]
    fn empty_inputs() {
        assert!(detect_unreviewed_commits(&[], &[merged_pr(Some("a"))]).is_empty());
        assert_eq!(detect_unreviewed_commits(&[commit("a")], &[]).len(), 1);
    }

    #[test]
    fn candidate_filter() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        let recent = now - Duration::days(3);
        let stale = now - Duration::days(31);

        assert!(is_gap_candidate("feat: add login", recent, now));
        assert!(is_gap_candidate("Fix(footer): spacing", recent, now));
        assert!(!is_gap_candidate("chore: bump deps", recent, now));
        assert!(!is_gap_candidate("feat: old", stale, now));
        assert!(is_gap_candidate("fix: edge", now - Duration::days(GAP_WINDOW_DAYS), now));
    }
}
