//! Field-level merge of two diverging copies of one issue.
//!
//! Precedence is whole-record last-writer-wins on `last_update`; exact
//! ties resolve in favor of the remote copy so a given (local, remote)
//! pair always merges identically. Collection-valued fields union rather
//! than overwrite, so a relationship added on either side is never
//! silently dropped. Pure and deterministic; safe to call concurrently.

use crate::model::{Issue, IssueId, ParentRef};
use std::collections::{BTreeSet, HashSet};

/// Merge two copies of the same issue.
///
/// Both inputs must share an id (case-insensitively).
#[must_use]
pub fn merge_issues(local: &Issue, remote: &Issue) -> Issue {
    debug_assert_eq!(local.id, remote.id, "merge requires a shared issue id");

    let remote_wins = remote.last_update >= local.last_update;
    let (newer, older) = if remote_wins {
        (remote, local)
    } else {
        (local, remote)
    };

    let mut merged = newer.clone();
    merged.created_at = local.created_at.min(remote.created_at);
    merged.tags = union_tags(&local.tags, &remote.tags);
    merged.linked_issues = union_ids(&local.linked_issues, &remote.linked_issues);
    merged.parents = union_parents(&newer.parents, &older.parents);
    merged
}

fn union_tags(a: &[String], b: &[String]) -> Vec<String> {
    let set: BTreeSet<&String> = a.iter().chain(b.iter()).collect();
    set.into_iter().cloned().collect()
}

fn union_ids(a: &[IssueId], b: &[IssueId]) -> Vec<IssueId> {
    let set: BTreeSet<&IssueId> = a.iter().chain(b.iter()).collect();
    set.into_iter().cloned().collect()
}

/// Union parent edges by parent id; the newer side's `sort_order` wins on
/// a shared id. Output is sorted by `(sort_order, parent_id)`.
fn union_parents(newer: &[ParentRef], older: &[ParentRef]) -> Vec<ParentRef> {
    let mut seen: HashSet<&IssueId> = HashSet::new();
    let mut merged: Vec<ParentRef> = Vec::with_capacity(newer.len() + older.len());
    for parent in newer.iter().chain(older.iter()) {
        if seen.insert(&parent.parent_id) {
            merged.push(parent.clone());
        }
    }
    merged.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.parent_id.cmp(&b.parent_id))
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Status};
    use chrono::{TimeZone, Utc};

    fn issue_at(id: &str, secs: i64) -> Issue {
        let mut issue = Issue::new(id, "Title");
        issue.created_at = Utc.timestamp_opt(secs, 0).unwrap();
        issue.last_update = issue.created_at;
        issue
    }

    #[test]
    fn newer_side_wins_scalars_collections_union() {
        let mut local = issue_at("fl-x", 1_000);
        local.title = "Local title".to_string();
        local.tags = vec!["local".to_string()];
        local.priority = Priority::HIGH;

        let mut remote = issue_at("fl-x", 2_000);
        remote.title = "Remote title".to_string();
        remote.tags = vec!["remote".to_string()];
        remote.status = Status::Progress;

        let merged = merge_issues(&local, &remote);
        assert_eq!(merged.title, "Remote title");
        assert_eq!(merged.status, Status::Progress);
        assert_eq!(merged.tags, vec!["local".to_string(), "remote".to_string()]);
        assert_eq!(merged.last_update, remote.last_update);
        assert_eq!(merged.created_at, local.created_at);
    }

    #[test]
    fn collection_membership_is_commutative() {
        let mut a = issue_at("fl-x", 1_000);
        a.tags = vec!["one".to_string(), "shared".to_string()];
        a.linked_issues = vec![IssueId::from("fl-1")];

        let mut b = issue_at("fl-x", 2_000);
        b.tags = vec!["two".to_string(), "shared".to_string()];
        b.linked_issues = vec![IssueId::from("FL-1"), IssueId::from("fl-2")];

        let ab = merge_issues(&a, &b);
        let ba = merge_issues(&b, &a);
        assert_eq!(ab.tags, ba.tags);
        assert_eq!(ab.linked_issues, ba.linked_issues);
        assert_eq!(ab.tags.len(), 3);
        // fl-1 and FL-1 are the same id
        assert_eq!(ab.linked_issues.len(), 2);
    }

    #[test]
    fn parents_union_by_id_newer_sort_order_wins() {
        let mut local = issue_at("fl-x", 1_000);
        local.parents = vec![
            ParentRef {
                parent_id: IssueId::from("fl-p1"),
                sort_order: 5,
            },
            ParentRef {
                parent_id: IssueId::from("fl-p2"),
                sort_order: 1,
            },
        ];

        let mut remote = issue_at("fl-x", 2_000);
        remote.parents = vec![ParentRef {
            parent_id: IssueId::from("fl-p1"),
            sort_order: 0,
        }];

        let merged = merge_issues(&local, &remote);
        assert_eq!(merged.parents.len(), 2);
        assert_eq!(merged.parents[0].parent_id.as_str(), "fl-p1");
        assert_eq!(merged.parents[0].sort_order, 0);
        assert_eq!(merged.parents[1].parent_id.as_str(), "fl-p2");
    }

    #[test]
    fn exact_timestamp_tie_prefers_remote() {
        let mut local = issue_at("fl-x", 1_000);
        local.title = "Local".to_string();
        let mut remote = issue_at("fl-x", 1_000);
        remote.title = "Remote".to_string();

        let merged = merge_issues(&local, &remote);
        assert_eq!(merged.title, "Remote");
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let mut local = issue_at("fl-x", 3_000);
        local.tags = vec!["b".to_string(), "a".to_string()];
        let mut remote = issue_at("fl-x", 2_000);
        remote.tags = vec!["c".to_string()];

        let first = merge_issues(&local, &remote);
        let second = merge_issues(&local, &remote);
        assert_eq!(first, second);
        assert_eq!(first.title, local.title, "local is newer here");
    }
}
