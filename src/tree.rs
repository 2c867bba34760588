//! Two-level display tree over the flat comment list of one subject. One
//! grouping pass with a hash index on `parent_id`; no repeated scans.

use std::collections::HashMap;

use crate::models::{Comment, CommentView, Id, ThreadNode};

/// Partition into top-level nodes and attached replies, then order:
/// top-level pinned-first then ascending `created_at` (ties on `id`), replies
/// ascending `created_at` (ties on `id`). Deterministic for identical input.
///
/// Soft-deleted rows: a deleted top-level comment survives as a redacted
/// placeholder shell only while it still anchors live replies; deleted
/// replies are dropped outright.
pub fn build_tree(comments: Vec<Comment>) -> Vec<ThreadNode> {
    let mut tops: Vec<Comment> = Vec::new();
    let mut by_parent: HashMap<Id, Vec<Comment>> = HashMap::new();

    for c in comments {
        match c.parent_id {
            None => tops.push(c),
            Some(parent) => {
                if c.is_live() {
                    by_parent.entry(parent).or_default().push(c);
                }
            }
        }
    }

    let mut nodes: Vec<ThreadNode> = tops
        .into_iter()
        .filter_map(|top| {
            let mut replies = by_parent.remove(&top.id).unwrap_or_default();
            if !top.is_live() && replies.is_empty() {
                // nothing anchored to the shell; hide it entirely
                return None;
            }
            replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Some(ThreadNode {
                comment: CommentView::from(&top),
                replies: replies.iter().map(CommentView::from).collect(),
            })
        })
        .collect();

    nodes.sort_by(|a, b| {
        b.comment
            .is_pinned
            .cmp(&a.comment.is_pinned)
            .then(a.comment.created_at.cmp(&b.comment.created_at))
            .then(a.comment.id.cmp(&b.comment.id))
    });
    nodes
    // replies pointing at a row that no longer exists at all fall out of
    // by_parent unconsumed; under soft delete that cannot happen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn comment(id: Id, parent: Option<Id>, minutes: i64) -> Comment {
        Comment {
            id,
            subject_id: "car-1".into(),
            author_id: format!("u-{id}"),
            content: format!("c{id}"),
            parent_id: parent,
            is_pinned: false,
            created_at: Utc::now() + Duration::minutes(minutes),
            deleted_at: None,
        }
    }

    #[test]
    fn groups_replies_under_top_level() {
        let tree = build_tree(vec![
            comment(1, None, 0),
            comment(2, Some(1), 1),
            comment(3, None, 2),
            comment(4, Some(1), 3),
        ]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].comment.id, 1);
        assert_eq!(
            tree[0].replies.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert!(tree[1].replies.is_empty());
    }

    #[test]
    fn pinned_sorts_first_regardless_of_age() {
        let mut newer = comment(2, None, 10);
        newer.is_pinned = true;
        let tree = build_tree(vec![comment(1, None, 0), newer, comment(3, None, 5)]);
        assert_eq!(
            tree.iter().map(|n| n.comment.id).collect::<Vec<_>>(),
            vec![2, 1, 3]
        );
    }

    #[test]
    fn identical_timestamps_tie_break_on_id() {
        let now = Utc::now();
        let mk = |id| {
            let mut c = comment(id, None, 0);
            c.created_at = now;
            c
        };
        let tree = build_tree(vec![mk(3), mk(1), mk(2)]);
        assert_eq!(
            tree.iter().map(|n| n.comment.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn deleted_shell_kept_only_while_anchoring_replies() {
        let mut dead_with_reply = comment(1, None, 0);
        dead_with_reply.deleted_at = Some(Utc::now());
        let mut dead_alone = comment(3, None, 1);
        dead_alone.deleted_at = Some(Utc::now());

        let tree = build_tree(vec![dead_with_reply, comment(2, Some(1), 2), dead_alone]);
        assert_eq!(tree.len(), 1);
        assert!(tree[0].comment.deleted);
        assert!(tree[0].comment.content.is_empty()); // redacted placeholder
        assert_eq!(tree[0].replies.len(), 1);
    }

    #[test]
    fn deleted_replies_are_dropped() {
        let mut dead = comment(2, Some(1), 1);
        dead.deleted_at = Some(Utc::now());
        let tree = build_tree(vec![comment(1, None, 0), dead, comment(3, Some(1), 2)]);
        assert_eq!(
            tree[0].replies.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![3]
        );
    }
}
