//! Like-count annotation. Exactly one batched count query per tree build (two
//! with a viewer), so read cost stays O(1) round trips regardless of thread
//! size.

use crate::error::EngineError;
use crate::models::{CommentView, Id, ThreadNode};
use crate::repo::EngagementRepo;

pub async fn annotate(
    tree: &mut [ThreadNode],
    viewer_id: Option<&str>,
    repo: &dyn EngagementRepo,
) -> Result<(), EngineError> {
    let ids: Vec<Id> = tree
        .iter()
        .flat_map(|n| {
            std::iter::once(n.comment.id).chain(n.replies.iter().map(|r| r.id))
        })
        .collect();
    if ids.is_empty() {
        return Ok(());
    }

    let counts = repo.like_counts(&ids).await?;
    let liked = match viewer_id {
        Some(viewer) => repo.liked_by(viewer, &ids).await?,
        None => Default::default(), // anonymous read: viewer_has_liked stays false
    };

    let mut apply = |view: &mut CommentView| {
        view.like_count = counts.get(&view.id).copied().unwrap_or(0);
        view.viewer_has_liked = liked.contains(&view.id);
    };
    for node in tree.iter_mut() {
        apply(&mut node.comment);
        for reply in node.replies.iter_mut() {
            apply(reply);
        }
    }
    Ok(())
}

#[cfg(all(test, feature = "inmem-store"))]
mod tests {
    use super::*;
    use crate::models::{NewComment, Subject};
    use crate::repo::inmem::InMemRepo;
    use crate::repo::{CommentRepo, LikeRepo, SubjectRepo};
    use crate::tree::build_tree;

    async fn seeded() -> (InMemRepo, Id, Id) {
        let repo = InMemRepo::ephemeral();
        repo.upsert_subject(Subject {
            id: "car-1".into(),
            owner_id: "u-owner".into(),
        })
        .await
        .unwrap();
        let top = repo
            .insert_comment(NewComment {
                subject_id: "car-1".into(),
                author_id: "u-a".into(),
                content: "top".into(),
                parent_id: None,
            })
            .await
            .unwrap();
        let reply = repo
            .insert_comment(NewComment {
                subject_id: "car-1".into(),
                author_id: "u-b".into(),
                content: "reply".into(),
                parent_id: Some(top.id),
            })
            .await
            .unwrap();
        (repo, top.id, reply.id)
    }

    #[tokio::test]
    async fn counts_and_viewer_flags() {
        let (repo, top, reply) = seeded().await;
        repo.insert_like(top, "u-x").await.unwrap();
        repo.insert_like(top, "u-y").await.unwrap();
        repo.insert_like(reply, "u-x").await.unwrap();

        let mut tree = build_tree(repo.list_by_subject("car-1").await.unwrap());
        annotate(&mut tree, Some("u-x"), &repo).await.unwrap();

        assert_eq!(tree[0].comment.like_count, 2);
        assert!(tree[0].comment.viewer_has_liked);
        assert_eq!(tree[0].replies[0].like_count, 1);
        assert!(tree[0].replies[0].viewer_has_liked);
    }

    #[tokio::test]
    async fn anonymous_viewer_never_flagged() {
        let (repo, top, _) = seeded().await;
        repo.insert_like(top, "u-x").await.unwrap();

        let mut tree = build_tree(repo.list_by_subject("car-1").await.unwrap());
        annotate(&mut tree, None, &repo).await.unwrap();

        assert_eq!(tree[0].comment.like_count, 1);
        assert!(!tree[0].comment.viewer_has_liked);
    }
}
