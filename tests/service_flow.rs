#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use paddock::error::EngineError;
use paddock::models::{NewComment, Subject};
use paddock::repo::inmem::InMemRepo;
use paddock::repo::LikeRepo;
use paddock::service::EngagementService;

/// Fresh service over an ephemeral in-memory store with `car-1` registered
/// to `u-owner`.
async fn service() -> EngagementService {
    let svc = EngagementService::new(Arc::new(InMemRepo::ephemeral()));
    svc.register_subject(Subject {
        id: "car-1".into(),
        owner_id: "u-owner".into(),
    })
    .await
    .unwrap();
    svc
}

fn new_comment(author: &str, content: &str, parent: Option<i64>) -> NewComment {
    NewComment {
        subject_id: "car-1".into(),
        author_id: author.into(),
        content: content.into(),
        parent_id: parent,
    }
}

#[tokio::test]
async fn scenario_owner_thread_lifecycle() {
    let svc = service().await;

    let c1 = svc
        .add_comment(new_comment("u-owner", "hello", None))
        .await
        .unwrap();

    let err = svc
        .add_comment(new_comment("u-owner", "again", None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::OwnerCommentLimitExceeded));

    let reply = svc
        .add_comment(new_comment("u-other", "nice car", Some(c1.id)))
        .await
        .unwrap();
    assert_eq!(reply.parent_id, Some(c1.id));

    svc.pin_comment(c1.id, "u-owner").await.unwrap();

    let tree = svc.list_thread("car-1", None).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].comment.id, c1.id);
    assert!(tree[0].comment.is_pinned);
    assert_eq!(tree[0].replies.len(), 1);
    assert_eq!(tree[0].replies[0].id, reply.id);
}

#[tokio::test]
async fn concurrent_owner_comments_admit_exactly_one() {
    let svc = service().await;
    // both calls pass any pre-read; the store's atomic insert must still
    // admit only one live top-level owner comment
    let (a, b) = tokio::join!(
        svc.add_comment(new_comment("u-owner", "first attempt", None)),
        svc.add_comment(new_comment("u-owner", "second attempt", None)),
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let err = if a.is_err() {
        a.unwrap_err()
    } else {
        b.unwrap_err()
    };
    assert!(matches!(err, EngineError::OwnerCommentLimitExceeded));

    let tree = svc.list_thread("car-1", None).await.unwrap();
    assert_eq!(tree.len(), 1);
}

#[tokio::test]
async fn owner_may_reply_without_limit() {
    let svc = service().await;
    let top = svc
        .add_comment(new_comment("u-a", "first", None))
        .await
        .unwrap();
    let owner_top = svc
        .add_comment(new_comment("u-owner", "mine", None))
        .await
        .unwrap();
    // replies are unrestricted for the owner even with a live top-level comment
    svc.add_comment(new_comment("u-owner", "thanks", Some(top.id)))
        .await
        .unwrap();
    svc.add_comment(new_comment("u-owner", "more thanks", Some(top.id)))
        .await
        .unwrap();
    // deleting the top-level comment frees the slot
    svc.delete_comment(owner_top.id, "u-owner").await.unwrap();
    svc.add_comment(new_comment("u-owner", "mine again", None))
        .await
        .unwrap();
}

#[tokio::test]
async fn reply_to_reply_is_flattened_with_mention() {
    let svc = service().await;
    let a = svc
        .add_comment(new_comment("u-a", "top", None))
        .await
        .unwrap();
    let b = svc
        .add_comment(new_comment("u-b", "reply to a", Some(a.id)))
        .await
        .unwrap();
    let c = svc
        .add_comment(new_comment("u-c", "reply to b", Some(b.id)))
        .await
        .unwrap();

    assert_eq!(c.parent_id, Some(a.id));
    assert!(c.content.starts_with("@u-b"));

    let tree = svc.list_thread("car-1", None).await.unwrap();
    assert_eq!(tree.len(), 1);
    let reply_ids: Vec<_> = tree[0].replies.iter().map(|r| r.id).collect();
    assert_eq!(reply_ids, vec![b.id, c.id]);

    // pre-filled mention is not duplicated
    let d = svc
        .add_comment(new_comment("u-d", "@u-b agreed", Some(b.id)))
        .await
        .unwrap();
    assert_eq!(d.content, "@u-b agreed");
}

#[tokio::test]
async fn mention_prefix_counts_toward_content_bound() {
    let svc = service().await;
    let top = svc
        .add_comment(new_comment("u-a", "top", None))
        .await
        .unwrap();
    let mid = svc
        .add_comment(new_comment("u-b", "mid", Some(top.id)))
        .await
        .unwrap();

    let full = "x".repeat(500);
    // a direct reply at the bound is fine
    svc.add_comment(new_comment("u-c", &full, Some(top.id)))
        .await
        .unwrap();
    // flattening prepends "@u-b " and pushes the same content over the bound
    let err = svc
        .add_comment(new_comment("u-d", &full, Some(mid.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ContentTooLong));
}

#[tokio::test]
async fn invalid_parents_rejected() {
    let svc = service().await;
    let err = svc
        .add_comment(new_comment("u-a", "hi", Some(999)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParent));

    // parent must live in the same subject
    svc.register_subject(Subject {
        id: "car-2".into(),
        owner_id: "u-owner".into(),
    })
    .await
    .unwrap();
    let other = svc
        .add_comment(NewComment {
            subject_id: "car-2".into(),
            author_id: "u-a".into(),
            content: "elsewhere".into(),
            parent_id: None,
        })
        .await
        .unwrap();
    let err = svc
        .add_comment(new_comment("u-b", "cross-subject", Some(other.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParent));

    // deleted parents are not addressable
    let dead = svc
        .add_comment(new_comment("u-a", "soon gone", None))
        .await
        .unwrap();
    svc.delete_comment(dead.id, "u-a").await.unwrap();
    let err = svc
        .add_comment(new_comment("u-b", "too late", Some(dead.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParent));
}

#[tokio::test]
async fn content_bounds_enforced_before_write() {
    let svc = service().await;
    assert!(matches!(
        svc.add_comment(new_comment("u-a", "   ", None)).await,
        Err(EngineError::ContentEmpty)
    ));
    let long = "x".repeat(501);
    assert!(matches!(
        svc.add_comment(new_comment("u-a", &long, None)).await,
        Err(EngineError::ContentTooLong)
    ));
    // nothing was written
    assert!(svc.list_thread("car-1", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn like_is_a_set_membership_toggle() {
    let svc = service().await;
    let c = svc
        .add_comment(new_comment("u-a", "likeable", None))
        .await
        .unwrap();

    svc.like_comment(c.id, "u-x").await.unwrap();
    svc.like_comment(c.id, "u-x").await.unwrap(); // double-click: no-op success

    let tree = svc.list_thread("car-1", Some("u-x")).await.unwrap();
    assert_eq!(tree[0].comment.like_count, 1);
    assert!(tree[0].comment.viewer_has_liked);

    svc.unlike_comment(c.id, "u-x").await.unwrap();
    svc.unlike_comment(c.id, "u-x").await.unwrap(); // never goes negative

    let tree = svc.list_thread("car-1", Some("u-x")).await.unwrap();
    assert_eq!(tree[0].comment.like_count, 0);
    assert!(!tree[0].comment.viewer_has_liked);

    assert!(matches!(
        svc.like_comment(999, "u-x").await,
        Err(EngineError::NotFound)
    ));
}

#[tokio::test]
async fn add_then_list_round_trip() {
    let svc = service().await;
    let c = svc
        .add_comment(new_comment("u-a", "fresh", None))
        .await
        .unwrap();
    let tree = svc.list_thread("car-1", Some("u-any")).await.unwrap();
    assert_eq!(tree[0].comment.id, c.id);
    assert_eq!(tree[0].comment.like_count, 0);
    assert!(!tree[0].comment.viewer_has_liked);
}

#[tokio::test]
async fn at_most_one_pin_survives_any_sequence() {
    let svc = service().await;
    let c1 = svc
        .add_comment(new_comment("u-a", "one", None))
        .await
        .unwrap();
    let c2 = svc
        .add_comment(new_comment("u-b", "two", None))
        .await
        .unwrap();

    svc.pin_comment(c1.id, "u-owner").await.unwrap();
    svc.pin_comment(c2.id, "u-owner").await.unwrap(); // last writer wins

    let tree = svc.list_thread("car-1", None).await.unwrap();
    let pinned: Vec<_> = tree
        .iter()
        .filter(|n| n.comment.is_pinned)
        .map(|n| n.comment.id)
        .collect();
    assert_eq!(pinned, vec![c2.id]);
    // pinned node sorts first despite being newer
    assert_eq!(tree[0].comment.id, c2.id);

    svc.unpin_comment("car-1", "u-owner").await.unwrap();
    let tree = svc.list_thread("car-1", None).await.unwrap();
    assert!(tree.iter().all(|n| !n.comment.is_pinned));
}

#[tokio::test]
async fn pin_authorization_and_pinnability() {
    let svc = service().await;
    let top = svc
        .add_comment(new_comment("u-a", "top", None))
        .await
        .unwrap();
    let reply = svc
        .add_comment(new_comment("u-b", "reply", Some(top.id)))
        .await
        .unwrap();

    assert!(matches!(
        svc.pin_comment(top.id, "u-a").await,
        Err(EngineError::Unauthorized)
    ));
    assert!(matches!(
        svc.pin_comment(reply.id, "u-owner").await,
        Err(EngineError::NotPinnable)
    ));
    assert!(matches!(
        svc.unpin_comment("car-1", "u-b").await,
        Err(EngineError::Unauthorized)
    ));
}

#[tokio::test]
async fn delete_authorization() {
    let svc = service().await;
    let c = svc
        .add_comment(new_comment("u-a", "target", None))
        .await
        .unwrap();

    assert!(matches!(
        svc.delete_comment(c.id, "u-random").await,
        Err(EngineError::Unauthorized)
    ));
    // the subject owner may remove anyone's comment
    svc.delete_comment(c.id, "u-owner").await.unwrap();
    // gone from mutations afterwards
    assert!(matches!(
        svc.delete_comment(c.id, "u-owner").await,
        Err(EngineError::NotFound)
    ));
}

#[tokio::test]
async fn soft_delete_leaves_placeholder_shell() {
    let svc = service().await;
    let top = svc
        .add_comment(new_comment("u-a", "parent", None))
        .await
        .unwrap();
    let reply = svc
        .add_comment(new_comment("u-b", "child", Some(top.id)))
        .await
        .unwrap();
    svc.like_comment(top.id, "u-x").await.unwrap();
    svc.pin_comment(top.id, "u-owner").await.unwrap();

    svc.delete_comment(top.id, "u-a").await.unwrap();

    let tree = svc.list_thread("car-1", Some("u-x")).await.unwrap();
    assert_eq!(tree.len(), 1);
    let shell = &tree[0].comment;
    assert!(shell.deleted);
    assert!(shell.content.is_empty());
    assert!(!shell.is_pinned); // pin cleared with the delete
    assert_eq!(shell.like_count, 0); // like rows removed with the delete
    assert!(!shell.viewer_has_liked);
    assert_eq!(tree[0].replies[0].id, reply.id);

    // like rows are really gone, not just hidden
    let counts = svc.repo().like_counts(&[top.id]).await.unwrap();
    assert!(counts.is_empty());

    // a shell with no replies disappears entirely
    let lone = svc
        .add_comment(new_comment("u-c", "alone", None))
        .await
        .unwrap();
    svc.delete_comment(lone.id, "u-c").await.unwrap();
    let tree = svc.list_thread("car-1", None).await.unwrap();
    assert!(tree.iter().all(|n| n.comment.id != lone.id));
}

#[tokio::test]
async fn unregistered_subject_is_not_found() {
    let svc = service().await;
    assert!(matches!(
        svc.list_thread("car-unknown", None).await,
        Err(EngineError::NotFound)
    ));
    assert!(matches!(
        svc.add_comment(NewComment {
            subject_id: "car-unknown".into(),
            author_id: "u-a".into(),
            content: "hi".into(),
            parent_id: None,
        })
        .await,
        Err(EngineError::NotFound)
    ));
}
