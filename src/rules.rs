//! Business-rule checks that run before any store write. All of them operate
//! on rows the service has already fetched, so they stay synchronous and
//! directly testable.

use crate::error::EngineError;
use crate::models::{Comment, Id};

/// Content is bounded in Unicode scalar values, not bytes.
pub const MAX_CONTENT_CHARS: usize = 500;

pub fn validate_content(content: &str) -> Result<(), EngineError> {
    if content.trim().is_empty() {
        return Err(EngineError::ContentEmpty);
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(EngineError::ContentTooLong);
    }
    Ok(())
}

/// Where a reply actually attaches, after depth flattening.
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedParent {
    /// Top-level comment the reply will hang off.
    pub effective_parent: Id,
    /// Set when the requested parent was itself a reply: the author the new
    /// comment addresses, preserved as a leading `@handle` token.
    pub addressed_author: Option<String>,
}

/// Resolve the requested parent to a top-level attachment point. The tree
/// never grows past one level of replies: replying to a reply re-parents to
/// that reply's top-level ancestor.
pub fn resolve_parent(parent: &Comment, subject_id: &str) -> Result<ResolvedParent, EngineError> {
    if parent.subject_id != subject_id || !parent.is_live() {
        return Err(EngineError::InvalidParent);
    }
    match parent.parent_id {
        None => Ok(ResolvedParent {
            effective_parent: parent.id,
            addressed_author: None,
        }),
        Some(ancestor) => Ok(ResolvedParent {
            effective_parent: ancestor,
            addressed_author: Some(parent.author_id.clone()),
        }),
    }
}

/// Prefix the addressed user's handle so the flattened reply still reads as
/// directed at its original target. The UI may have pre-filled the mention.
pub fn with_mention(content: String, addressed: &str) -> String {
    let token = format!("@{addressed}");
    if content.starts_with(&token) {
        content
    } else {
        format!("{token} {content}")
    }
}

/// The subject owner gets at most one live top-level comment; replies are
/// unrestricted. The store runs this inside its atomic insert so the rule
/// holds under concurrent adds.
pub fn check_owner_limit<'a>(
    existing: impl IntoIterator<Item = &'a Comment>,
    owner_id: &str,
    author_id: &str,
) -> Result<(), EngineError> {
    if author_id != owner_id {
        return Ok(());
    }
    let already = existing
        .into_iter()
        .any(|c| c.is_top_level() && c.is_live() && c.author_id == author_id);
    if already {
        Err(EngineError::OwnerCommentLimitExceeded)
    } else {
        Ok(())
    }
}

/// Delete: comment author or subject owner.
pub fn authorize_delete(
    comment: &Comment,
    requester_id: &str,
    subject_owner_id: &str,
) -> Result<(), EngineError> {
    if requester_id == comment.author_id || requester_id == subject_owner_id {
        Ok(())
    } else {
        Err(EngineError::Unauthorized)
    }
}

/// Pin: subject owner only, and only live top-level comments are pinnable.
pub fn authorize_pin(
    comment: &Comment,
    requester_id: &str,
    subject_owner_id: &str,
) -> Result<(), EngineError> {
    if requester_id != subject_owner_id {
        return Err(EngineError::Unauthorized);
    }
    if !comment.is_top_level() || !comment.is_live() {
        return Err(EngineError::NotPinnable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment(id: Id, subject: &str, author: &str, parent: Option<Id>) -> Comment {
        Comment {
            id,
            subject_id: subject.into(),
            author_id: author.into(),
            content: "hello".into(),
            parent_id: parent,
            is_pinned: false,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn content_bounds() {
        assert!(matches!(
            validate_content("   "),
            Err(EngineError::ContentEmpty)
        ));
        let long: String = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(matches!(
            validate_content(&long),
            Err(EngineError::ContentTooLong)
        ));
        // counted in code points: 500 multibyte chars are fine
        let wide: String = "ä".repeat(MAX_CONTENT_CHARS);
        assert!(validate_content(&wide).is_ok());
    }

    #[test]
    fn parent_resolution_flattens_replies() {
        let top = comment(1, "car-1", "u-a", None);
        let reply = comment(2, "car-1", "u-b", Some(1));

        let r = resolve_parent(&top, "car-1").unwrap();
        assert_eq!(r.effective_parent, 1);
        assert!(r.addressed_author.is_none());

        let r = resolve_parent(&reply, "car-1").unwrap();
        assert_eq!(r.effective_parent, 1);
        assert_eq!(r.addressed_author.as_deref(), Some("u-b"));
    }

    #[test]
    fn parent_in_other_subject_rejected() {
        let other = comment(1, "car-2", "u-a", None);
        assert!(matches!(
            resolve_parent(&other, "car-1"),
            Err(EngineError::InvalidParent)
        ));
    }

    #[test]
    fn deleted_parent_rejected() {
        let mut dead = comment(1, "car-1", "u-a", None);
        dead.deleted_at = Some(Utc::now());
        assert!(matches!(
            resolve_parent(&dead, "car-1"),
            Err(EngineError::InvalidParent)
        ));
    }

    #[test]
    fn mention_not_duplicated() {
        assert_eq!(with_mention("nice".into(), "u-b"), "@u-b nice");
        assert_eq!(with_mention("@u-b nice".into(), "u-b"), "@u-b nice");
    }

    #[test]
    fn owner_limit_only_counts_live_top_level() {
        let existing = vec![
            comment(1, "car-1", "u-owner", Some(5)), // reply: does not count
            {
                let mut c = comment(2, "car-1", "u-owner", None);
                c.deleted_at = Some(Utc::now()); // deleted: slot freed
                c
            },
        ];
        assert!(check_owner_limit(&existing, "u-owner", "u-owner").is_ok());

        let existing = vec![comment(3, "car-1", "u-owner", None)];
        assert!(matches!(
            check_owner_limit(&existing, "u-owner", "u-owner"),
            Err(EngineError::OwnerCommentLimitExceeded)
        ));
        // non-owners are never limited
        assert!(check_owner_limit(&existing, "u-owner", "u-other").is_ok());
    }

    #[test]
    fn delete_and_pin_authorization() {
        let c = comment(1, "car-1", "u-author", None);
        assert!(authorize_delete(&c, "u-author", "u-owner").is_ok());
        assert!(authorize_delete(&c, "u-owner", "u-owner").is_ok());
        assert!(matches!(
            authorize_delete(&c, "u-random", "u-owner"),
            Err(EngineError::Unauthorized)
        ));

        assert!(authorize_pin(&c, "u-owner", "u-owner").is_ok());
        assert!(matches!(
            authorize_pin(&c, "u-author", "u-owner"),
            Err(EngineError::Unauthorized)
        ));
        let reply = comment(2, "car-1", "u-author", Some(1));
        assert!(matches!(
            authorize_pin(&reply, "u-owner", "u-owner"),
            Err(EngineError::NotPinnable)
        ));
    }
}
