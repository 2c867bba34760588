use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// An item a comment thread hangs off (e.g. a car listing). The surrounding
/// app owns subject lifecycle; the engine only needs the owner for
/// authorization and the single-top-level-comment rule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Subject {
    pub id: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Comment {
    pub id: Id,
    pub subject_id: String,
    pub author_id: String,
    pub content: String,
    pub parent_id: Option<Id>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>, // soft delete marker
}

impl Comment {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Insert command; id, created_at and the pin flag are assigned by the store.
/// `parent_id` is the *effective* parent (already flattened by the rules).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub subject_id: String,
    pub author_id: String,
    pub content: String,
    pub parent_id: Option<Id>,
}

/// Read-model of a single comment as served to clients. Deleted comments keep
/// their slot in the tree as a redacted placeholder shell.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentView {
    pub id: Id,
    pub subject_id: String,
    pub author_id: String,
    pub content: String,
    pub parent_id: Option<Id>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
    pub like_count: i64,
    pub viewer_has_liked: bool,
}

impl From<&Comment> for CommentView {
    fn from(c: &Comment) -> Self {
        let deleted = !c.is_live();
        CommentView {
            id: c.id,
            subject_id: c.subject_id.clone(),
            author_id: c.author_id.clone(),
            // content is redacted on the shell; clients render a placeholder
            content: if deleted { String::new() } else { c.content.clone() },
            parent_id: c.parent_id,
            is_pinned: c.is_pinned,
            created_at: c.created_at,
            deleted,
            like_count: 0,
            viewer_has_liked: false,
        }
    }
}

/// One top-level comment with its flat list of replies (display depth is
/// capped at two levels).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThreadNode {
    pub comment: CommentView,
    pub replies: Vec<CommentView>,
}
