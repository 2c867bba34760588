//! Named command handlers. Each mutation does an explicit pre-validation step
//! against fetched rows, then a single store write; reads assemble the
//! annotated tree. Decoupled from the HTTP layer so the reconciliation
//! client and tests can drive it directly.

use std::sync::Arc;

use tracing::{debug, info};

use crate::engagement::annotate;
use crate::error::EngineError;
use crate::models::{Comment, Id, NewComment, Subject, ThreadNode};
use crate::repo::{EngagementRepo, RepoError};
use crate::rules;
use crate::tree::build_tree;

#[derive(Clone)]
pub struct EngagementService {
    repo: Arc<dyn EngagementRepo>,
}

impl EngagementService {
    pub fn new(repo: Arc<dyn EngagementRepo>) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &Arc<dyn EngagementRepo> {
        &self.repo
    }

    pub async fn register_subject(&self, subject: Subject) -> Result<Subject, EngineError> {
        Ok(self.repo.upsert_subject(subject).await?)
    }

    pub async fn add_comment(&self, mut new: NewComment) -> Result<Comment, EngineError> {
        self.get_subject(&new.subject_id).await?;
        rules::validate_content(&new.content)?;

        if let Some(parent_id) = new.parent_id {
            let parent = match self.repo.get_comment(parent_id).await {
                Ok(c) => c,
                Err(RepoError::NotFound) => return Err(EngineError::InvalidParent),
                Err(e) => return Err(e.into()),
            };
            let resolved = rules::resolve_parent(&parent, &new.subject_id)?;
            if resolved.effective_parent != parent.id {
                // flattened: the top-level ancestor must itself be addressable
                let ancestor = match self.repo.get_comment(resolved.effective_parent).await {
                    Ok(c) => c,
                    Err(RepoError::NotFound) => return Err(EngineError::InvalidParent),
                    Err(e) => return Err(e.into()),
                };
                if !ancestor.is_live() || ancestor.subject_id != new.subject_id {
                    return Err(EngineError::InvalidParent);
                }
            }
            if let Some(addressed) = &resolved.addressed_author {
                new.content = rules::with_mention(new.content, addressed);
                // the mention prefix counts toward the content bound
                rules::validate_content(&new.content)?;
            }
            new.parent_id = Some(resolved.effective_parent);
        }

        // the owner's single-comment rule is enforced inside the store's
        // atomic insert, not as a separate read
        let comment = self.repo.insert_comment(new).await?;
        info!(
            comment_id = comment.id,
            subject_id = %comment.subject_id,
            reply = comment.parent_id.is_some(),
            "comment created"
        );
        metrics::increment_counter!("paddock_comments_created_total");
        Ok(comment)
    }

    pub async fn delete_comment(&self, comment_id: Id, requester_id: &str) -> Result<(), EngineError> {
        let comment = self.get_live_comment(comment_id).await?;
        let subject = self.get_subject(&comment.subject_id).await?;
        rules::authorize_delete(&comment, requester_id, &subject.owner_id)?;
        self.repo.soft_delete_comment(comment_id).await?;
        info!(comment_id, requester_id, "comment deleted");
        metrics::increment_counter!("paddock_comments_deleted_total");
        Ok(())
    }

    pub async fn pin_comment(&self, comment_id: Id, requester_id: &str) -> Result<(), EngineError> {
        let comment = self.get_live_comment(comment_id).await?;
        let subject = self.get_subject(&comment.subject_id).await?;
        rules::authorize_pin(&comment, requester_id, &subject.owner_id)?;
        self.repo
            .set_pinned(&comment.subject_id, Some(comment_id))
            .await?;
        info!(comment_id, subject_id = %comment.subject_id, "comment pinned");
        metrics::increment_counter!("paddock_pins_total");
        Ok(())
    }

    pub async fn unpin_comment(&self, subject_id: &str, requester_id: &str) -> Result<(), EngineError> {
        let subject = self.get_subject(subject_id).await?;
        if requester_id != subject.owner_id {
            return Err(EngineError::Unauthorized);
        }
        self.repo.set_pinned(subject_id, None).await?;
        info!(subject_id, "subject unpinned");
        Ok(())
    }

    pub async fn like_comment(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError> {
        self.repo.insert_like(comment_id, user_id).await?;
        debug!(comment_id, user_id, "like recorded");
        metrics::increment_counter!("paddock_likes_total");
        Ok(())
    }

    pub async fn unlike_comment(&self, comment_id: Id, user_id: &str) -> Result<(), EngineError> {
        self.repo.delete_like(comment_id, user_id).await?;
        debug!(comment_id, user_id, "like removed");
        Ok(())
    }

    pub async fn list_thread(
        &self,
        subject_id: &str,
        viewer_id: Option<&str>,
    ) -> Result<Vec<ThreadNode>, EngineError> {
        self.get_subject(subject_id).await?;
        let comments = self.repo.list_by_subject(subject_id).await?;
        let mut tree = build_tree(comments);
        annotate(&mut tree, viewer_id, self.repo.as_ref()).await?;
        Ok(tree)
    }

    async fn get_subject(&self, id: &str) -> Result<Subject, EngineError> {
        Ok(self.repo.get_subject(id).await?)
    }

    /// Shells are invisible to mutations: a deleted comment reports NotFound.
    async fn get_live_comment(&self, id: Id) -> Result<Comment, EngineError> {
        let comment = self.repo.get_comment(id).await?;
        if !comment.is_live() {
            return Err(EngineError::NotFound);
        }
        Ok(comment)
    }
}
