use std::collections::{HashMap, HashSet};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("owner already has a live top-level comment")]
    OwnerLimit,
    #[error("storage: {0}")]
    Storage(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait SubjectRepo: Send + Sync {
    async fn upsert_subject(&self, subject: Subject) -> RepoResult<Subject>;
    async fn get_subject(&self, id: &str) -> RepoResult<Subject>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Assigns id and created_at; the row either fully exists afterwards or
    /// not at all. A top-level insert by the subject owner checks the
    /// single-comment rule inside the same atomic unit, so two concurrent
    /// owner adds can never both land (`OwnerLimit` for the loser).
    async fn insert_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// All rows for a subject, live and shells, unordered. Ordering is the
    /// tree builder's job.
    async fn list_by_subject(&self, subject_id: &str) -> RepoResult<Vec<Comment>>;
    /// Marks the row deleted, clears its pin and removes its like rows in one
    /// atomic unit. `NotFound` when absent or already deleted.
    async fn soft_delete_comment(&self, id: Id) -> RepoResult<()>;
    /// Clears the pin on every other comment of the subject and sets it on
    /// the target in one atomic unit. Last writer wins; there is never a
    /// state with two pinned rows.
    async fn set_pinned(&self, subject_id: &str, comment_id: Option<Id>) -> RepoResult<()>;
}

#[async_trait]
pub trait LikeRepo: Send + Sync {
    /// Idempotent: liking an already-liked comment is a no-op success.
    async fn insert_like(&self, comment_id: Id, user_id: &str) -> RepoResult<()>;
    /// Idempotent removal.
    async fn delete_like(&self, comment_id: Id, user_id: &str) -> RepoResult<()>;
    /// Batched count per comment; one round trip for a whole tree.
    async fn like_counts(&self, comment_ids: &[Id]) -> RepoResult<HashMap<Id, i64>>;
    /// Batched membership check for a single viewer.
    async fn liked_by(&self, user_id: &str, comment_ids: &[Id]) -> RepoResult<HashSet<Id>>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> RepoResult<()>;
}

pub trait EngagementRepo: SubjectRepo + CommentRepo + LikeRepo + HealthRepo {}

impl<T> EngagementRepo for T where T: SubjectRepo + CommentRepo + LikeRepo + HealthRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        subjects: HashMap<String, Subject>,
        comments: HashMap<Id, Comment>,
        likes: HashSet<(Id, String)>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("PADDOCK_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to parse snapshot '{}': {e}; starting empty",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("no snapshot at '{}': {e}; starting empty", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = &self.snapshot_path else {
                return;
            };
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&**path, s) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(snapshot_path)),
            }
        }

        /// Purely in-memory instance; no snapshot is loaded or written. Tests
        /// use this so parallel runs never share state through the filesystem.
        pub fn ephemeral() -> Self {
            Self {
                state: Arc::new(RwLock::new(State::default())),
                snapshot_path: None,
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl SubjectRepo for InMemRepo {
        async fn upsert_subject(&self, subject: Subject) -> RepoResult<Subject> {
            let mut s = self.state.write().unwrap();
            s.subjects.insert(subject.id.clone(), subject.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(subject)
        }

        async fn get_subject(&self, id: &str) -> RepoResult<Subject> {
            let s = self.state.read().unwrap();
            s.subjects.get(id).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn insert_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let owner_id = match s.subjects.get(&new.subject_id) {
                Some(subject) => subject.owner_id.clone(),
                None => return Err(RepoError::NotFound),
            };
            if new.parent_id.is_none() {
                // the owner rule must hold under concurrent adds, so it is
                // checked under the same write lock as the insert
                let peers = s.comments.values().filter(|c| c.subject_id == new.subject_id);
                if crate::rules::check_owner_limit(peers, &owner_id, &new.author_id).is_err() {
                    return Err(RepoError::OwnerLimit);
                }
            }
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                subject_id: new.subject_id,
                author_id: new.author_id,
                content: new.content,
                parent_id: new.parent_id,
                is_pinned: false,
                created_at: Utc::now(),
                deleted_at: None,
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let s = self.state.read().unwrap();
            s.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_by_subject(&self, subject_id: &str) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            Ok(s.comments
                .values()
                .filter(|c| c.subject_id == subject_id)
                .cloned()
                .collect())
        }

        async fn soft_delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            if !comment.is_live() {
                return Err(RepoError::NotFound);
            }
            comment.deleted_at = Some(Utc::now());
            comment.is_pinned = false;
            s.likes.retain(|(cid, _)| *cid != id);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn set_pinned(&self, subject_id: &str, comment_id: Option<Id>) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if let Some(id) = comment_id {
                let target = s.comments.get(&id).ok_or(RepoError::NotFound)?;
                if target.subject_id != subject_id || !target.is_live() {
                    return Err(RepoError::NotFound);
                }
            }
            // clear-and-set under one write lock: never zero-and-two pinned
            for c in s.comments.values_mut().filter(|c| c.subject_id == subject_id) {
                c.is_pinned = comment_id == Some(c.id);
            }
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl LikeRepo for InMemRepo {
        async fn insert_like(&self, comment_id: Id, user_id: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            match s.comments.get(&comment_id) {
                Some(c) if c.is_live() => {}
                _ => return Err(RepoError::NotFound),
            }
            s.likes.insert((comment_id, user_id.to_string()));
            drop(s);
            self.persist();
            Ok(())
        }

        async fn delete_like(&self, comment_id: Id, user_id: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if !s.comments.contains_key(&comment_id) {
                return Err(RepoError::NotFound);
            }
            s.likes.remove(&(comment_id, user_id.to_string()));
            drop(s);
            self.persist();
            Ok(())
        }

        async fn like_counts(&self, comment_ids: &[Id]) -> RepoResult<HashMap<Id, i64>> {
            let s = self.state.read().unwrap();
            let wanted: HashSet<Id> = comment_ids.iter().copied().collect();
            let mut counts = HashMap::new();
            for (cid, _) in s.likes.iter().filter(|(cid, _)| wanted.contains(cid)) {
                *counts.entry(*cid).or_insert(0) += 1;
            }
            Ok(counts)
        }

        async fn liked_by(&self, user_id: &str, comment_ids: &[Id]) -> RepoResult<HashSet<Id>> {
            let s = self.state.read().unwrap();
            let wanted: HashSet<Id> = comment_ids.iter().copied().collect();
            Ok(s.likes
                .iter()
                .filter(|(cid, uid)| wanted.contains(cid) && uid == user_id)
                .map(|(cid, _)| *cid)
                .collect())
        }
    }

    #[async_trait]
    impl HealthRepo for InMemRepo {
        async fn ping(&self) -> RepoResult<()> {
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => RepoError::Storage(other.to_string()),
        }
    }

    const COMMENT_COLS: &str =
        "id, subject_id, author_id, content, parent_id, is_pinned, created_at, deleted_at";

    #[async_trait]
    impl SubjectRepo for PgRepo {
        async fn upsert_subject(&self, subject: Subject) -> RepoResult<Subject> {
            sqlx::query_as::<_, Subject>(
                "INSERT INTO subjects (id, owner_id) VALUES ($1, $2)
                 ON CONFLICT (id) DO UPDATE SET owner_id = EXCLUDED.owner_id
                 RETURNING id, owner_id",
            )
            .bind(&subject.id)
            .bind(&subject.owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn get_subject(&self, id: &str) -> RepoResult<Subject> {
            sqlx::query_as::<_, Subject>("SELECT id, owner_id FROM subjects WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn insert_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let owner = sqlx::query_as::<_, (String,)>(
                "SELECT owner_id FROM subjects WHERE id = $1",
            )
            .bind(&new.subject_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?;
            let Some((owner_id,)) = owner else {
                return Err(RepoError::NotFound);
            };
            if new.parent_id.is_none() && new.author_id == owner_id {
                // serialize competing owner adds on the subject row; the
                // existence check below then runs race-free in this tx
                sqlx::query("SELECT 1 FROM subjects WHERE id = $1 FOR UPDATE")
                    .bind(&new.subject_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
                let taken = sqlx::query(
                    "SELECT 1 FROM comments
                     WHERE subject_id = $1 AND author_id = $2
                       AND parent_id IS NULL AND deleted_at IS NULL",
                )
                .bind(&new.subject_id)
                .bind(&new.author_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_err)?;
                if taken.is_some() {
                    return Err(RepoError::OwnerLimit);
                }
            }
            let comment = sqlx::query_as::<_, Comment>(&format!(
                "INSERT INTO comments (subject_id, author_id, content, parent_id)
                 VALUES ($1, $2, $3, $4) RETURNING {COMMENT_COLS}"
            ))
            .bind(&new.subject_id)
            .bind(&new.author_id)
            .bind(&new.content)
            .bind(new.parent_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(comment)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(&format!(
                "SELECT {COMMENT_COLS} FROM comments WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn list_by_subject(&self, subject_id: &str) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(&format!(
                "SELECT {COMMENT_COLS} FROM comments WHERE subject_id = $1"
            ))
            .bind(subject_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
        }

        async fn soft_delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let updated = sqlx::query(
                "UPDATE comments SET deleted_at = now(), is_pinned = FALSE
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
            if updated.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            tx.commit().await.map_err(map_err)
        }

        async fn set_pinned(&self, subject_id: &str, comment_id: Option<Id>) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            if let Some(id) = comment_id {
                // lock the target row so concurrent pins serialize on it
                let target = sqlx::query(
                    "SELECT id FROM comments
                     WHERE id = $1 AND subject_id = $2 AND deleted_at IS NULL FOR UPDATE",
                )
                .bind(id)
                .bind(subject_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_err)?;
                if target.is_none() {
                    return Err(RepoError::NotFound);
                }
            }
            // clear before set: the partial unique index on pinned rows is
            // checked per updated row, so a single conditional UPDATE could
            // raise the new pin before dropping the old one and abort
            sqlx::query(
                "UPDATE comments SET is_pinned = FALSE
                 WHERE subject_id = $1 AND is_pinned",
            )
            .bind(subject_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
            if let Some(id) = comment_id {
                sqlx::query("UPDATE comments SET is_pinned = TRUE WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
            }
            tx.commit().await.map_err(map_err)
        }
    }

    #[async_trait]
    impl LikeRepo for PgRepo {
        async fn insert_like(&self, comment_id: Id, user_id: &str) -> RepoResult<()> {
            // membership toggle, not a counter: ON CONFLICT makes retries safe
            let inserted = sqlx::query(
                "INSERT INTO comment_likes (comment_id, user_id)
                 SELECT id, $2 FROM comments WHERE id = $1 AND deleted_at IS NULL
                 ON CONFLICT (comment_id, user_id) DO NOTHING",
            )
            .bind(comment_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
            if inserted.rows_affected() == 0 {
                // conflict (already liked) and missing comment both report 0;
                // disambiguate with one lookup
                let exists = sqlx::query(
                    "SELECT 1 FROM comments WHERE id = $1 AND deleted_at IS NULL",
                )
                .bind(comment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
                if exists.is_none() {
                    return Err(RepoError::NotFound);
                }
            }
            Ok(())
        }

        async fn delete_like(&self, comment_id: Id, user_id: &str) -> RepoResult<()> {
            let exists = sqlx::query("SELECT 1 FROM comments WHERE id = $1")
                .bind(comment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
            if exists.is_none() {
                return Err(RepoError::NotFound);
            }
            sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
                .bind(comment_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(map_err)?;
            Ok(())
        }

        async fn like_counts(&self, comment_ids: &[Id]) -> RepoResult<HashMap<Id, i64>> {
            let rows = sqlx::query_as::<_, (Id, i64)>(
                "SELECT comment_id, COUNT(*) FROM comment_likes
                 WHERE comment_id = ANY($1) GROUP BY comment_id",
            )
            .bind(comment_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(rows.into_iter().collect())
        }

        async fn liked_by(&self, user_id: &str, comment_ids: &[Id]) -> RepoResult<HashSet<Id>> {
            let rows = sqlx::query_as::<_, (Id,)>(
                "SELECT comment_id FROM comment_likes
                 WHERE user_id = $1 AND comment_id = ANY($2)",
            )
            .bind(user_id)
            .bind(comment_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
            Ok(rows.into_iter().map(|(id,)| id).collect())
        }
    }

    #[async_trait]
    impl HealthRepo for PgRepo {
        async fn ping(&self) -> RepoResult<()> {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(map_err)
        }
    }
}
