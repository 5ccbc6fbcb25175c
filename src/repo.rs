use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

/// Persistence contract for threads and their messages. `append_message` is
/// the single commit point: it must record the message, its thread (created
/// when `thread_id` is absent) and its recipient associations atomically.
#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    async fn append_message(&self, new: NewMessage) -> RepoResult<Message>;
    async fn delete_thread(&self, id: Id) -> RepoResult<()>;
    async fn list_threads(&self, user_id: Id) -> RepoResult<Vec<ThreadSummary>>;
    /// First message id of the thread when `user_id` participates in it.
    async fn check_access(&self, thread_id: Id, user_id: Id) -> RepoResult<Option<Id>>;
    async fn mark_read(&self, thread_id: Id, user_id: Id) -> RepoResult<()>;
    async fn mark_unread(&self, thread_id: Id, user_id: Id) -> RepoResult<()>;
    async fn unread_count(&self, user_id: Id) -> RepoResult<i64>;
    async fn is_user_sender(&self, user_id: Id, message_id: Id) -> RepoResult<Option<Id>>;
    async fn message_sender(&self, message_id: Id) -> RepoResult<Option<Id>>;
    async fn is_valid_thread(&self, id: Id) -> RepoResult<Option<Id>>;
}

#[async_trait]
pub trait NoticeRepo: Send + Sync {
    async fn create_notice(
        &self,
        new: NewNotice,
        sent_at: chrono::DateTime<chrono::Utc>,
    ) -> RepoResult<Notice>;
    async fn list_notices(&self) -> RepoResult<Vec<Notice>>;
    /// Most recently sent notice that is still active.
    async fn active_notice(&self) -> RepoResult<Option<Notice>>;
    async fn deactivate_notice(&self, id: Id) -> RepoResult<Notice>;
}

/// Identity resolution substrate consumed by recipient resolution.
#[async_trait]
pub trait IdentityRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn resolve_by_login(&self, login: &str) -> RepoResult<Option<Id>>;
    async fn resolve_by_display(&self, key: &str) -> RepoResult<Option<Id>>;
    async fn exists_by_id(&self, id: Id) -> RepoResult<bool>;
}

pub trait Repo: ThreadRepo + NoticeRepo + IdentityRepo {}

impl<T> Repo for T where T: ThreadRepo + NoticeRepo + IdentityRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    #[derive(Clone, Serialize, Deserialize)]
    struct ThreadRecord {
        id: Id,
        recipients: Vec<Id>,
        messages: Vec<Message>,
        read_markers: HashMap<Id, DateTime<Utc>>,
    }

    impl ThreadRecord {
        fn unread_for(&self, user_id: Id) -> bool {
            match self.messages.last() {
                Some(last) => match self.read_markers.get(&user_id) {
                    Some(marker) => last.sent_at > *marker,
                    None => true,
                },
                None => false,
            }
        }

        fn summary_for(&self, user_id: Id) -> Option<ThreadSummary> {
            let first = self.messages.first()?;
            let last = self.messages.last()?;
            Some(ThreadSummary {
                id: self.id,
                subject: first.subject.clone(),
                last_sent_at: last.sent_at,
                message_count: self.messages.len() as i64,
                unread: self.unread_for(user_id),
            })
        }
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        threads: HashMap<Id, ThreadRecord>,
        notices: HashMap<Id, Notice>,
        next_id: Id,
    }

    impl State {
        fn find_message(&self, id: Id) -> Option<&Message> {
            self.threads
                .values()
                .flat_map(|t| t.messages.iter())
                .find(|m| m.id == id)
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            let dir = std::env::var("COURIER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"));
            dir.join("state.json")
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
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let state = self.state.read().unwrap();
            let Ok(bytes) = serde_json::to_vec_pretty(&*state) else {
                return;
            };
            drop(state);
            if let Some(dir) = self.snapshot_path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            if let Err(e) = std::fs::write(&*self.snapshot_path, bytes) {
                log::warn!(
                    "failed to write snapshot '{}': {e}",
                    self.snapshot_path.display()
                );
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
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
    impl ThreadRepo for InMemRepo {
        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let s = self.state.read().unwrap();
            let record = s.threads.get(&id).ok_or(RepoError::NotFound)?;
            Ok(Thread {
                id: record.id,
                recipients: record.recipients.clone(),
                messages: record.messages.clone(),
            })
        }

        async fn append_message(&self, new: NewMessage) -> RepoResult<Message> {
            let mut s = self.state.write().unwrap();
            let thread_id = match new.thread_id {
                Some(id) => {
                    if !s.threads.contains_key(&id) {
                        return Err(RepoError::NotFound);
                    }
                    id
                }
                None => {
                    let id = Self::next_id(&mut s);
                    s.threads.insert(
                        id,
                        ThreadRecord {
                            id,
                            recipients: Vec::new(),
                            messages: Vec::new(),
                            read_markers: HashMap::new(),
                        },
                    );
                    id
                }
            };
            let id = Self::next_id(&mut s);
            let message = Message {
                id,
                thread_id,
                sender_id: new.sender_id,
                subject: new.subject,
                body: new.body,
                sent_at: new.sent_at,
            };
            let record = s.threads.get_mut(&thread_id).ok_or(RepoError::NotFound)?;
            for user in new.recipients.iter().chain(std::iter::once(&new.sender_id)) {
                if !record.recipients.contains(user) {
                    record.recipients.push(*user);
                }
            }
            record.messages.push(message.clone());
            record.messages.sort_by_key(|m| m.sent_at);
            // the sender has seen their own message
            record.read_markers.insert(new.sender_id, message.sent_at);
            drop(s);
            self.persist();
            Ok(message)
        }

        async fn delete_thread(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.threads.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            drop(s);
            self.persist();
            Ok(())
        }

        async fn list_threads(&self, user_id: Id) -> RepoResult<Vec<ThreadSummary>> {
            let s = self.state.read().unwrap();
            let mut summaries: Vec<_> = s
                .threads
                .values()
                .filter(|t| t.recipients.contains(&user_id))
                .filter_map(|t| t.summary_for(user_id))
                .collect();
            summaries.sort_by(|a, b| b.last_sent_at.cmp(&a.last_sent_at));
            Ok(summaries)
        }

        async fn check_access(&self, thread_id: Id, user_id: Id) -> RepoResult<Option<Id>> {
            let s = self.state.read().unwrap();
            Ok(s.threads
                .get(&thread_id)
                .filter(|t| t.recipients.contains(&user_id))
                .and_then(|t| t.messages.first())
                .map(|m| m.id))
        }

        async fn mark_read(&self, thread_id: Id, user_id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let record = s.threads.get_mut(&thread_id).ok_or(RepoError::NotFound)?;
            record.read_markers.insert(user_id, Utc::now());
            drop(s);
            self.persist();
            Ok(())
        }

        async fn mark_unread(&self, thread_id: Id, user_id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let record = s.threads.get_mut(&thread_id).ok_or(RepoError::NotFound)?;
            record.read_markers.remove(&user_id);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn unread_count(&self, user_id: Id) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.threads
                .values()
                .filter(|t| t.recipients.contains(&user_id) && t.unread_for(user_id))
                .count() as i64)
        }

        async fn is_user_sender(&self, user_id: Id, message_id: Id) -> RepoResult<Option<Id>> {
            let s = self.state.read().unwrap();
            Ok(s.find_message(message_id)
                .filter(|m| m.sender_id == user_id)
                .map(|m| m.id))
        }

        async fn message_sender(&self, message_id: Id) -> RepoResult<Option<Id>> {
            let s = self.state.read().unwrap();
            Ok(s.find_message(message_id).map(|m| m.sender_id))
        }

        async fn is_valid_thread(&self, id: Id) -> RepoResult<Option<Id>> {
            let s = self.state.read().unwrap();
            Ok(s.threads.get(&id).map(|t| t.id))
        }
    }

    #[async_trait]
    impl NoticeRepo for InMemRepo {
        async fn create_notice(
            &self,
            new: NewNotice,
            sent_at: DateTime<Utc>,
        ) -> RepoResult<Notice> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let notice = Notice {
                id,
                subject: new.subject,
                body: new.body,
                sent_at,
                is_active: true,
            };
            s.notices.insert(id, notice.clone());
            drop(s);
            self.persist();
            Ok(notice)
        }

        async fn list_notices(&self) -> RepoResult<Vec<Notice>> {
            let s = self.state.read().unwrap();
            let mut notices: Vec<_> = s.notices.values().cloned().collect();
            notices.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
            Ok(notices)
        }

        async fn active_notice(&self) -> RepoResult<Option<Notice>> {
            let s = self.state.read().unwrap();
            Ok(s.notices
                .values()
                .filter(|n| n.is_active)
                .max_by(|a, b| a.sent_at.cmp(&b.sent_at).then(a.id.cmp(&b.id)))
                .cloned())
        }

        async fn deactivate_notice(&self, id: Id) -> RepoResult<Notice> {
            let mut s = self.state.write().unwrap();
            let notice = s.notices.get_mut(&id).ok_or(RepoError::NotFound)?;
            notice.is_active = false;
            let updated = notice.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl IdentityRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.login == new.login) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                login: new.login,
                display_name: new.display_name,
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn resolve_by_login(&self, login: &str) -> RepoResult<Option<Id>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.login == login).map(|u| u.id))
        }

        async fn resolve_by_display(&self, key: &str) -> RepoResult<Option<Id>> {
            let s = self.state.read().unwrap();
            // lowest id wins when display names collide
            Ok(s.users
                .values()
                .filter(|u| display_key(&u.display_name) == key)
                .map(|u| u.id)
                .min())
        }

        async fn exists_by_id(&self, id: Id) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            Ok(s.users.contains_key(&id))
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

    fn db_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref d) if d.code().as_deref() == Some("23505") => {
                RepoError::Conflict
            }
            other => RepoError::Internal(other.to_string()),
        }
    }

    #[async_trait]
    impl ThreadRepo for PgRepo {
        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let exists: Option<Id> = sqlx::query_scalar("SELECT id FROM threads WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            if exists.is_none() {
                return Err(RepoError::NotFound);
            }
            let recipients: Vec<Id> = sqlx::query_scalar(
                "SELECT user_id FROM thread_recipients WHERE thread_id = $1 ORDER BY user_id",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            let messages = sqlx::query_as::<_, Message>(
                "SELECT id, thread_id, sender_id, subject, body, sent_at \
                 FROM messages WHERE thread_id = $1 ORDER BY sent_at ASC, id ASC",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(Thread {
                id,
                recipients,
                messages,
            })
        }

        async fn append_message(&self, new: NewMessage) -> RepoResult<Message> {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let thread_id = match new.thread_id {
                Some(id) => {
                    let exists: Option<Id> =
                        sqlx::query_scalar("SELECT id FROM threads WHERE id = $1")
                            .bind(id)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(db_err)?;
                    exists.ok_or(RepoError::NotFound)?
                }
                None => sqlx::query_scalar("INSERT INTO threads DEFAULT VALUES RETURNING id")
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_err)?,
            };
            let message = sqlx::query_as::<_, Message>(
                "INSERT INTO messages (thread_id, sender_id, subject, body, sent_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, thread_id, sender_id, subject, body, sent_at",
            )
            .bind(thread_id)
            .bind(new.sender_id)
            .bind(&new.subject)
            .bind(&new.body)
            .bind(new.sent_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
            for user in new.recipients.iter().chain(std::iter::once(&new.sender_id)) {
                sqlx::query(
                    "INSERT INTO thread_recipients (thread_id, user_id) VALUES ($1, $2) \
                     ON CONFLICT DO NOTHING",
                )
                .bind(thread_id)
                .bind(*user)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            sqlx::query(
                "INSERT INTO read_markers (thread_id, user_id, last_read) VALUES ($1, $2, $3) \
                 ON CONFLICT (thread_id, user_id) DO UPDATE SET last_read = EXCLUDED.last_read",
            )
            .bind(thread_id)
            .bind(new.sender_id)
            .bind(message.sent_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(message)
        }

        async fn delete_thread(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM threads WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn list_threads(&self, user_id: Id) -> RepoResult<Vec<ThreadSummary>> {
            sqlx::query_as::<_, ThreadSummary>(
                "SELECT t.id, \
                        COALESCE((SELECT subject FROM messages \
                                  WHERE thread_id = t.id ORDER BY sent_at ASC, id ASC LIMIT 1), '') AS subject, \
                        MAX(m.sent_at) AS last_sent_at, \
                        COUNT(m.id) AS message_count, \
                        (rm.last_read IS NULL OR MAX(m.sent_at) > rm.last_read) AS unread \
                 FROM thread_recipients tr \
                 JOIN threads t ON t.id = tr.thread_id \
                 JOIN messages m ON m.thread_id = t.id \
                 LEFT JOIN read_markers rm ON rm.thread_id = t.id AND rm.user_id = tr.user_id \
                 WHERE tr.user_id = $1 \
                 GROUP BY t.id, rm.last_read \
                 ORDER BY last_sent_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn check_access(&self, thread_id: Id, user_id: Id) -> RepoResult<Option<Id>> {
            sqlx::query_scalar(
                "SELECT m.id FROM thread_recipients tr \
                 JOIN messages m ON m.thread_id = tr.thread_id \
                 WHERE tr.thread_id = $1 AND tr.user_id = $2 \
                 ORDER BY m.sent_at ASC, m.id ASC LIMIT 1",
            )
            .bind(thread_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn mark_read(&self, thread_id: Id, user_id: Id) -> RepoResult<()> {
            if self.is_valid_thread(thread_id).await?.is_none() {
                return Err(RepoError::NotFound);
            }
            sqlx::query(
                "INSERT INTO read_markers (thread_id, user_id, last_read) VALUES ($1, $2, now()) \
                 ON CONFLICT (thread_id, user_id) DO UPDATE SET last_read = now()",
            )
            .bind(thread_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        }

        async fn mark_unread(&self, thread_id: Id, user_id: Id) -> RepoResult<()> {
            if self.is_valid_thread(thread_id).await?.is_none() {
                return Err(RepoError::NotFound);
            }
            sqlx::query("DELETE FROM read_markers WHERE thread_id = $1 AND user_id = $2")
                .bind(thread_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(())
        }

        async fn unread_count(&self, user_id: Id) -> RepoResult<i64> {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM ( \
                     SELECT m.thread_id \
                     FROM thread_recipients tr \
                     JOIN messages m ON m.thread_id = tr.thread_id \
                     LEFT JOIN read_markers rm \
                            ON rm.thread_id = tr.thread_id AND rm.user_id = tr.user_id \
                     WHERE tr.user_id = $1 \
                     GROUP BY m.thread_id, rm.last_read \
                     HAVING rm.last_read IS NULL OR MAX(m.sent_at) > rm.last_read \
                 ) unread_threads",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn is_user_sender(&self, user_id: Id, message_id: Id) -> RepoResult<Option<Id>> {
            sqlx::query_scalar("SELECT id FROM messages WHERE id = $1 AND sender_id = $2")
                .bind(message_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn message_sender(&self, message_id: Id) -> RepoResult<Option<Id>> {
            sqlx::query_scalar("SELECT sender_id FROM messages WHERE id = $1")
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn is_valid_thread(&self, id: Id) -> RepoResult<Option<Id>> {
            sqlx::query_scalar("SELECT id FROM threads WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)
        }
    }

    #[async_trait]
    impl NoticeRepo for PgRepo {
        async fn create_notice(
            &self,
            new: NewNotice,
            sent_at: chrono::DateTime<chrono::Utc>,
        ) -> RepoResult<Notice> {
            sqlx::query_as::<_, Notice>(
                "INSERT INTO notices (subject, body, sent_at, is_active) \
                 VALUES ($1, $2, $3, TRUE) \
                 RETURNING id, subject, body, sent_at, is_active",
            )
            .bind(&new.subject)
            .bind(&new.body)
            .bind(sent_at)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn list_notices(&self) -> RepoResult<Vec<Notice>> {
            sqlx::query_as::<_, Notice>(
                "SELECT id, subject, body, sent_at, is_active FROM notices \
                 ORDER BY sent_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn active_notice(&self) -> RepoResult<Option<Notice>> {
            sqlx::query_as::<_, Notice>(
                "SELECT id, subject, body, sent_at, is_active FROM notices \
                 WHERE is_active ORDER BY sent_at DESC, id DESC LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn deactivate_notice(&self, id: Id) -> RepoResult<Notice> {
            sqlx::query_as::<_, Notice>(
                "UPDATE notices SET is_active = FALSE WHERE id = $1 \
                 RETURNING id, subject, body, sent_at, is_active",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl IdentityRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let key = display_key(&new.display_name);
            sqlx::query_as::<_, User>(
                "INSERT INTO users (login, display_name, display_key) VALUES ($1, $2, $3) \
                 RETURNING id, login, display_name",
            )
            .bind(&new.login)
            .bind(&new.display_name)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn resolve_by_login(&self, login: &str) -> RepoResult<Option<Id>> {
            sqlx::query_scalar("SELECT id FROM users WHERE login = $1")
                .bind(login)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)
        }

        async fn resolve_by_display(&self, key: &str) -> RepoResult<Option<Id>> {
            sqlx::query_scalar(
                "SELECT id FROM users WHERE display_key = $1 ORDER BY id ASC LIMIT 1",
            )
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn exists_by_id(&self, id: Id) -> RepoResult<bool> {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)
        }
    }
}
