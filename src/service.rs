use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Role;
use crate::events::EventHooks;
use crate::models::{
    display_key, Id, Message, NewMessage, NewNotice, Notice, Thread, ThreadSummary,
};
use crate::repo::{Repo, RepoError};

pub const DEFAULT_SUBJECT: &str = "No Subject";
pub const REPLY_PREFIX: &str = "Re: ";

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found")]
    NotFound,
    #[error("store failure: {0}")]
    Store(RepoError),
}

impl From<RepoError> for ServiceError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ServiceError::NotFound,
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Recipient-resolution behavior. With `login_lookup` on (the default),
/// entries are matched against the login key; otherwise against the
/// normalized display-name key. Numeric fallback applies either way.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub login_lookup: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { login_lookup: true }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        let login_lookup = std::env::var("COURIER_LOGIN_LOOKUP")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        Self { login_lookup }
    }
}

/// Outcome of a successful compose: the assigned thread, the committed
/// message (after the post-commit hook ran) and the recipient entries that
/// failed resolution.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Receipt {
    pub thread_id: Id,
    pub message: Message,
    pub invalid_recipients: Vec<String>,
}

struct Resolution {
    resolved: Vec<Id>,
    invalid: Vec<String>,
}

#[derive(Clone)]
pub struct MessageService {
    repo: Arc<dyn Repo>,
    hooks: Arc<dyn EventHooks>,
    cfg: ResolverConfig,
}

impl MessageService {
    pub fn new(repo: Arc<dyn Repo>, hooks: Arc<dyn EventHooks>, cfg: ResolverConfig) -> Self {
        Self { repo, hooks, cfg }
    }

    /// Compose a message into an existing thread (`thread_id` present) or a
    /// new one. Returns the receipt, or fails before any store mutation when
    /// validation rejects the input.
    pub async fn compose(
        &self,
        sender_id: Id,
        thread_id: Option<Id>,
        recipients: &[String],
        subject: Option<String>,
        body: String,
        sent_at: Option<DateTime<Utc>>,
    ) -> ServiceResult<Receipt> {
        if sender_id <= 0 {
            return Err(ServiceError::InvalidInput("sender required"));
        }
        if body.trim().is_empty() {
            return Err(ServiceError::InvalidInput("message body required"));
        }

        let (resolved, subject, invalid) = match thread_id {
            // Reply: the recipient set always comes from the stored thread,
            // whatever the caller passed in.
            Some(tid) => {
                let thread = self.repo.get_thread(tid).await?;
                let resolved: Vec<Id> = thread
                    .recipients
                    .iter()
                    .copied()
                    .filter(|r| *r != sender_id)
                    .collect();
                let subject = match subject {
                    Some(s) => s,
                    None => {
                        let first = thread
                            .messages
                            .first()
                            .map(|m| m.subject.as_str())
                            .unwrap_or(DEFAULT_SUBJECT);
                        format!("{REPLY_PREFIX}{first}")
                    }
                };
                (resolved, subject, Vec::new())
            }
            None => {
                if recipients.is_empty() {
                    return Err(ServiceError::InvalidInput("at least one recipient required"));
                }
                let resolution = self.resolve_recipients(sender_id, recipients).await?;
                if resolution.resolved.is_empty() {
                    return Err(ServiceError::InvalidInput("no valid recipients"));
                }
                let subject = subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
                (resolution.resolved, subject, resolution.invalid)
            }
        };

        let new = NewMessage {
            thread_id,
            sender_id,
            subject,
            body,
            sent_at: sent_at.unwrap_or_else(Utc::now),
            recipients: resolved,
        };
        let message = self.repo.append_message(new).await?;
        counter!("messages_sent_total", 1);
        let message = self.hooks.message_sent(message);
        Ok(Receipt {
            thread_id: message.thread_id,
            message,
            invalid_recipients: invalid,
        })
    }

    /// Map raw recipient entries to user ids. Entries are trimmed, empties
    /// skipped; a key lookup is tried first, then numeric entries fall back
    /// to an id-existence check. Unresolved entries are collected, not
    /// raised. First occurrence wins on duplicates; the sender is dropped.
    async fn resolve_recipients(
        &self,
        sender_id: Id,
        raw: &[String],
    ) -> ServiceResult<Resolution> {
        let mut resolved = Vec::new();
        let mut invalid = Vec::new();
        for entry in raw {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let mut hit = if self.cfg.login_lookup {
                self.repo.resolve_by_login(entry).await?
            } else {
                self.repo.resolve_by_display(&display_key(entry)).await?
            };
            if hit.is_none() {
                if let Ok(id) = entry.parse::<Id>() {
                    if id > 0 && self.repo.exists_by_id(id).await? {
                        hit = Some(id);
                    }
                }
            }
            match hit {
                Some(id) => {
                    if id != sender_id && !resolved.contains(&id) {
                        resolved.push(id);
                    }
                }
                None => invalid.push(entry.to_string()),
            }
        }
        Ok(Resolution { resolved, invalid })
    }

    /// Persist a sitewide notice. Requires the moderation capability; prior
    /// notices stay active.
    pub async fn send_notice(
        &self,
        actor_roles: &[Role],
        new: NewNotice,
    ) -> ServiceResult<Notice> {
        if !actor_roles
            .iter()
            .any(|r| matches!(r, Role::Moderator | Role::Admin))
        {
            return Err(ServiceError::PermissionDenied);
        }
        if new.subject.trim().is_empty() {
            return Err(ServiceError::InvalidInput("notice subject required"));
        }
        if new.body.trim().is_empty() {
            return Err(ServiceError::InvalidInput("notice body required"));
        }
        let notice = self.repo.create_notice(new, Utc::now()).await?;
        counter!("notices_sent_total", 1);
        self.hooks.notice_sent(&notice);
        Ok(notice)
    }

    /// Delete threads one by one. The first failure aborts and propagates;
    /// threads already deleted in the batch stay deleted. The after-delete
    /// hook only fires when every deletion succeeded.
    pub async fn delete_threads(&self, ids: &[Id]) -> ServiceResult<()> {
        self.hooks.threads_deleting(ids);
        for id in ids {
            self.repo.delete_thread(*id).await?;
            counter!("threads_deleted_total", 1);
        }
        self.hooks.threads_deleted(ids);
        Ok(())
    }

    /// Thread aggregate, participants only.
    pub async fn fetch_thread(&self, thread_id: Id, user_id: Id) -> ServiceResult<Thread> {
        if self.repo.check_access(thread_id, user_id).await?.is_none() {
            return Err(ServiceError::NotFound);
        }
        Ok(self.repo.get_thread(thread_id).await?)
    }

    pub async fn inbox(&self, user_id: Id) -> ServiceResult<Vec<ThreadSummary>> {
        Ok(self.repo.list_threads(user_id).await?)
    }

    pub async fn check_access(&self, thread_id: Id, user_id: Id) -> ServiceResult<Option<Id>> {
        Ok(self.repo.check_access(thread_id, user_id).await?)
    }

    pub async fn mark_read(&self, thread_id: Id, user_id: Id) -> ServiceResult<()> {
        Ok(self.repo.mark_read(thread_id, user_id).await?)
    }

    pub async fn mark_unread(&self, thread_id: Id, user_id: Id) -> ServiceResult<()> {
        Ok(self.repo.mark_unread(thread_id, user_id).await?)
    }

    pub async fn unread_count(&self, user_id: Id) -> ServiceResult<i64> {
        Ok(self.repo.unread_count(user_id).await?)
    }

    pub async fn is_user_sender(&self, user_id: Id, message_id: Id) -> ServiceResult<Option<Id>> {
        Ok(self.repo.is_user_sender(user_id, message_id).await?)
    }

    pub async fn message_sender(&self, message_id: Id) -> ServiceResult<Option<Id>> {
        Ok(self.repo.message_sender(message_id).await?)
    }

    pub async fn is_valid_thread(&self, thread_id: Id) -> ServiceResult<Option<Id>> {
        Ok(self.repo.is_valid_thread(thread_id).await?)
    }

    pub async fn active_notice(&self) -> ServiceResult<Option<Notice>> {
        Ok(self.repo.active_notice().await?)
    }

    pub async fn list_notices(&self, actor_roles: &[Role]) -> ServiceResult<Vec<Notice>> {
        if !actor_roles
            .iter()
            .any(|r| matches!(r, Role::Moderator | Role::Admin))
        {
            return Err(ServiceError::PermissionDenied);
        }
        Ok(self.repo.list_notices().await?)
    }

    pub async fn deactivate_notice(
        &self,
        actor_roles: &[Role],
        id: Id,
    ) -> ServiceResult<Notice> {
        if !actor_roles
            .iter()
            .any(|r| matches!(r, Role::Moderator | Role::Admin))
        {
            return Err(ServiceError::PermissionDenied);
        }
        Ok(self.repo.deactivate_notice(id).await?)
    }
}
