use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// One sender-authored unit of content within a thread.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Message {
    pub id: Id,
    pub thread_id: Id,
    pub sender_id: Id,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Immutable commit value produced by the compose operation. `thread_id`
/// absent means "create the thread together with this message".
/// `recipients` is already resolved: deduplicated, sender excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub thread_id: Option<Id>,
    pub sender_id: Id,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub recipients: Vec<Id>,
}

/// Thread aggregate as handed out by the store: participant set plus the
/// messages ordered by `sent_at`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Thread {
    pub id: Id,
    pub recipients: Vec<Id>,
    pub messages: Vec<Message>,
}

/// Inbox row for one user's view of a thread.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct ThreadSummary {
    pub id: Id,
    pub subject: String,
    pub last_sent_at: DateTime<Utc>,
    pub message_count: i64,
    pub unread: bool,
}

/// Sitewide moderator broadcast, not tied to a thread. Never edited after
/// creation, only deactivated or replaced.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Notice {
    pub id: Id,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewNotice {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct User {
    pub id: Id,
    pub login: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub login: String,
    pub display_name: String,
}

/// Normalized display-name key used by recipient resolution when login
/// lookup is disabled: lowercased, whitespace runs collapsed to `-`.
pub fn display_key(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}
