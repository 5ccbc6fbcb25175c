use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{Auth, Role};
use crate::error::ApiError;
use crate::models::{Id, NewNotice, NewUser, Notice, Thread, ThreadSummary, User};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::service::{MessageService, Receipt};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/messages").route(web::post().to(compose_message)))
            // literal segments must register before the {id} matcher
            .service(
                web::resource("/threads/unread-count").route(web::get().to(unread_count)),
            )
            .service(
                web::resource("/threads")
                    .route(web::get().to(inbox))
                    .route(web::delete().to(delete_threads)),
            )
            .service(web::resource("/threads/{id}").route(web::get().to(get_thread)))
            .service(web::resource("/threads/{id}/read").route(web::post().to(mark_read)))
            .service(web::resource("/threads/{id}/unread").route(web::post().to(mark_unread)))
            .service(web::resource("/notices/active").route(web::get().to(active_notice)))
            .service(
                web::resource("/notices")
                    .route(web::get().to(list_notices))
                    .route(web::post().to(send_notice)),
            )
            .service(
                web::resource("/notices/{id}/deactivate")
                    .route(web::post().to(deactivate_notice)),
            )
            .service(web::resource("/users").route(web::post().to(create_user))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub svc: MessageService,
    pub repo: Arc<dyn Repo>,
    pub limiter: RateLimiterFacade,
}

fn current_user(auth: &Auth) -> Result<Id, ApiError> {
    auth.0.user_id().ok_or(ApiError::Unauthorized)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ComposeMessage {
    /// Present: reply into this thread. Absent: start a new one.
    pub thread_id: Option<Id>,
    /// Logins, display names or numeric ids. Ignored on replies.
    #[serde(default)]
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub body: String,
    pub sent_at: Option<DateTime<Utc>>,
}

#[utoipa::path(
    post,
    path = "/api/v1/messages",
    request_body = ComposeMessage,
    responses(
        (status = 201, description = "Message sent", body = Receipt),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Thread not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn compose_message(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<ComposeMessage>,
) -> Result<HttpResponse, ApiError> {
    let sender_id = current_user(&auth)?;
    if !data.limiter.allow_message(&auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let p = payload.into_inner();
    let receipt = data
        .svc
        .compose(sender_id, p.thread_id, &p.recipients, p.subject, p.body, p.sent_at)
        .await?;
    Ok(HttpResponse::Created().json(receipt))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads",
    responses(
        (status = 200, description = "Caller's threads, latest activity first", body = [ThreadSummary])
    )
)]
pub async fn inbox(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&auth)?;
    let summaries = data.svc.inbox(user_id).await?;
    Ok(HttpResponse::Ok().json(summaries))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/unread-count",
    responses(
        (status = 200, description = "Number of unread threads for the caller")
    )
)]
pub async fn unread_count(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&auth)?;
    let count = data.svc.unread_count(user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "count": count })))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread with messages", body = Thread),
        (status = 404, description = "Not found or not a participant")
    )
)]
pub async fn get_thread(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&auth)?;
    let thread = data.svc.fetch_thread(path.into_inner(), user_id).await?;
    Ok(HttpResponse::Ok().json(thread))
}

pub async fn mark_read(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&auth)?;
    data.svc.mark_read(path.into_inner(), user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"})))
}

pub async fn mark_unread(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&auth)?;
    data.svc.mark_unread(path.into_inner(), user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"})))
}

/// A single id or a list, as the wire shape.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ThreadIds {
    One(Id),
    Many(Vec<Id>),
}

impl ThreadIds {
    fn into_vec(self) -> Vec<Id> {
        match self {
            ThreadIds::One(id) => vec![id],
            ThreadIds::Many(ids) => ids,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteThreads {
    pub ids: ThreadIds,
}

#[utoipa::path(
    delete,
    path = "/api/v1/threads",
    request_body = DeleteThreads,
    responses(
        (status = 204, description = "All threads deleted"),
        (status = 404, description = "A thread was missing; earlier deletions in the batch persist")
    )
)]
pub async fn delete_threads(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<DeleteThreads>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&auth)?;
    let ids = payload.into_inner().ids.into_vec();
    if ids.is_empty() {
        return Err(ApiError::BadRequest("at least one thread id required"));
    }
    // non-moderators may only delete threads they participate in
    if !auth.0.can_moderate() {
        for id in &ids {
            if data.svc.check_access(*id, user_id).await?.is_none() {
                return Err(ApiError::NotFound);
            }
        }
    }
    data.svc.delete_threads(&ids).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/notices",
    request_body = NewNotice,
    responses(
        (status = 201, description = "Notice sent", body = Notice),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Forbidden - moderators only")
    )
)]
pub async fn send_notice(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewNotice>,
) -> Result<HttpResponse, ApiError> {
    if !data.limiter.allow_notice(&auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let notice = data
        .svc
        .send_notice(&auth.0.roles, payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(notice))
}

#[utoipa::path(
    get,
    path = "/api/v1/notices/active",
    responses(
        (status = 200, description = "Latest active notice, null body when none", body = Notice)
    )
)]
pub async fn active_notice(
    _auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let notice = data.svc.active_notice().await?;
    Ok(HttpResponse::Ok().json(notice))
}

pub async fn list_notices(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let notices = data.svc.list_notices(&auth.0.roles).await?;
    Ok(HttpResponse::Ok().json(notices))
}

pub async fn deactivate_notice(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let notice = data
        .svc
        .deactivate_notice(&auth.0.roles, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(notice))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 403, description = "Forbidden - admins only"),
        (status = 409, description = "Login already taken")
    )
)]
pub async fn create_user(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    if !auth.0.roles.iter().any(|r| matches!(r, Role::Admin)) {
        return Err(ApiError::Forbidden);
    }
    let user = data.repo.create_user(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}
