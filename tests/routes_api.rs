#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use courier::auth::{create_jwt, Role};
use courier::events::LogHooks;
use courier::models::NewUser;
use courier::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use courier::repo::{inmem::InMemRepo, IdentityRepo};
use courier::service::ResolverConfig;
use courier::{config, AppState, MessageService, SecurityHeaders};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

// Helper to ensure JWT secret present & unique temp data dir per test
fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("COURIER_DATA_DIR", tempfile::tempdir().unwrap().path());
}

fn permissive_limiter() -> RateLimiterFacade {
    RateLimiterFacade::new(InMemoryRateLimiter::new(false), RateLimitConfig::from_env())
}

fn app_state(repo: Arc<InMemRepo>, limiter: RateLimiterFacade) -> AppState {
    AppState {
        svc: MessageService::new(repo.clone(), Arc::new(LogHooks), ResolverConfig::default()),
        repo,
        limiter,
    }
}

/// Users "admin" (id 1, Admin), "alice" (id 2), "bob" (id 3).
async fn seed_users(repo: &InMemRepo) {
    for (login, name) in [
        ("admin", "Site Admin"),
        ("alice", "Alice Smith"),
        ("bob", "Bob Brown"),
    ] {
        repo.create_user(NewUser {
            login: login.into(),
            display_name: name.into(),
        })
        .await
        .unwrap();
    }
}

fn admin_token() -> String {
    create_jwt(1, vec![Role::Admin]).unwrap()
}
fn alice_token() -> String {
    create_jwt(2, vec![Role::User]).unwrap()
}
fn bob_token() -> String {
    create_jwt(3, vec![Role::User]).unwrap()
}

#[actix_web::test]
#[serial]
async fn test_compose_inbox_read_delete_flow() {
    setup_env();
    let repo = Arc::new(InMemRepo::new());
    seed_users(&repo).await;
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(app_state(
                repo.clone(),
                permissive_limiter(),
            )))
            .configure(config),
    )
    .await;

    // compose without a subject
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"recipients": ["bob"], "body": "hi bob"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let receipt: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let thread_id = receipt["thread_id"].as_i64().unwrap();
    assert_eq!(receipt["message"]["subject"], "No Subject");
    assert_eq!(receipt["invalid_recipients"].as_array().unwrap().len(), 0);

    // bob's inbox shows one unread thread
    let req = test::TestRequest::get()
        .uri("/api/v1/threads")
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let inbox: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["unread"], true);

    let req = test::TestRequest::get()
        .uri("/api/v1/threads/unread-count")
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let count: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(count["count"], 1);

    // participants can fetch the thread, outsiders cannot (even admins)
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/threads/{thread_id}"))
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let thread: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(thread["messages"].as_array().unwrap().len(), 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/threads/{thread_id}"))
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // mark read
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/threads/{thread_id}/read"))
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let req = test::TestRequest::get()
        .uri("/api/v1/threads/unread-count")
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let count: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(count["count"], 0);

    // reply keeps the subject lineage
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .set_json(&serde_json::json!({"thread_id": thread_id, "body": "hi alice"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let reply: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(reply["message"]["subject"], "Re: No Subject");

    // participant deletes the thread, single-id wire shape
    let req = test::TestRequest::delete()
        .uri("/api/v1/threads")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"ids": thread_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/threads/{thread_id}"))
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_compose_validation_statuses() {
    setup_env();
    let repo = Arc::new(InMemRepo::new());
    seed_users(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(app_state(
                repo,
                permissive_limiter(),
            )))
            .configure(config),
    )
    .await;

    // no token
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .set_json(&serde_json::json!({"recipients": ["bob"], "body": "hi"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // empty body
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"recipients": ["bob"], "body": "  "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // no resolvable recipients
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"recipients": ["ghost"], "body": "hi"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // reply into a thread that does not exist
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"thread_id": 9999, "body": "hi"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_delete_permissions() {
    setup_env();
    let repo = Arc::new(InMemRepo::new());
    seed_users(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(app_state(
                repo,
                permissive_limiter(),
            )))
            .configure(config),
    )
    .await;

    // alice -> bob thread; admin is not a participant
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"recipients": ["bob"], "body": "private"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let receipt: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let thread_id = receipt["thread_id"].as_i64().unwrap();

    // a third user cannot delete someone else's thread
    let other = create_jwt(99, vec![Role::User]).unwrap();
    let req = test::TestRequest::delete()
        .uri("/api/v1/threads")
        .insert_header(("Authorization", format!("Bearer {other}")))
        .set_json(&serde_json::json!({"ids": [thread_id]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // the moderation capability bypasses the participant check
    let req = test::TestRequest::delete()
        .uri("/api/v1/threads")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .set_json(&serde_json::json!({"ids": [thread_id]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    // empty id list is rejected up front
    let req = test::TestRequest::delete()
        .uri("/api/v1/threads")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"ids": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn test_notice_endpoints() {
    setup_env();
    let repo = Arc::new(InMemRepo::new());
    seed_users(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(app_state(
                repo,
                permissive_limiter(),
            )))
            .configure(config),
    )
    .await;

    // plain users cannot broadcast
    let req = test::TestRequest::post()
        .uri("/api/v1/notices")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"subject": "Downtime", "body": "Tonight"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::post()
        .uri("/api/v1/notices")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .set_json(&serde_json::json!({"subject": "Downtime", "body": "Tonight"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let notice: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let notice_id = notice["id"].as_i64().unwrap();
    assert_eq!(notice["is_active"], true);

    // everyone sees the active notice
    let req = test::TestRequest::get()
        .uri("/api/v1/notices/active")
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let active: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(active["id"].as_i64().unwrap(), notice_id);

    // listing is moderation-only
    let req = test::TestRequest::get()
        .uri("/api/v1/notices")
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // deactivate, then nothing is active
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/notices/{notice_id}/deactivate"))
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/v1/notices/active")
        .insert_header(("Authorization", format!("Bearer {}", bob_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let active: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(active.is_null());
}

#[actix_web::test]
#[serial]
async fn test_user_provisioning() {
    setup_env();
    let repo = Arc::new(InMemRepo::new());
    seed_users(&repo).await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(app_state(
                repo,
                permissive_limiter(),
            )))
            .configure(config),
    )
    .await;

    // admins provision users
    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .set_json(&serde_json::json!({"login": "carol", "display_name": "Carol Jones"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    // duplicate login → conflict
    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .set_json(&serde_json::json!({"login": "carol", "display_name": "Another Carol"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // non-admins may not
    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&serde_json::json!({"login": "dave", "display_name": "Dave"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
#[serial]
async fn test_compose_rate_limit() {
    setup_env();
    let repo = Arc::new(InMemRepo::new());
    seed_users(&repo).await;
    let limiter = RateLimiterFacade::new(
        InMemoryRateLimiter::new(true),
        RateLimitConfig {
            message_limit: 1,
            message_window: Duration::from_secs(60),
            notice_limit: 5,
            notice_window: Duration::from_secs(3600),
        },
    );
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(app_state(repo, limiter)))
            .configure(config),
    )
    .await;

    let payload = serde_json::json!({"recipients": ["bob"], "body": "hi"});
    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/v1/messages")
        .insert_header(("Authorization", format!("Bearer {}", alice_token())))
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);
}
