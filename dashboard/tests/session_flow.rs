mod support;

use std::time::Duration;

use aman_dashboard::{ApiError, Credentials, Role, SessionEvent};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use support::{client_for, dead_addr, drain, seed_session, serve, stored_token, Hits};

fn login_route() -> Router {
    Router::new().route(
        "/auth/login",
        post(|Json(body): Json<Value>| async move {
            if body["password"] == "good" {
                (
                    StatusCode::OK,
                    Json(json!({
                        "token": "fresh-token",
                        "id": 3,
                        "username": "admin",
                        "email": body["email"],
                        "role": "admin"
                    })),
                )
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Invalid credentials"})),
                )
            }
        }),
    )
}

#[tokio::test]
async fn login_persists_token_and_returns_role() {
    let addr = serve(login_route()).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    let client = client_for(addr, &db);
    let mut events = client.session_handle().events();

    let user = client
        .session()
        .login(&Credentials::new("admin@example.com", "good"))
        .await
        .unwrap();

    assert_eq!(user.role, Role::Admin);
    assert_eq!(user.email.as_deref(), Some("admin@example.com"));
    assert_eq!(stored_token(&db).as_deref(), Some("fresh-token"));
    assert!(client.session_handle().is_authenticated());
    assert_eq!(client.session_handle().user(), Some(user.clone()));
    assert_eq!(drain(&mut events), vec![SessionEvent::LoggedIn(user)]);
}

#[tokio::test]
async fn rejected_login_keeps_the_previous_session() {
    let addr = serve(login_route()).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    let client = client_for(addr, &db);

    client
        .session()
        .login(&Credentials::new("admin@example.com", "good"))
        .await
        .unwrap();
    let mut events = client.session_handle().events();

    let err = client
        .session()
        .login(&Credentials::new("admin@example.com", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Auth(ref msg) if msg == "Invalid credentials"));
    assert_eq!(stored_token(&db).as_deref(), Some("fresh-token"));
    assert!(client.session_handle().is_authenticated());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn login_without_token_in_response_is_rejected() {
    let router = Router::new().route(
        "/auth/login",
        post(|| async { Json(json!({"role": "user", "username": "x"})) }),
    );
    let addr = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    let client = client_for(addr, &db);

    let err = client
        .session()
        .login(&Credentials::new("x@example.com", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Auth(_)));
    assert_eq!(stored_token(&db), None);
}

#[tokio::test]
async fn restore_without_stored_token_makes_no_request() {
    let hits = Hits::default();
    let router = Router::new().route(
        "/auth/me",
        get({
            let hits = hits.clone();
            move || async move {
                hits.bump();
                Json(json!({"username": "x", "role": "user"}))
            }
        }),
    );
    let addr = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_for(addr, &dir.path().join("session.db"));

    assert!(client.session_handle().is_loading());
    assert_eq!(client.session().restore_session().await, None);
    assert_eq!(hits.count(), 0);
    assert!(!client.session_handle().is_authenticated());
    assert!(!client.session_handle().is_loading());
}

#[tokio::test]
async fn restore_with_rejected_token_clears_storage() {
    let router = Router::new().route(
        "/auth/me",
        get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "Token expired"}))) }),
    );
    let addr = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    seed_session(&db, "stale-token");
    let client = client_for(addr, &db);
    assert!(client.session_handle().user().is_some());

    assert_eq!(client.session().restore_session().await, None);
    assert_eq!(stored_token(&db), None);
    assert_eq!(client.session_handle().user(), None);
    assert!(!client.session_handle().is_loading());
}

#[tokio::test]
async fn restore_with_valid_token_refreshes_user() {
    let router = Router::new().route(
        "/auth/me",
        get(|headers: HeaderMap| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if auth == "Bearer valid-token" {
                (
                    StatusCode::OK,
                    Json(json!({"id": 1, "username": "renamed", "role": "user"})),
                )
            } else {
                (StatusCode::UNAUTHORIZED, Json(json!({})))
            }
        }),
    );
    let addr = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    seed_session(&db, "valid-token");
    let client = client_for(addr, &db);
    let mut events = client.session_handle().events();

    let user = client.session().restore_session().await.unwrap();
    assert_eq!(user.username, "renamed");
    assert_eq!(stored_token(&db).as_deref(), Some("valid-token"));
    assert_eq!(drain(&mut events), vec![SessionEvent::Restored(user)]);
}

#[tokio::test]
async fn logout_clears_local_state_when_server_is_unreachable() {
    let addr = dead_addr().await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    seed_session(&db, "some-token");
    let client = client_for(addr, &db);
    assert!(client.session_handle().is_authenticated());
    let mut events = client.session_handle().events();

    client.session().logout().await;

    assert!(!client.session_handle().is_authenticated());
    assert_eq!(client.session_handle().user(), None);
    assert_eq!(stored_token(&db), None);
    assert_eq!(drain(&mut events), vec![SessionEvent::LoggedOut]);
}

#[tokio::test]
async fn any_unauthorized_response_expires_the_session_once() {
    let router = login_route()
        .route(
            "/devices",
            get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "expired"}))) }),
        )
        .route(
            "/notifications/unread",
            get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"error": "expired"}))) }),
        );
    let addr = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    let client = client_for(addr, &db);
    let credentials = Credentials::new("admin@example.com", "good");

    client.session().login(&credentials).await.unwrap();
    let mut events = client.session_handle().events();
    let err = client.api().fetch_registered_devices().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(stored_token(&db), None);
    assert_eq!(drain(&mut events), vec![SessionEvent::Expired]);

    // A second 401 with no session left has nothing to clear.
    client.api().fetch_unread_notifications(0, 10).await.unwrap_err();
    assert!(drain(&mut events).is_empty());

    client.session().login(&credentials).await.unwrap();
    drain(&mut events);
    client.api().fetch_unread_notifications(0, 10).await.unwrap_err();
    assert_eq!(stored_token(&db), None);
    assert_eq!(drain(&mut events), vec![SessionEvent::Expired]);
}

#[tokio::test]
async fn late_unauthorized_response_leaves_a_newer_session_alone() {
    let logins = Hits::default();
    let router = Router::new()
        .route(
            "/auth/login",
            post({
                let logins = logins.clone();
                move || async move {
                    let n = logins.bump();
                    Json(json!({"token": format!("tok-{n}"), "username": "admin", "role": "admin"}))
                }
            }),
        )
        .route(
            "/devices",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer tok-1" {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
                (StatusCode::UNAUTHORIZED, Json(json!({"error": "expired"})))
            }),
        );
    let addr = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("session.db");
    let client = client_for(addr, &db);
    let credentials = Credentials::new("admin@example.com", "pw");

    client.session().login(&credentials).await.unwrap();
    let mut events = client.session_handle().events();

    let slow_read = client.api().fetch_registered_devices();
    let relogin = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.session().login(&credentials).await
    };
    let (stale, fresh) = tokio::join!(slow_read, relogin);

    assert!(stale.unwrap_err().is_unauthorized());
    assert_eq!(fresh.unwrap().username, "admin");
    assert_eq!(stored_token(&db).as_deref(), Some("tok-2"));
    assert!(client.session_handle().is_authenticated());
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SessionEvent::LoggedIn(_)]
    ));
}
