use axum::{
    extract::FromRequestParts,
    http::{Method, Request, Uri, header, request::Parts},
};
use eduhub::{
    AppState, InMemoryRepository,
    auth::{AuthUser, Claims},
    config::{AppConfig, Env},
    error::AppError,
    models::Role,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

/// Signs a token for `user_id` expiring `exp_offset` seconds from now (negative = past).
fn create_token(user_id: Uuid, exp_offset: i64, secret: &str) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn create_app_state(env: Env, repo: InMemoryRepository) -> AppState {
    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState::new(Arc::new(repo), config)
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

fn with_bypass(parts: &mut Parts, user_id: Uuid) {
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user_id.to_string()).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let repo = InMemoryRepository::new();
    repo.insert_user(TEST_USER_ID, Role::Student).await;
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, 3600, TEST_JWT_SECRET));

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_ok());
    let user = auth_user.unwrap();
    assert_eq!(user.id, TEST_USER_ID);
    assert_eq!(user.role, Role::Student);
}

#[tokio::test]
async fn test_auth_reads_current_role_from_store() {
    let repo = InMemoryRepository::new();
    repo.insert_user(TEST_USER_ID, Role::OldStudent).await;
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, 3600, TEST_JWT_SECRET));

    let user = AuthUser::from_request_parts(&mut parts, &app_state).await.unwrap();
    assert_eq!(user.role, Role::OldStudent);
    assert!(!user.is_admin());
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, InMemoryRepository::new());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let repo = InMemoryRepository::new();
    repo.insert_user(TEST_USER_ID, Role::Student).await;
    let app_state = create_app_state(Env::Production, repo);

    // Well past the default validation leeway.
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, -3600, TEST_JWT_SECRET));

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_wrong_secret() {
    let repo = InMemoryRepository::new();
    repo.insert_user(TEST_USER_ID, Role::Admin).await;
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, 3600, "some-other-secret"));

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_for_unknown_subject() {
    let app_state = create_app_state(Env::Production, InMemoryRepository::new());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, 3600, TEST_JWT_SECRET));

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_local_bypass_success() {
    let mock_user_id = Uuid::new_v4();
    let repo = InMemoryRepository::new();
    repo.insert_user(mock_user_id, Role::Admin).await;
    let app_state = create_app_state(Env::Local, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bypass(&mut parts, mock_user_id);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_ok());
    let user = auth_user.unwrap();
    assert_eq!(user.id, mock_user_id);
    assert!(user.is_admin());
}

#[tokio::test]
async fn test_local_bypass_for_unknown_user_falls_through() {
    let app_state = create_app_state(Env::Local, InMemoryRepository::new());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bypass(&mut parts, Uuid::new_v4());

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let mock_user_id = Uuid::new_v4();
    let repo = InMemoryRepository::new();
    repo.insert_user(mock_user_id, Role::Admin).await;
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Provide ONLY the local bypass header
    with_bypass(&mut parts, mock_user_id);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}
