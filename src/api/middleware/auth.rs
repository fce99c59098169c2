use crate::api::error::AppError;
use crate::utils::auth::validate_jwt;
use crate::{AppState, entities::prelude::Users};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sea_orm::EntityTrait;
use serde::Deserialize;

/// The caller behind a valid token, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
    pub username: String,
}

#[derive(Deserialize)]
struct AuthQuery {
    token: Option<String>,
}

fn extract_token(req: &Request) -> Option<String> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    if auth_header.is_some() {
        return auth_header;
    }

    // Media elements cannot set headers, so the token may arrive in the query.
    let query = req.uri().query().unwrap_or_default();
    serde_urlencoded::from_str::<AuthQuery>(query)
        .ok()
        .and_then(|q| q.token)
}

/// Resolves the token to an enabled user. `Ok(None)` means the token is
/// missing, invalid or belongs to an account that cannot sign in.
async fn resolve_user(
    state: &AppState,
    token: Option<String>,
) -> Result<Option<AuthUser>, AppError> {
    let Some(token) = token else {
        return Ok(None);
    };
    let Ok(claims) = validate_jwt(&token, &state.config.jwt_secret) else {
        return Ok(None);
    };
    let Some(user_id) = claims.user_id() else {
        return Ok(None);
    };

    let user = Users::find_by_id(user_id).one(&state.db).await?;

    Ok(user.filter(|u| u.enabled).map(|u| AuthUser {
        id: u.id,
        email: u.email,
        username: u.username,
    }))
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Owned before the await: `&Request` is not `Send`.
    let token = extract_token(&req);
    match resolve_user(&state, token).await? {
        Some(user) => {
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        None => Err(AppError::Unauthorized(
            "Missing or invalid authentication token".to_string(),
        )),
    }
}

/// Like [`auth_middleware`] but lets anonymous requests through.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&req);
    if let Some(user) = resolve_user(&state, token).await? {
        req.extensions_mut().insert(user);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_token_prefers_header() {
        let req = request("/videos?token=from-query", Some("Bearer from-header"));
        assert_eq!(extract_token(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_extract_token_from_query() {
        let req = request("/videos/stream/a.mp4?token=abc.def", None);
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def"));

        let req = request("/videos", Some("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_token(&req), None);
    }

    async fn test_state(root: &tempfile::TempDir) -> AppState {
        let mut opt = sea_orm::ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1);
        let db = sea_orm::Database::connect(opt).await.unwrap();
        crate::infrastructure::database::run_migrations(&db).await.unwrap();
        let config = crate::config::AppConfig {
            video_dir: root.path().join("videos"),
            thumbnail_dir: root.path().join("thumbnails"),
            ..Default::default()
        };
        let storage = crate::services::storage::LocalStorageService::new(
            &config.video_dir,
            &config.thumbnail_dir,
        );
        AppState::new(db, std::sync::Arc::new(storage), config)
    }

    async fn insert_user(state: &AppState, enabled: bool) -> i32 {
        use sea_orm::{ActiveModelTrait, Set};
        let name = if enabled { "active" } else { "dormant" };
        crate::entities::users::ActiveModel {
            email: Set(format!("{}@example.com", name)),
            username: Set(name.to_string()),
            password_hash: Set("x".to_string()),
            first_name: Set("A".to_string()),
            last_name: Set("B".to_string()),
            enabled: Set(enabled),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        }
        .insert(&state.db)
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_resolve_user_runs_on_spawned_task() {
        let root = tempfile::TempDir::new().unwrap();
        let state = test_state(&root).await;
        let active = insert_user(&state, true).await;
        let dormant = insert_user(&state, false).await;
        let secret = state.config.jwt_secret.clone();

        let active_token =
            crate::utils::auth::create_jwt(active, "active@example.com", &secret, 1).unwrap();
        let dormant_token =
            crate::utils::auth::create_jwt(dormant, "dormant@example.com", &secret, 1).unwrap();

        // `tokio::spawn` only accepts Send futures, the same bound the router puts on middleware.
        let resolved = tokio::spawn(async move {
            let req = request("/videos", Some(&format!("Bearer {}", active_token)));
            let token = extract_token(&req);
            let found = resolve_user(&state, token).await.unwrap();
            let disabled = resolve_user(&state, Some(dormant_token)).await.unwrap();
            let garbage = resolve_user(&state, Some("nope".to_string())).await.unwrap();
            (found, disabled, garbage)
        })
        .await
        .unwrap();

        assert_eq!(resolved.0.map(|u| u.id), Some(active));
        assert!(resolved.1.is_none());
        assert!(resolved.2.is_none());
    }
}
