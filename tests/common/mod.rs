#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::Utc;
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Set};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use vidshare_backend::config::AppConfig;
use vidshare_backend::entities::users;
use vidshare_backend::infrastructure::database;
use vidshare_backend::services::storage::{LocalStorageService, StorageService};
use vidshare_backend::utils::auth::create_jwt;
use vidshare_backend::{AppState, create_app};

pub const BOUNDARY: &str = "---------------------------vidshare0123456789";
pub const TEST_SECRET: &str = "integration-test-secret";

pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("vidshare_backend=debug"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

pub async fn setup_test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    // Every pooled connection would get its own empty in-memory database.
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// File-backed SQLite shared by `connections` pooled connections, so
/// transactions on different tasks really overlap.
pub async fn setup_file_db(root: &TempDir, connections: u32) -> DatabaseConnection {
    let url = format!("sqlite://{}?mode=rwc", root.path().join("shared.db").display());
    let mut opt = ConnectOptions::new(url);
    opt.max_connections(connections)
        .min_connections(connections)
        .sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    db.execute_unprepared("PRAGMA journal_mode=WAL").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

pub fn test_config(root: &TempDir) -> AppConfig {
    AppConfig {
        max_video_size: 64 * 1024,
        upload_timeout_ms: 5_000,
        video_dir: root.path().join("videos"),
        thumbnail_dir: root.path().join("thumbnails"),
        jwt_secret: TEST_SECRET.to_string(),
        comments_per_window: 3,
        ..AppConfig::default()
    }
}

pub async fn local_storage(config: &AppConfig) -> Arc<LocalStorageService> {
    let storage = LocalStorageService::new(&config.video_dir, &config.thumbnail_dir);
    storage.ensure_directories().await.unwrap();
    Arc::new(storage)
}

pub struct TestApp {
    pub root: TempDir,
    pub state: AppState,
    pub app: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        init_tracing();
        let root = TempDir::new().unwrap();
        let mut config = test_config(&root);
        adjust(&mut config);

        let db = setup_test_db().await;
        let storage: Arc<dyn StorageService> = local_storage(&config).await;
        let state = AppState::new(db, storage, config);
        let app = create_app(state.clone());

        Self { root, state, app }
    }

    pub fn with_storage(
        root: TempDir,
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: AppConfig,
    ) -> Self {
        let state = AppState::new(db, storage, config);
        let app = create_app(state.clone());
        Self { root, state, app }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Inserts an enabled account and returns it with a signed token.
    pub async fn create_user(&self, username: &str) -> (users::Model, String) {
        let user = users::ActiveModel {
            email: Set(format!("{}@example.com", username)),
            username: Set(username.to_string()),
            password_hash: Set("not-used".to_string()),
            first_name: Set("Test".to_string()),
            last_name: Set("User".to_string()),
            address: Set(None),
            enabled: Set(true),
            activation_token: Set(None),
            token_expires_at: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.state.db)
        .await
        .unwrap();

        let token = create_jwt(user.id, &user.email, TEST_SECRET, 1).unwrap();
        (user, token)
    }

    pub fn video_dir(&self) -> &Path {
        &self.state.config.video_dir
    }

    pub fn thumbnail_dir(&self) -> &Path {
        &self.state.config.thumbnail_dir
    }
}

pub async fn body_bytes(response: Response<Body>) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = body_bytes(response).await;
    serde_json::from_slice(&body).unwrap()
}

/// A minimal MP4 prefix followed by `payload_len` filler bytes.
pub fn mp4_bytes(payload_len: usize) -> Vec<u8> {
    let mut data = vec![0x00, 0x00, 0x00, 0x18];
    data.extend_from_slice(b"ftypisom");
    data.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
    data.extend((0..payload_len).map(|i| (i % 251) as u8));
    data
}

pub fn png_bytes() -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52]);
    data
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/videos/upload")
        .header("Authorization", format!("Bearer {}", token))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Standard upload form with the given video content.
pub fn upload_form(title: &str, video: &[u8], thumbnail: &[u8]) -> Vec<u8> {
    multipart_body(&[
        Part::Text("title", title),
        Part::Text("description", "A test clip"),
        Part::Text("tags", "travel, food"),
        Part::Text("location", "Lisbon"),
        Part::File("thumbnail", "thumb.png", thumbnail),
        Part::File("video", "clip.mp4", video),
    ])
}

pub fn count_files(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_file())
            .count(),
        Err(_) => 0,
    }
}

pub fn staged_files(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir.join("temp")) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}
