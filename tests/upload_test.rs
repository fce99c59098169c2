mod common;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use common::*;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vidshare_backend::entities::prelude::{VideoPosts, VideoTags};
use vidshare_backend::services::storage::{
    LocalStorageService, MediaKind, StagedEntry, StagedFile, StorageError, StorageService,
};

#[tokio::test]
async fn test_upload_success_promotes_files() {
    let test = TestApp::new().await;
    let (user, token) = test.create_user("uploader").await;

    let video = mp4_bytes(4096);
    let thumbnail = png_bytes();
    let response = test
        .send(upload_request(&token, upload_form("Sunset", &video, &thumbnail)))
        .await;

    let status = response.status();
    let json = body_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {}", json);

    assert_eq!(json["title"], "Sunset");
    assert_eq!(json["description"], "A test clip");
    assert_eq!(json["location"], "Lisbon");
    assert_eq!(json["user_id"], user.id);
    assert_eq!(json["video_size"], video.len() as i64);
    assert_eq!(json["view_count"], 0);
    assert_eq!(json["tags"], serde_json::json!(["travel", "food"]));

    // Final files exist and nothing is left in staging.
    assert_eq!(count_files(test.video_dir()), 1);
    assert_eq!(count_files(test.thumbnail_dir()), 1);
    assert!(staged_files(test.video_dir()).is_empty());
    assert!(staged_files(test.thumbnail_dir()).is_empty());

    let video_url = json["video_url"].as_str().unwrap();
    let thumbnail_url = json["thumbnail_url"].as_str().unwrap();
    assert!(video_url.starts_with("/videos/stream/"));
    assert!(video_url.ends_with(".mp4"));
    assert!(thumbnail_url.ends_with(".png"));

    let response = test
        .send(Request::builder().uri(video_url).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "video/mp4");
    assert_eq!(body_bytes(response).await.as_ref(), video.as_slice());

    let response = test
        .send(Request::builder().uri(thumbnail_url).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(body_bytes(response).await.as_ref(), thumbnail.as_slice());

    assert_eq!(VideoPosts::find().count(&test.state.db).await.unwrap(), 1);
    assert_eq!(VideoTags::find().count(&test.state.db).await.unwrap(), 2);
}

#[tokio::test]
async fn test_upload_requires_authentication() {
    let test = TestApp::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/videos/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(upload_form("Nope", &mp4_bytes(16), &png_bytes())))
        .unwrap();

    let response = test.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(VideoPosts::find().count(&test.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_upload_over_size_limit_is_rejected() {
    let test = TestApp::with_config(|c| c.max_video_size = 1024).await;
    let (_, token) = test.create_user("big").await;

    let response = test
        .send(upload_request(
            &token,
            upload_form("Too big", &mp4_bytes(2048), &png_bytes()),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("1024"));

    assert!(staged_files(test.video_dir()).is_empty());
    assert!(staged_files(test.thumbnail_dir()).is_empty());
    assert_eq!(count_files(test.video_dir()), 0);
    assert_eq!(VideoPosts::find().count(&test.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_upload_with_bad_signature_is_rejected() {
    let test = TestApp::new().await;
    let (_, token) = test.create_user("faker").await;

    let not_a_video = b"This is definitely not an MP4 container".to_vec();
    let response = test
        .send(upload_request(
            &token,
            upload_form("Fake", &not_a_video, &png_bytes()),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(staged_files(test.video_dir()).is_empty());
    assert_eq!(count_files(test.video_dir()), 0);
    assert_eq!(count_files(test.thumbnail_dir()), 0);
    assert_eq!(VideoPosts::find().count(&test.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_upload_missing_fields() {
    let test = TestApp::new().await;
    let (_, token) = test.create_user("partial").await;

    let no_video = multipart_body(&[
        Part::Text("title", "No video"),
        Part::File("thumbnail", "thumb.png", &png_bytes()),
    ]);
    let response = test.send(upload_request(&token, no_video)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let blank_title = upload_form("   ", &mp4_bytes(16), &png_bytes());
    let response = test.send(upload_request(&token, blank_title)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(staged_files(test.video_dir()).is_empty());
    assert!(staged_files(test.thumbnail_dir()).is_empty());
    assert_eq!(VideoPosts::find().count(&test.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_upload_rolls_back_files_when_metadata_fails() {
    let test = TestApp::new().await;
    let (_, token) = test.create_user("rollback").await;

    // Tag inserts fail inside the transaction, after the post row is written.
    test.state
        .db
        .execute_unprepared("DROP TABLE video_tags")
        .await
        .unwrap();

    let response = test
        .send(upload_request(
            &token,
            upload_form("Doomed", &mp4_bytes(512), &png_bytes()),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(staged_files(test.video_dir()).is_empty());
    assert!(staged_files(test.thumbnail_dir()).is_empty());
    assert_eq!(count_files(test.video_dir()), 0);
    assert_eq!(count_files(test.thumbnail_dir()), 0);
    assert_eq!(VideoPosts::find().count(&test.state.db).await.unwrap(), 0);
}

/// Local storage whose video writes never finish until cancelled.
struct StallingStorage {
    inner: LocalStorageService,
}

#[async_trait]
impl StorageService for StallingStorage {
    async fn stage(
        &self,
        staged: &StagedFile,
        data: Bytes,
        cancel: CancellationToken,
    ) -> Result<(), StorageError> {
        if staged.kind == MediaKind::Video {
            cancel.cancelled().await;
            return Err(StorageError::Cancelled);
        }
        self.inner.stage(staged, data, cancel).await
    }

    async fn promote(&self, staged: &StagedFile) -> Result<(), StorageError> {
        self.inner.promote(staged).await
    }

    async fn discard(&self, staged: &StagedFile) -> Result<(), StorageError> {
        self.inner.discard(staged).await
    }

    async fn list_staged(&self, kind: MediaKind) -> Result<Vec<StagedEntry>, StorageError> {
        self.inner.list_staged(kind).await
    }

    async fn exists(&self, kind: MediaKind, name: &str) -> Result<bool, StorageError> {
        self.inner.exists(kind, name).await
    }

    fn resolve(&self, kind: MediaKind, name: &str) -> Result<PathBuf, StorageError> {
        self.inner.resolve(kind, name)
    }
}

#[tokio::test]
async fn test_upload_timeout_cancels_and_cleans_up() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let mut config = test_config(&root);
    config.upload_timeout_ms = 50;

    let inner = LocalStorageService::new(&config.video_dir, &config.thumbnail_dir);
    inner.ensure_directories().await.unwrap();
    let storage: Arc<dyn StorageService> = Arc::new(StallingStorage { inner });

    let db = setup_test_db().await;
    let test = TestApp::with_storage(root, db, storage, config);
    let (_, token) = test.create_user("slowpoke").await;

    let response = test
        .send(upload_request(
            &token,
            upload_form("Slow", &mp4_bytes(256), &png_bytes()),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    // The thumbnail was staged before the video stalled and must be gone too.
    assert!(staged_files(test.thumbnail_dir()).is_empty());
    assert!(staged_files(test.video_dir()).is_empty());
    assert_eq!(count_files(test.thumbnail_dir()), 0);
    assert_eq!(VideoPosts::find().count(&test.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_and_get_videos() {
    let test = TestApp::new().await;
    let (_, token) = test.create_user("lister").await;

    for title in ["First", "Second"] {
        let response = test
            .send(upload_request(
                &token,
                upload_form(title, &mp4_bytes(64), &png_bytes()),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = test
        .send(Request::builder().uri("/videos").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let videos = json.as_array().unwrap();
    assert_eq!(videos.len(), 2);
    assert_eq!(videos[0]["title"], "Second");
    assert_eq!(videos[1]["title"], "First");
    assert_eq!(videos[0]["can_like"], false);

    let id = videos[1]["id"].as_i64().unwrap();
    let response = test
        .send(
            Request::builder()
                .uri(format!("/videos/{}", id))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["title"], "First");
    assert_eq!(json["can_comment"], true);

    let response = test
        .send(Request::builder().uri("/videos/9999").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Local storage whose video writes ignore cancellation and finish late.
struct DeafStorage {
    inner: LocalStorageService,
    delay: Duration,
}

#[async_trait]
impl StorageService for DeafStorage {
    async fn stage(
        &self,
        staged: &StagedFile,
        data: Bytes,
        cancel: CancellationToken,
    ) -> Result<(), StorageError> {
        if staged.kind == MediaKind::Video {
            tokio::time::sleep(self.delay).await;
            return self.inner.stage(staged, data, CancellationToken::new()).await;
        }
        self.inner.stage(staged, data, cancel).await
    }

    async fn promote(&self, staged: &StagedFile) -> Result<(), StorageError> {
        self.inner.promote(staged).await
    }

    async fn discard(&self, staged: &StagedFile) -> Result<(), StorageError> {
        self.inner.discard(staged).await
    }

    async fn list_staged(&self, kind: MediaKind) -> Result<Vec<StagedEntry>, StorageError> {
        self.inner.list_staged(kind).await
    }

    async fn exists(&self, kind: MediaKind, name: &str) -> Result<bool, StorageError> {
        self.inner.exists(kind, name).await
    }

    fn resolve(&self, kind: MediaKind, name: &str) -> Result<PathBuf, StorageError> {
        self.inner.resolve(kind, name)
    }
}

#[tokio::test]
async fn test_upload_timeout_does_not_wait_for_stuck_writes() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let mut config = test_config(&root);
    config.upload_timeout_ms = 50;

    let inner = LocalStorageService::new(&config.video_dir, &config.thumbnail_dir);
    inner.ensure_directories().await.unwrap();
    let storage: Arc<dyn StorageService> = Arc::new(DeafStorage {
        inner,
        delay: Duration::from_secs(3),
    });

    let db = setup_test_db().await;
    let test = TestApp::with_storage(root, db, storage, config);
    let (_, token) = test.create_user("stuck").await;

    let started = Instant::now();
    let response = test
        .send(upload_request(
            &token,
            upload_form("Stuck", &mp4_bytes(256), &png_bytes()),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(started.elapsed() < Duration::from_millis(2500));
    assert_eq!(VideoPosts::find().count(&test.state.db).await.unwrap(), 0);

    // The late write lands and is then removed in the background.
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(staged_files(test.video_dir()).is_empty());
    assert!(staged_files(test.thumbnail_dir()).is_empty());
}
