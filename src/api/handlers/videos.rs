use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::auth::AuthUser;
use crate::services::storage::MediaKind;
use crate::services::video_service::{UploadPart, UploadRequest, VideoWithTags};
use crate::utils::validation::{normalize_tags, validate_stored_name};
use axum::{
    Extension, Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::Field},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct VideoResponse {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub thumbnail_url: String,
    pub video_url: String,
    pub video_size: i64,
    pub location: Option<String>,
    pub user_id: i32,
    pub view_count: i32,
    pub like_count: i32,
    pub comment_count: i32,
    pub created_at: chrono::DateTime<Utc>,
    pub can_like: bool,
    pub can_comment: bool,
}

pub fn stream_url(filename: &str) -> String {
    format!("/videos/stream/{}", filename)
}

pub fn thumbnail_url(filename: &str) -> String {
    format!("/videos/thumbnail/{}", filename)
}

impl VideoResponse {
    pub fn from_video(found: VideoWithTags, authenticated: bool) -> Self {
        let video = found.video;
        Self {
            id: video.id,
            title: video.title,
            description: video.description,
            tags: found.tags,
            thumbnail_url: thumbnail_url(&video.thumbnail_path),
            video_url: stream_url(&video.video_path),
            video_size: video.video_size,
            location: video.location,
            user_id: video.user_id,
            view_count: video.view_count,
            like_count: video.like_count,
            comment_count: video.comment_count,
            created_at: video.created_at,
            can_like: authenticated,
            can_comment: authenticated,
        }
    }
}

#[utoipa::path(
    get,
    path = "/videos",
    responses(
        (status = 200, description = "All videos, newest first", body = [VideoResponse])
    ),
    tag = "videos"
)]
pub async fn list_videos(
    State(state): State<AppState>,
    user: Option<Extension<AuthUser>>,
) -> Result<Json<Vec<VideoResponse>>, AppError> {
    let authenticated = user.is_some();
    let videos = state.video_service.list_videos().await?;
    Ok(Json(
        videos
            .into_iter()
            .map(|v| VideoResponse::from_video(v, authenticated))
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/videos/{id}",
    params(("id" = i32, Path, description = "Video id")),
    responses(
        (status = 200, description = "Video found", body = VideoResponse),
        (status = 404, description = "Video not found")
    ),
    tag = "videos"
)]
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    user: Option<Extension<AuthUser>>,
) -> Result<Json<VideoResponse>, AppError> {
    let video = state.video_service.get_video(id).await?;
    Ok(Json(VideoResponse::from_video(video, user.is_some())))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

/// Buffers a file field, failing as soon as it grows past `limit`.
async fn read_file_field(field: &mut Field<'_>, limit: usize) -> Result<Bytes, AppError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds maximum allowed {} bytes ({} MB)",
                limit,
                limit / 1024 / 1024
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[utoipa::path(
    post,
    path = "/videos/upload",
    request_body(content = Multipart, description = "title, description, tags, location, thumbnail and video"),
    responses(
        (status = 201, description = "Video uploaded", body = VideoResponse),
        (status = 400, description = "Invalid form data"),
        (status = 401, description = "Unauthorized"),
        (status = 408, description = "Video upload timed out"),
        (status = 413, description = "Video exceeds size limit"),
        (status = 415, description = "Video is not an MP4 file")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<VideoResponse>), AppError> {
    let limit = state.config.max_video_size;

    let result: Result<UploadRequest, AppError> = async {
        let mut title: Option<String> = None;
        let mut description: Option<String> = None;
        let mut location: Option<String> = None;
        let mut raw_tags: Vec<String> = Vec::new();
        let mut thumbnail: Option<UploadPart> = None;
        let mut video: Option<UploadPart> = None;

        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "video" | "thumbnail" => {
                    let filename = field.file_name().map(|s| s.to_string());
                    let data = read_file_field(&mut field, limit).await?;
                    let part = UploadPart { filename, data };
                    if name == "video" {
                        video = Some(part);
                    } else {
                        thumbnail = Some(part);
                    }
                }
                "title" => title = Some(field.text().await.map_err(multipart_error)?),
                "description" => description = Some(field.text().await.map_err(multipart_error)?),
                "location" => location = Some(field.text().await.map_err(multipart_error)?),
                "tags" => raw_tags.push(field.text().await.map_err(multipart_error)?),
                _ => {
                    tracing::debug!("Ignoring unexpected multipart field '{}'", name);
                    while field.chunk().await.map_err(multipart_error)?.is_some() {}
                }
            }
        }

        let video = video.ok_or(AppError::BadRequest("No video file provided".to_string()))?;
        let thumbnail =
            thumbnail.ok_or(AppError::BadRequest("No thumbnail file provided".to_string()))?;

        Ok(UploadRequest {
            title: title.unwrap_or_default(),
            description,
            tags: normalize_tags(raw_tags),
            location,
            thumbnail,
            video,
            user_id: user.id,
        })
    }
    .await;

    let request = match result {
        Ok(request) => request,
        Err(e) => {
            // Drain so the client sees the error instead of a connection reset.
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            return Err(e);
        }
    };

    let created = state.video_service.upload(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(VideoResponse::from_video(created, true)),
    ))
}

#[utoipa::path(
    post,
    path = "/videos/{id}/like",
    params(("id" = i32, Path, description = "Video id")),
    responses(
        (status = 200, description = "Like recorded"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Video not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "videos"
)]
pub async fn like_video(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Extension(_user): Extension<AuthUser>,
) -> Result<StatusCode, AppError> {
    state.video_service.increment_like_count(id).await?;
    Ok(StatusCode::OK)
}

/// A range from the `Range` header, inclusive on both ends.
pub fn parse_range_header(value: &HeaderValue, size: u64) -> Option<(u64, u64)> {
    let value = value.to_str().ok()?.trim();
    let (unit, range) = value.split_once('=')?;
    if unit.trim() != "bytes" {
        return None;
    }
    let range = range.trim();
    if range.is_empty() || range.contains(',') {
        return None;
    }
    let (start_str, end_str) = range.split_once('-')?;

    if start_str.is_empty() {
        // "-N" is the last N bytes.
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        if suffix_len >= size {
            return Some((0, size.saturating_sub(1)));
        }
        return Some((size - suffix_len, size.saturating_sub(1)));
    }

    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        size.saturating_sub(1).max(start)
    } else {
        end_str.parse().ok()?
    };
    if end < start {
        return None;
    }
    Some((start, end))
}

/// Views are counted once per playback: on a plain request or on the range
/// request that starts at the first byte.
pub fn counts_as_view(headers: &HeaderMap) -> bool {
    match headers.get(header::RANGE) {
        None => true,
        Some(value) => value
            .to_str()
            .map(|v| v.trim().starts_with("bytes=0-"))
            .unwrap_or(false),
    }
}

async fn stream_file(path: PathBuf, headers: &HeaderMap) -> Result<Response, AppError> {
    let mut file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| AppError::NotFound("Video not found".to_string()))?;
    let size = file
        .metadata()
        .await
        .map_err(|_| AppError::NotFound("Video not found".to_string()))?
        .len();

    let range = headers
        .get(header::RANGE)
        .and_then(|value| parse_range_header(value, size));

    let mut response = if let Some((start, end)) = range {
        if start >= size {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            response
        } else {
            let end = end.min(size.saturating_sub(1));
            let length = end - start + 1;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| AppError::Internal(format!("Seek failed: {}", e)))?;
            let body = Body::from_stream(ReaderStream::new(file.take(length)));
            let mut response = body.into_response();
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, size)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            response
        }
    } else {
        let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        response
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("video/mp4"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );

    Ok(response)
}

#[utoipa::path(
    get,
    path = "/videos/stream/{filename}",
    params(("filename" = String, Path, description = "Stored video filename")),
    responses(
        (status = 200, description = "Full video"),
        (status = 206, description = "Requested byte range"),
        (status = 400, description = "Invalid filename"),
        (status = 404, description = "Video not found"),
        (status = 416, description = "Range not satisfiable")
    ),
    tag = "videos"
)]
pub async fn stream_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    validate_stored_name(&filename)?;
    let path = state.storage.resolve(MediaKind::Video, &filename)?;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    if counts_as_view(&headers) {
        let counted = state
            .video_service
            .increment_view_count_by_path(&filename)
            .await?;
        if !counted {
            tracing::debug!("Streamed file {} has no video record", filename);
        }
    }

    stream_file(path, &headers).await
}

#[utoipa::path(
    get,
    path = "/videos/thumbnail/{filename}",
    params(("filename" = String, Path, description = "Stored thumbnail filename")),
    responses(
        (status = 200, description = "Thumbnail image"),
        (status = 400, description = "Invalid filename"),
        (status = 404, description = "Thumbnail not found")
    ),
    tag = "videos"
)]
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    validate_stored_name(&filename)?;
    let thumbnail = state
        .thumbnails
        .load(state.storage.as_ref(), &filename)
        .await?;

    let content_type = HeaderValue::from_str(&thumbnail.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400")),
        ],
        thumbnail.data,
    )
        .into_response())
}
