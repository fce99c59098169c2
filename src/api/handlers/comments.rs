use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::auth::AuthUser;
use crate::services::comment_service::{CommentPage, CommentWithAuthor, DEFAULT_PAGE_SIZE};
use crate::utils::validation::validate_stored_name;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct CommentResponse {
    pub id: i32,
    pub text: String,
    pub user_id: i32,
    pub username: String,
    pub video_id: i32,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<CommentWithAuthor> for CommentResponse {
    fn from(found: CommentWithAuthor) -> Self {
        Self {
            id: found.comment.id,
            text: found.comment.text,
            user_id: found.comment.user_id,
            username: found.username,
            video_id: found.comment.video_post_id,
            created_at: found.comment.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CommentPageResponse {
    pub items: Vec<CommentResponse>,
    pub page: u64,
    pub size: u64,
    pub total: u64,
}

impl From<CommentPage> for CommentPageResponse {
    fn from(page: CommentPage) -> Self {
        Self {
            items: page.items.into_iter().map(CommentResponse::from).collect(),
            page: page.page,
            size: page.size,
            total: page.total,
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct PageQuery {
    /// Zero-based page index
    pub page: Option<u64>,
    /// Page size, at most 100
    pub size: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/videos/{id}/comments",
    params(("id" = i32, Path, description = "Video id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Empty or too long comment"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Video not found"),
        (status = 429, description = "Comment rate limit reached")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "comments"
)]
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    let created = state
        .comment_service
        .add_comment(id, user.id, &payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    get,
    path = "/videos/{id}/comments",
    params(("id" = i32, Path, description = "Video id"), PageQuery),
    responses(
        (status = 200, description = "Comments, newest first", body = CommentPageResponse),
        (status = 404, description = "Video not found")
    ),
    tag = "comments"
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<PageQuery>,
) -> Result<Json<CommentPageResponse>, AppError> {
    let page = state
        .comment_service
        .list_comments(
            id,
            query.page.unwrap_or(0),
            query.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    get,
    path = "/videos/stream/{filename}/comments",
    params(("filename" = String, Path, description = "Stored video filename"), PageQuery),
    responses(
        (status = 200, description = "Comments, newest first", body = CommentPageResponse),
        (status = 404, description = "Video not found")
    ),
    tag = "comments"
)]
pub async fn list_comments_by_filename(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<CommentPageResponse>, AppError> {
    validate_stored_name(&filename)?;
    let video = state.video_service.find_by_video_path(&filename).await?;
    let page = state
        .comment_service
        .list_comments(
            video.video.id,
            query.page.unwrap_or(0),
            query.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page.into()))
}
