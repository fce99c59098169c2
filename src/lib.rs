pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::comment_rate_limiter::CommentRateLimiter;
use crate::services::comment_service::CommentService;
use crate::services::login_guard::LoginAttemptGuard;
use crate::services::storage::StorageService;
use crate::services::thumbnail_cache::ThumbnailCache;
use crate::services::user_service::UserService;
use crate::services::video_service::VideoService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and the text fields next to the files.
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::register,
        api::handlers::auth::activate,
        api::handlers::auth::login,
        api::handlers::videos::list_videos,
        api::handlers::videos::get_video,
        api::handlers::videos::upload_video,
        api::handlers::videos::like_video,
        api::handlers::videos::stream_video,
        api::handlers::videos::get_thumbnail,
        api::handlers::comments::add_comment,
        api::handlers::comments::list_comments,
        api::handlers::comments::list_comments_by_filename,
        api::handlers::users::get_user,
        api::handlers::users::get_user_by_username,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::auth::RegisterRequest,
            api::handlers::auth::RegisterResponse,
            api::handlers::auth::AccountResponse,
            api::handlers::auth::LoginRequest,
            api::handlers::auth::AuthResponse,
            api::handlers::auth::MessageResponse,
            api::handlers::videos::VideoResponse,
            api::handlers::comments::CreateCommentRequest,
            api::handlers::comments::CommentResponse,
            api::handlers::comments::CommentPageResponse,
            api::handlers::users::UserProfileResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "auth", description = "Registration, activation and login"),
        (name = "videos", description = "Video upload, listing and streaming"),
        (name = "comments", description = "Video comments"),
        (name = "users", description = "Public user profiles"),
        (name = "system", description = "Operational endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub video_service: Arc<VideoService>,
    pub comment_service: Arc<CommentService>,
    pub user_service: Arc<UserService>,
    pub thumbnails: ThumbnailCache,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the services around one database and one storage backend. The
    /// rate limiter and login guard live as long as the state does.
    pub fn new(db: DatabaseConnection, storage: Arc<dyn StorageService>, config: AppConfig) -> Self {
        let limiter = CommentRateLimiter::from_config(&config);
        let guard = LoginAttemptGuard::from_config(&config);

        Self {
            video_service: Arc::new(VideoService::new(
                db.clone(),
                storage.clone(),
                config.clone(),
            )),
            comment_service: Arc::new(CommentService::new(db.clone(), limiter, config.clone())),
            user_service: Arc::new(UserService::new(db.clone(), guard, config.clone())),
            thumbnails: ThumbnailCache::new(config.thumbnail_cache_entries),
            db,
            storage,
            config,
        }
    }

    pub fn comment_limiter(&self) -> CommentRateLimiter {
        self.comment_service.limiter().clone()
    }

    pub fn login_guard(&self) -> LoginAttemptGuard {
        self.user_service.guard().clone()
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::RANGE])
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
        ])
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/auth/register", post(api::handlers::auth::register))
        .route("/auth/activate", get(api::handlers::auth::activate))
        .route("/auth/login", post(api::handlers::auth::login))
        .route(
            "/videos",
            get(api::handlers::videos::list_videos).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::optional_auth_middleware,
            )),
        )
        .route(
            "/videos/upload",
            post(api::handlers::videos::upload_video)
                .layer(DefaultBodyLimit::max(
                    state.config.max_video_size.saturating_mul(2) + MULTIPART_OVERHEAD,
                ))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/videos/:id",
            get(api::handlers::videos::get_video).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::optional_auth_middleware,
            )),
        )
        .route(
            "/videos/:id/like",
            post(api::handlers::videos::like_video).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/videos/:id/comments",
            get(api::handlers::comments::list_comments)
                .merge(post(api::handlers::comments::add_comment).layer(
                    from_fn_with_state(state.clone(), api::middleware::auth::auth_middleware),
                )),
        )
        .route(
            "/videos/stream/:filename",
            get(api::handlers::videos::stream_video),
        )
        .route(
            "/videos/stream/:filename/comments",
            get(api::handlers::comments::list_comments_by_filename),
        )
        .route(
            "/videos/thumbnail/:filename",
            get(api::handlers::videos::get_thumbnail),
        )
        .route("/users/:id", get(api::handlers::users::get_user))
        .route(
            "/users/username/:username",
            get(api::handlers::users::get_user_by_username),
        )
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
