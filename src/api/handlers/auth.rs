use crate::AppState;
use crate::api::error::AppError;
use crate::entities::users;
use crate::services::user_service::NewAccount;
use axum::{
    Json,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 3, max = 50, message = "Username must be between 3 and 50 characters"))]
    pub username: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(max = 255))]
    pub address: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AccountResponse {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub enabled: bool,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<users::Model> for AccountResponse {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            enabled: user.enabled,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
    pub user: AccountResponse,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize, IntoParams)]
pub struct ActivateQuery {
    pub token: String,
}

/// First `X-Forwarded-For` entry, else the peer address.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(ip) = val.split(',').next()
        && !ip.trim().is_empty()
    {
        return ip.trim().to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; activation required", body = RegisterResponse),
        (status = 400, description = "Invalid registration data"),
        (status = 409, description = "Email or username already in use")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let user = state
        .user_service
        .register(NewAccount {
            email: payload.email,
            username: payload.username,
            password: payload.password,
            first_name: payload.first_name,
            last_name: payload.last_name,
            address: payload.address,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Check your email to activate the account."
                .to_string(),
            user: user.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/auth/activate",
    params(ActivateQuery),
    responses(
        (status = 200, description = "Account activated", body = MessageResponse),
        (status = 400, description = "Unknown or expired token")
    ),
    tag = "auth"
)]
pub async fn activate(
    State(state): State<AppState>,
    Query(query): Query<ActivateQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    state.user_service.activate(&query.token).await?;
    Ok(Json(MessageResponse {
        message: "Account activated. You can now log in.".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account not activated"),
        (status = 429, description = "Too many failed attempts")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let address = client_address(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let (user, token) = state
        .user_service
        .login(&payload.email, &payload.password, &address)
        .await?;

    tracing::info!("🔑 User {} logged in from {}", user.id, address);

    Ok(Json(AuthResponse {
        token,
        message: "Login successful".to_string(),
    }))
}
