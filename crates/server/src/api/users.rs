/// 用户接口

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::db::models::user::UpdateProfileDto;
use crate::middleware::AuthUser;
use crate::services::notify_service::NotifyService;
use crate::services::user_service::UserService;

/// API 错误响应
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message,
        });

        (status, body).into_response()
    }
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// 查询参数
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

/// 创建路由
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(get_profile))
        .route("/me", put(update_profile))
        .route("/me/token", get(get_token))
        .route("/me/notifications", get(list_notifications))
        .route("/me/notifications/:notification_id/read", post(mark_read))
        .route("/tokens/create-all", post(create_tokens_for_all))
}

/// 用户列表（选择协作者）
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let service = UserService::new(state);
    let response = service.list_users(query.page, query.page_size).await?;
    Ok(Json(response))
}

/// 当前用户资料
async fn get_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let service = UserService::new(state);
    let profile = service
        .get_profile(&user_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(profile))
}

/// 更新当前用户资料
async fn update_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(dto): Json<UpdateProfileDto>,
) -> Result<impl IntoResponse, ApiError> {
    let service = UserService::new(state);
    let profile = service.update_profile(&user_id, dto).await?;
    Ok(Json(profile))
}

/// 当前用户的 API 令牌（没有则创建）
async fn get_token(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let service = UserService::new(state);
    let token = service.get_or_create_token(&user_id).await?;
    Ok(Json(token))
}

/// 给所有缺少令牌的用户补发令牌
async fn create_tokens_for_all(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let service = UserService::new(state);
    let created = service.create_tokens_for_all().await?;
    Ok(Json(json!({"created": created})))
}

/// 当前用户的通知列表
async fn list_notifications(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let service = NotifyService::new(state);
    let response = service.list_notifications(&user_id).await?;
    Ok(Json(response))
}

/// 标记通知已读
async fn mark_read(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = NotifyService::new(state);
    service
        .mark_read(&user_id, &notification_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}
