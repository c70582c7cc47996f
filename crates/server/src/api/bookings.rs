/// 预约管理接口

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::db::models::booking::{ExtendBookingDto, QuickBookingDto};
use crate::middleware::AuthUser;
use crate::services::booking_service::BookingService;

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
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
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
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// 查询参数
#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
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
        .route("/quick", post(quick_deploy))
        .route("/", get(list_bookings))
        .route("/:booking_id", get(get_booking))
        .route("/:booking_id/job", get(get_booking_job))
        .route("/:booking_id/extend", post(extend_booking))
        .route("/:booking_id/end", post(end_booking))
}

/// 快速预约
async fn quick_deploy(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(dto): Json<QuickBookingDto>,
) -> Result<impl IntoResponse, ApiError> {
    let service = BookingService::new(state);
    let booking = service
        .quick_deploy(&user_id, dto)
        .await
        .map_err(|e| classify(e))?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// 自己的预约列表
async fn list_bookings(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let service = BookingService::new(state);
    let response = service
        .list_bookings(&user_id, query.page, query.page_size)
        .await?;
    Ok(Json(response))
}

/// 预约详情
async fn get_booking(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = BookingService::new(state);
    let booking = service
        .get_booking(&user_id, &booking_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(booking))
}

/// 预约对应的部署作业摘要
async fn get_booking_job(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // 先做可见性校验
    let booking_service = BookingService::new(state.clone());
    booking_service
        .get_booking(&user_id, &booking_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    let job_service = crate::services::job_service::JobService::new(state);
    let job = job_service
        .job_for_booking(&booking_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("预约 {} 没有作业", booking_id)))?;

    let tasks = job_service.tasks_for_job(&job.id).await?;
    let summary = common::models::JobSummary {
        id: job.id,
        booking_id: job.booking_id,
        complete: job.complete,
        created_at: job.created_at.into(),
    };
    Ok(Json(serde_json::json!({"job": summary, "tasks": tasks})))
}

/// 延长预约
async fn extend_booking(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(booking_id): Path<String>,
    Json(dto): Json<ExtendBookingDto>,
) -> Result<impl IntoResponse, ApiError> {
    let service = BookingService::new(state);
    let booking = service
        .extend_booking(&user_id, &booking_id, dto)
        .await
        .map_err(|e| classify(e))?;
    Ok(Json(booking))
}

/// 结束预约
async fn end_booking(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = BookingService::new(state);
    let booking = service
        .end_booking(&user_id, &booking_id)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(booking))
}

/// 把业务错误归入 HTTP 状态: 预约时间冲突归 409，其余归 400
fn classify(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<common::errors::Error>() {
        Some(common::errors::Error::BookingConflict(msg)) => ApiError::Conflict(msg.clone()),
        _ => ApiError::BadRequest(err.to_string()),
    }
}
