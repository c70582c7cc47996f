/// 远端实验室 Agent 轮询接口
///
/// Agent 以 `Lab-Token` 头认证，按实验室名拉取 new/current/done 作业列表，
/// 逐个任务 POST 回报状态

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use common::models::TaskUpdate;
use sea_orm::TransactionTrait;

use crate::app_state::AppState;
use crate::db::models::lab::{LabStatus, Model as LabModel};
use crate::services::job_service::JobService;
use crate::services::lab_service::LabService;
use crate::services::vlan_service::VlanService;

/// API 错误响应
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
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
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// 实验室状态上报
#[derive(Debug, Deserialize)]
pub struct LabStatusUpdate {
    pub status: String,
}

/// VLAN 预留请求
#[derive(Debug, Deserialize)]
pub struct ReserveVlansRequest {
    pub ids: Vec<i32>,
}

/// 创建路由
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:lab_name/jobs/new", get(jobs_new))
        .route("/:lab_name/jobs/current", get(jobs_current))
        .route("/:lab_name/jobs/done", get(jobs_done))
        .route("/:lab_name/jobs/:job_id", get(get_job))
        .route("/:lab_name/jobs/:job_id/:task_id", post(update_task))
        .route("/:lab_name/status", post(update_lab_status))
        .route("/:lab_name/vlans/reserve", post(reserve_vlans))
}

/// 从请求头取 Lab-Token 并认证实验室
async fn authenticate(
    state: &AppState,
    lab_name: &str,
    headers: &HeaderMap,
) -> Result<LabModel, ApiError> {
    let token = headers
        .get("Lab-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("缺少 Lab-Token 头".to_string()))?;

    let service = LabService::new(state.clone());
    service
        .authenticate_lab(lab_name, token)
        .await
        .map_err(|e| ApiError::Unauthorized(e.to_string()))
}

/// 新任务（拉取后转为进行中）
async fn jobs_new(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let lab = authenticate(&state, &lab_name, &headers).await?;
    let service = JobService::new(state);
    let jobs = service.jobs_new(&lab).await?;
    Ok(Json(jobs))
}

/// 进行中任务的增量
async fn jobs_current(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let lab = authenticate(&state, &lab_name, &headers).await?;
    let service = JobService::new(state);
    let jobs = service.jobs_current(&lab).await?;
    Ok(Json(jobs))
}

/// 已完成任务
async fn jobs_done(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let lab = authenticate(&state, &lab_name, &headers).await?;
    let service = JobService::new(state);
    let jobs = service.jobs_done(&lab).await?;
    Ok(Json(jobs))
}

/// 单个作业的完整配置
async fn get_job(
    State(state): State<AppState>,
    Path((lab_name, job_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let lab = authenticate(&state, &lab_name, &headers).await?;
    let service = JobService::new(state);
    let job = service
        .get_job(&lab, &job_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(job))
}

/// 任务状态回报
async fn update_task(
    State(state): State<AppState>,
    Path((lab_name, job_id, task_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(update): Json<TaskUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let lab = authenticate(&state, &lab_name, &headers).await?;
    let service = JobService::new(state);
    service
        .update_task(&lab, &job_id, &task_id, update)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// 实验室状态上报
///
/// 实验室首次上线时顺带初始化它的 VLAN 池
async fn update_lab_status(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
    headers: HeaderMap,
    Json(update): Json<LabStatusUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let lab = authenticate(&state, &lab_name, &headers).await?;

    let vlan_service = VlanService::new(state.clone());
    vlan_service.ensure_pool(&state.sea_db(), &lab.id, false).await?;

    let service = LabService::new(state);
    let lab = service
        .update_status(&lab_name, LabStatus::from(update.status))
        .await?;
    Ok(Json(lab))
}

/// 预留一组实验室内部使用的 VLAN id
async fn reserve_vlans(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReserveVlansRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let lab = authenticate(&state, &lab_name, &headers).await?;

    // 行级锁要在事务里才有效
    let db = state.sea_db();
    let txn = db
        .begin()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let service = VlanService::new(state.clone());
    service
        .reserve_vlans(&txn, &lab.id, &request.ids)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    txn.commit()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}
