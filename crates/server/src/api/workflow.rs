/// 多步向导接口
///
/// 客户端先创建会话拿到 session_id，之后逐步提交表单、前进后退，
/// 全部步骤通过校验后提交落库；预约途中可以压入嵌套子向导

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::app_state::AppState;
use crate::middleware::AuthUser;
use crate::workflow::{commit, WorkflowKind};

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
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// 创建会话请求
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub kind: WorkflowKind,
}

/// 压入子向导请求
#[derive(Debug, Deserialize)]
pub struct AddWorkflowRequest {
    pub kind: WorkflowKind,
}

/// 创建路由
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session))
        .route("/:session_id", get(get_step))
        .route("/:session_id", delete(abandon_session))
        .route("/:session_id/step", post(post_step))
        .route("/:session_id/next", post(go_next))
        .route("/:session_id/prev", post(go_prev))
        .route("/:session_id/add", post(add_workflow))
        .route("/:session_id/commit", post(commit_session))
        .route("/:session_id/result", post(take_result))
}

/// 新建向导会话
async fn create_session(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.sessions().create(request.kind, &user_id).await;
    Ok((StatusCode::CREATED, Json(json!({"session_id": session_id}))))
}

/// 当前步骤的渲染上下文
async fn get_step(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let context = state
        .sessions()
        .modify(&session_id, &user_id, |session| {
            let repo = session.repository.clone();
            session.active().step_context(&repo)
        })
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(context))
}

/// 向当前步骤提交表单
async fn post_step(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Json(form): Json<JsonValue>,
) -> Result<impl IntoResponse, ApiError> {
    let context = state
        .sessions()
        .modify(&session_id, &user_id, |session| {
            let mut repo = session.repository.clone();
            session.active_mut().post(&mut repo, &form);
            session.repository = repo;
            let repo = session.repository.clone();
            session.active().step_context(&repo)
        })
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(context))
}

/// 前进到下一步
async fn go_next(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .sessions()
        .modify(&session_id, &user_id, |session| {
            session.active_mut().go_next().map(|()| {
                let repo = session.repository.clone();
                session.active().step_context(&repo)
            })
        })
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    match result {
        Ok(context) => Ok(Json(context)),
        Err(message) => Err(ApiError::BadRequest(message)),
    }
}

/// 回退到上一步
async fn go_prev(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let context = state
        .sessions()
        .modify(&session_id, &user_id, |session| {
            session.active_mut().go_prev();
            let repo = session.repository.clone();
            session.active().step_context(&repo)
        })
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(context))
}

/// 压入嵌套子向导
async fn add_workflow(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Json(request): Json<AddWorkflowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let context = state
        .sessions()
        .modify(&session_id, &user_id, |session| {
            session.add_workflow(request.kind);
            let repo = session.repository.clone();
            session.active().step_context(&repo)
        })
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(context))
}

/// 提交当前活动向导
async fn commit_session(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = commit::commit(&state, &session_id, &user_id)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(outcome))
}

/// 取走子向导交还的产物（取走后清空）
async fn take_result(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .sessions()
        .modify(&session_id, &user_id, |session| {
            session.repository.take_result()
        })
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    Ok(Json(json!({"result": result})))
}

/// 放弃会话
async fn abandon_session(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // 校验归属后再移除
    state
        .sessions()
        .modify(&session_id, &user_id, |_| ())
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    state.sessions().remove(&session_id).await;
    Ok(StatusCode::NO_CONTENT)
}
