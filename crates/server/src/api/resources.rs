/// 资源清单接口（实验室、主机、规格、模板、cloud-init）

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::db::models::resource_template::CreateTemplateDto;
use crate::middleware::AuthUser;
use crate::services::lab_service::LabService;
use crate::services::resource_service::ResourceService;

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

/// 创建路由
pub fn routes() -> Router<AppState> {
    Router::new()
        // 实验室清单
        .route("/labs", get(list_labs))
        .route("/labs/:lab_name", get(get_lab))
        .route("/labs/:lab_name/hosts", get(list_hosts))
        .route("/labs/:lab_name/profiles", get(list_profiles))
        .route("/labs/:lab_name/public-networks", get(list_public_networks))
        .route("/hosts/:host_id/interfaces", get(list_interfaces))

        // 资源包
        .route("/bundles/:bundle_id", get(get_bundle))

        // 外部编排服务透传
        .route("/flavors", get(liblaas_flavors))
        .route("/liblaas-templates", get(liblaas_templates))

        // 资源模板
        .route("/templates", get(list_templates))
        .route("/templates", post(create_template))
        .route("/templates/:template_id", get(get_template))
        .route("/templates/:template_id", delete(delete_template))
        .route("/templates/:template_id/reservable", get(template_reservable))
}

/// cloud-init 路由（无用户认证，部署中的主机拉取）
pub fn ci_routes() -> Router<AppState> {
    Router::new().route("/:resource_id/:host_id/userdata", get(ci_userdata))
}

// ==================== 实验室接口 ====================

/// 实验室列表
async fn list_labs(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let service = LabService::new(state);
    let response = service.list_labs().await?;
    Ok(Json(response))
}

/// 实验室详情
async fn get_lab(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = LabService::new(state);
    let lab = service
        .get_lab_by_name(&lab_name)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(crate::db::models::lab::LabResponse::from(lab)))
}

/// 实验室主机清单
async fn list_hosts(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = LabService::new(state.clone());
    let lab = service
        .get_lab_by_name(&lab_name)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    let response = service.list_hosts(&lab.id).await?;
    Ok(Json(response))
}

/// 实验室主机规格清单
async fn list_profiles(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = LabService::new(state.clone());
    let lab = service
        .get_lab_by_name(&lab_name)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    let profiles = service.list_profiles(&lab.id).await?;
    Ok(Json(profiles))
}

/// 实验室公网 VLAN 清单
async fn list_public_networks(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = LabService::new(state.clone());
    let lab = service
        .get_lab_by_name(&lab_name)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    let networks = service.list_public_networks(&lab.id).await?;
    Ok(Json(networks))
}

/// 主机网卡清单
async fn list_interfaces(
    State(state): State<AppState>,
    Path(host_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = LabService::new(state);
    let interfaces = service.list_interfaces(&host_id).await?;
    Ok(Json(interfaces))
}

/// 资源包详情
async fn get_bundle(
    State(state): State<AppState>,
    Path(bundle_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResourceService::new(state);
    let bundle = service
        .get_bundle(&bundle_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(bundle))
}

/// 编排服务的硬件规格列表
async fn liblaas_flavors(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    match state.liblaas().flavors().await {
        Some(flavors) => Ok(Json(flavors)),
        None => Err(ApiError::Internal("编排服务不可用".to_string())),
    }
}

/// 编排服务的模板列表
async fn liblaas_templates(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    match state.liblaas().templates().await {
        Some(templates) => Ok(Json(templates)),
        None => Err(ApiError::Internal("编排服务不可用".to_string())),
    }
}

// ==================== 模板接口 ====================

/// 可见模板列表
async fn list_templates(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResourceService::new(state);
    let response = service.list_templates(&user_id).await?;
    Ok(Json(response))
}

/// 创建模板
async fn create_template(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(dto): Json<CreateTemplateDto>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResourceService::new(state);
    let template = service
        .create_template(&user_id, dto)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// 模板详情
async fn get_template(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResourceService::new(state);
    let template = service
        .get_template(&template_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(crate::db::models::resource_template::TemplateResponse::from(template)))
}

/// 删除模板（被引用的改为隐藏）
async fn delete_template(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(template_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResourceService::new(state);
    service
        .delete_template(&user_id, &template_id)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((StatusCode::NO_CONTENT, ()))
}

/// 模板当前是否可预约
async fn template_reservable(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResourceService::new(state);
    let template = service
        .get_template(&template_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    let reservable = service.template_is_reservable(&template).await?;
    Ok(Json(json!({"reservable": reservable})))
}

// ==================== cloud-init 接口 ====================

/// 主机的 cloud-init 用户数据（text/yaml）
async fn ci_userdata(
    State(state): State<AppState>,
    Path((resource_id, host_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResourceService::new(state);
    let userdata = service
        .ci_userdata(&resource_id, &host_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/yaml; charset=utf-8")],
        userdata,
    ))
}
