/// 认证中间件
///
/// 用户接口用 `Authorization: Token <token>` 头认证，
/// 令牌在 api_tokens 表中逐条登记

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::app_state::AppState;
use crate::services::user_service::UserService;

/// 认证通过后的当前用户
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Token "))
        .map(|v| v.trim().to_string());

    let Some(token) = token else {
        return unauthorized("缺少 Authorization 头");
    };

    let service = UserService::new(state);
    match service.resolve_token(&token).await {
        Ok(Some(user_id)) => {
            request.extensions_mut().insert(AuthUser(user_id));
            next.run(request).await
        }
        Ok(None) => unauthorized("令牌无效"),
        Err(_) => unauthorized("令牌校验失败"),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Unauthorized",
            "message": message,
        })),
    )
        .into_response()
}
