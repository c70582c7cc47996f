pub mod bookings;
pub mod jobs;
pub mod metrics;
pub mod resources;
pub mod users;
pub mod workflow;

use axum::{
    middleware::from_fn_with_state,
    Router,
};

use crate::{
    app_state::AppState,
    middleware::auth_middleware,
};

/// 所有 API 路由（统一入口）
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // 远端实验室 Agent 轮询接口（Lab-Token 头认证）
        .nest("/labs", jobs::routes())
        // cloud-init 拉取（部署中的主机访问，无用户认证）
        .nest("/ci", resources::ci_routes())
        // 需要用户令牌认证的路由
        .nest("/bookings",
            bookings::routes()
                .layer(from_fn_with_state(state.clone(), auth_middleware))
        )
        .nest("/resources",
            resources::routes()
                .layer(from_fn_with_state(state.clone(), auth_middleware))
        )
        .nest("/users",
            users::routes()
                .layer(from_fn_with_state(state.clone(), auth_middleware))
        )
        .nest("/workflow",
            workflow::routes()
                .layer(from_fn_with_state(state, auth_middleware))
        )
}
