/// Prometheus 指标导出接口

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::metrics;

/// GET /metrics
pub async fn get_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        metrics::gather(),
    )
}
