use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::models::HealthCheckResponse;
use crate::service::OrderService;

pub async fn health_check(
    State(service): State<Arc<OrderService>>,
) -> Json<HealthCheckResponse> {
    Json(service.health_check().await)
}
