use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::service::OrderService;

pub fn create_router(service: Arc<OrderService>) -> Router {
    Router::new()
        .route("/v1/orders", post(handlers::orders::place_order))
        .route("/v1/orders/cancel", post(handlers::orders::cancel_order))
        .route("/v1/health", get(handlers::health::health_check))
        .with_state(service)
}
