use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use types::OrderError;

use crate::error::ApiError;
use crate::models::{
    CancelOrderRequest, CancelOrderResponse, PlaceOrderRequest, PlaceOrderResponse,
};
use crate::service::OrderService;

pub async fn place_order(
    State(service): State<Arc<OrderService>>,
    payload: Option<Json<PlaceOrderRequest>>,
) -> Result<Json<PlaceOrderResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::InvalidArgument(OrderError::EmptyOrder.to_string()));
    };
    Ok(Json(service.place_order(request).await?))
}

pub async fn cancel_order(
    State(service): State<Arc<OrderService>>,
    payload: Option<Json<CancelOrderRequest>>,
) -> Result<Json<CancelOrderResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::InvalidArgument(OrderError::EmptyOrder.to_string()));
    };
    Ok(Json(service.cancel_order(request).await?))
}
