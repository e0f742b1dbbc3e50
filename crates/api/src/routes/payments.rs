//! Payment gateway webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use checkout::PaymentConfirmation;
use chrono::Utc;
use store::CommerceStore;

use crate::error::ApiError;
use crate::routes::orders::{AppState, OrderResponse, order_response};

/// POST /payments/confirm — gateway confirmation endpoint.
///
/// Idempotent: replaying a confirmation for an already-paid order returns
/// its current state without re-running any side effects.
#[tracing::instrument(skip(state, confirmation), fields(order_id = %confirmation.order_id))]
pub async fn confirm<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(confirmation): Json<PaymentConfirmation>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orchestrator
        .confirm_payment(confirmation, Utc::now())
        .await?;
    Ok(Json(order_response(&state, &order, false).await?))
}
