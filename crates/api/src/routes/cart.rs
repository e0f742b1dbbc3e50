//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{LineId, ProductId};
use domain::{CartLine, CartTotals};
use serde::{Deserialize, Serialize};
use store::CommerceStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::CurrentUser;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct AddLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub coupon_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub lines: Vec<CartLineResponse>,
    pub totals: CartTotals,
}

fn line_response(line: &CartLine) -> CartLineResponse {
    CartLineResponse {
        id: line.id.to_string(),
        product_id: line.product_id.to_string(),
        quantity: line.quantity,
        coupon_id: line.coupon_id.map(|c| c.to_string()),
        created_at: line.created_at,
    }
}

/// GET /cart — active lines plus totals (served from the short-TTL cache).
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn get<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
) -> Result<Json<CartResponse>, ApiError> {
    let view = state.cart.view(user.user_id, Utc::now()).await?;
    Ok(Json(CartResponse {
        lines: view.lines.iter().map(line_response).collect(),
        totals: view.totals,
    }))
}

/// POST /cart — add a line to the caller's cart.
#[tracing::instrument(skip(state, user, req), fields(user_id = %user.user_id))]
pub async fn add<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Json(req): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<CartLineResponse>), ApiError> {
    let line = state
        .cart
        .add_line(
            user.user_id,
            ProductId::from_uuid(req.product_id),
            req.quantity,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(line_response(&line))))
}

/// DELETE /cart/:id — soft-delete one of the caller's cart lines.
#[tracing::instrument(skip(state, user))]
pub async fn remove<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .cart
        .remove_line(user.user_id, LineId::from_uuid(id), Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
