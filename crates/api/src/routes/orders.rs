//! Order endpoints: creation, listing, detail, and status transitions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{CartService, OrderLifecycle, PaymentOrchestrator, PromotionService};
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, OrderStatus, PricedLine, pricing};
use serde::Serialize;
use store::CommerceStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::{CurrentUser, Staff};

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore> {
    pub lifecycle: OrderLifecycle<S>,
    pub orchestrator: PaymentOrchestrator<S>,
    pub promotions: PromotionService<S>,
    pub cart: CartService<S>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_number: String,
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub base_unit_price: i64,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Serialize)]
pub struct StatusLogResponse {
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLineResponse>,
    pub subtotal: i64,
    pub coupon_discount: i64,
    pub final_total: i64,
    pub bank_type: Option<String>,
    pub tracking_code: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_logs: Option<Vec<StatusLogResponse>>,
}

pub(crate) async fn order_response<S: CommerceStore>(
    state: &AppState<S>,
    order: &Order,
    with_logs: bool,
) -> Result<OrderResponse, ApiError> {
    // Totals are evaluated against the snapshot, with the coupon judged at
    // creation time so a later expiry does not rewrite a placed order.
    let coupon = match order.coupon_id {
        Some(coupon_id) => state.promotions.get(coupon_id).await.ok(),
        None => None,
    };
    let priced: Vec<PricedLine> = order
        .lines
        .iter()
        .map(|l| PricedLine::new(l.unit_price, l.quantity))
        .collect();
    let totals = pricing::cart_totals(&priced, coupon.as_ref(), order.created_at);

    let status_logs = if with_logs {
        let logs = state.lifecycle.status_logs(order.id).await?;
        Some(
            logs.into_iter()
                .map(|l| StatusLogResponse {
                    old_status: l.old_status,
                    new_status: l.new_status,
                    actor: l.actor.map(|a| a.to_string()),
                    created_at: l.created_at,
                })
                .collect(),
        )
    } else {
        None
    };

    Ok(OrderResponse {
        id: order.id.to_string(),
        order_number: order.order_number.clone(),
        status: order.status,
        lines: order
            .lines
            .iter()
            .map(|l| OrderLineResponse {
                product_id: l.product_id.to_string(),
                title: l.title.clone(),
                quantity: l.quantity,
                base_unit_price: l.base_unit_price.units(),
                unit_price: l.unit_price.units(),
                subtotal: l.subtotal().units(),
            })
            .collect(),
        subtotal: totals.subtotal.units(),
        coupon_discount: totals.coupon_discount.units(),
        final_total: totals.final_total.units(),
        bank_type: order.bank_type.map(|b| b.to_string()),
        tracking_code: order.tracking_code.clone(),
        created_at: order.created_at,
        status_logs,
    })
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    Uuid::parse_str(id)
        .map(OrderId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

/// Loads an order, hiding other users' orders from non-staff callers.
async fn load_visible_order<S: CommerceStore>(
    state: &AppState<S>,
    user: CurrentUser,
    id: &str,
) -> Result<Order, ApiError> {
    let order_id = parse_order_id(id)?;
    let order = state.lifecycle.get_order(order_id).await?;
    if order.user_id != user.user_id && !user.is_staff {
        return Err(ApiError::NotFound(format!("Order not found: {order_id}")));
    }
    Ok(order)
}

// -- Handlers --

/// POST /orders — snapshot the caller's active cart into a pending order.
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn create<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let order = state
        .lifecycle
        .create_order(user.user_id, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_number: order.order_number,
            status: order.status,
        }),
    ))
}

/// GET /orders — the caller's orders, newest first.
#[tracing::instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn list<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.lifecycle.orders_for_user(user.user_id).await?;

    let mut responses = Vec::with_capacity(orders.len());
    for order in &orders {
        responses.push(order_response(&state, order, false).await?);
    }
    Ok(Json(responses))
}

/// GET /orders/:id — order detail including lines, totals, and audit trail.
#[tracing::instrument(skip(state, user))]
pub async fn get<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = load_visible_order(&state, user, &id).await?;
    Ok(Json(order_response(&state, &order, true).await?))
}

/// POST /orders/:id/cancel — cancel the order if the state machine allows.
#[tracing::instrument(skip(state, user))]
pub async fn cancel<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = load_visible_order(&state, user, &id).await?;
    let updated = state
        .lifecycle
        .cancel(order.id, Some(user.user_id), Utc::now())
        .await?;
    Ok(Json(order_response(&state, &updated, false).await?))
}

/// POST /orders/:id/process — staff: start fulfilling a paid order.
#[tracing::instrument(skip(state, staff))]
pub async fn process<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let updated = state
        .lifecycle
        .process(order_id, Some(staff.0.user_id), Utc::now())
        .await?;
    Ok(Json(order_response(&state, &updated, false).await?))
}

/// POST /orders/:id/ship — staff: hand the order to the carrier.
#[tracing::instrument(skip(state, staff))]
pub async fn ship<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let updated = state
        .lifecycle
        .ship(order_id, Some(staff.0.user_id), Utc::now())
        .await?;
    Ok(Json(order_response(&state, &updated, false).await?))
}

/// POST /orders/:id/deliver — staff: close out a shipped order.
#[tracing::instrument(skip(state, staff))]
pub async fn deliver<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    staff: Staff,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let updated = state
        .lifecycle
        .deliver(order_id, Some(staff.0.user_id), Utc::now())
        .await?;
    Ok(Json(order_response(&state, &updated, false).await?))
}
