//! Promotion administration and coupon endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::PromotionId;
use domain::{NewPromotion, Promotion, PromotionKind};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, PromotionFilter};
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::{CurrentUser, Staff};
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct PromotionListQuery {
    pub is_active: Option<bool>,
    pub discount_type: Option<PromotionKind>,
    /// Keep promotions whose window starts at or after this instant.
    pub start_date: Option<DateTime<Utc>>,
    /// Keep promotions whose window ends at or before this instant.
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct CouponRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct PromotionResponse {
    pub id: String,
    pub title: String,
    pub kind: PromotionKind,
    pub discount_percent: u8,
    pub code: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub max_uses: Option<u32>,
    pub used_count: u32,
}

fn promotion_response(promotion: &Promotion) -> PromotionResponse {
    PromotionResponse {
        id: promotion.id.to_string(),
        title: promotion.title.clone(),
        kind: promotion.kind,
        discount_percent: promotion.discount_percent,
        code: promotion.code.clone(),
        starts_at: promotion.starts_at,
        ends_at: promotion.ends_at,
        is_active: promotion.is_active,
        max_uses: promotion.max_uses,
        used_count: promotion.used_count,
    }
}

/// GET /promotions — staff listing with filters.
#[tracing::instrument(skip(state, _staff, query))]
pub async fn list<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _staff: Staff,
    Query(query): Query<PromotionListQuery>,
) -> Result<Json<Vec<PromotionResponse>>, ApiError> {
    let promotions = state
        .promotions
        .list(PromotionFilter {
            is_active: query.is_active,
            kind: query.discount_type,
            starts_after: query.start_date,
            ends_before: query.end_date,
        })
        .await?;
    Ok(Json(promotions.iter().map(promotion_response).collect()))
}

/// POST /promotions — staff creation.
#[tracing::instrument(skip(state, _staff, input))]
pub async fn create<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _staff: Staff,
    Json(input): Json<NewPromotion>,
) -> Result<(StatusCode, Json<PromotionResponse>), ApiError> {
    let promotion = state.promotions.create(input, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(promotion_response(&promotion))))
}

/// GET /promotions/:id — staff detail.
#[tracing::instrument(skip(state, _staff))]
pub async fn get<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _staff: Staff,
    Path(id): Path<Uuid>,
) -> Result<Json<PromotionResponse>, ApiError> {
    let promotion = state.promotions.get(PromotionId::from_uuid(id)).await?;
    Ok(Json(promotion_response(&promotion)))
}

/// POST /coupons/validate — look up a coupon code for the caller.
#[tracing::instrument(skip(state, _user, req))]
pub async fn validate<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _user: CurrentUser,
    Json(req): Json<CouponRequest>,
) -> Result<Json<PromotionResponse>, ApiError> {
    let promotion = state.promotions.validate_code(&req.code, Utc::now()).await?;
    Ok(Json(promotion_response(&promotion)))
}

/// POST /coupons/apply — attach a coupon to the caller's active cart.
#[tracing::instrument(skip(state, user, req), fields(user_id = %user.user_id))]
pub async fn apply<S: CommerceStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: CurrentUser,
    Json(req): Json<CouponRequest>,
) -> Result<Json<PromotionResponse>, ApiError> {
    let promotion = state
        .promotions
        .apply_coupon(user.user_id, &req.code, Utc::now())
        .await?;
    Ok(Json(promotion_response(&promotion)))
}
