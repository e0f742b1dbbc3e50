//! Caller identity, as supplied by the identity service.
//!
//! Authentication itself is outside this core; upstream middleware is
//! trusted to resolve the session and forward an opaque user id plus a
//! staff flag in headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use uuid::Uuid;

use crate::error::ApiError;

const USER_HEADER: &str = "x-user-id";
const STAFF_HEADER: &str = "x-staff";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub is_staff: bool,
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest(format!("{USER_HEADER} header is required")))?;

        let user_id = Uuid::parse_str(raw)
            .map(UserId::from_uuid)
            .map_err(|e| ApiError::BadRequest(format!("Invalid {USER_HEADER}: {e}")))?;

        let is_staff = parts
            .headers
            .get(STAFF_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "true" || v == "1");

        Ok(CurrentUser { user_id, is_staff })
    }
}

/// A caller that must carry the staff flag.
#[derive(Debug, Clone, Copy)]
pub struct Staff(pub CurrentUser);

impl<S: Send + Sync> FromRequestParts<S> for Staff {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(ApiError::Forbidden("staff access required".to_string()));
        }
        Ok(Staff(user))
    }
}
