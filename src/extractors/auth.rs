//! Bearer token extractors: any signed-in user, or admins only.

use crate::auth::Claims;
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

/// Verified claims of the caller.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Claims);

/// Verified claims of a caller whose role is `admin`.
#[derive(Clone, Debug)]
pub struct AdminUser(pub Claims);

fn bearer(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;
    header
        .to_str()
        .ok()
        .and_then(|v| {
            let (scheme, token) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?;
        Ok(CurrentUser(state.keys.verify(token)?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(claims) = CurrentUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            return Err(AppError::Forbidden("Admin privileges required".into()));
        }
        Ok(AdminUser(claims))
    }
}
