use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};

use super::response::ApiError;
use crate::service::{Claims, ServiceError, Wgcfg};

/// A caller holding a valid bearer token.
pub struct Operator(pub Claims);

#[async_trait]
impl FromRequestParts<Wgcfg> for Operator {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, service: &Wgcfg) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ServiceError::AccessDenied)?;

        Ok(Operator(service.verify_token(token.trim())?))
    }
}
