use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::AppError;
use crate::workflows::OwnerScope;

pub const COMPANY_HEADER: &str = "x-company-id";
pub const USER_HEADER: &str = "x-user-id";
pub const TEAM_HEADER: &str = "x-team-id";

/// Caller identity forwarded by the upstream gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub team_id: Option<Uuid>,
}

impl TenantContext {
    /// Scope used for events raised by this caller
    pub fn owner_scope(&self) -> OwnerScope {
        let scope = OwnerScope::company(self.company_id).with_user(self.user_id);
        match self.team_id {
            Some(team_id) => scope.with_team(team_id),
            None => scope,
        }
    }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, AppError> {
    let Some(raw) = headers.get(name) else {
        return Ok(None);
    };
    let value = raw
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("Malformed {} header", name)))?;
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| AppError::Unauthorized(format!("{} header is not a valid id", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let company_id = header_uuid(&parts.headers, COMPANY_HEADER)
            .and_then(|id| id.ok_or_else(|| AppError::Unauthorized("Missing tenant header".to_string())))
            .map_err(IntoResponse::into_response)?;
        let user_id = header_uuid(&parts.headers, USER_HEADER)
            .and_then(|id| id.ok_or_else(|| AppError::Unauthorized("Missing user header".to_string())))
            .map_err(IntoResponse::into_response)?;
        let team_id = header_uuid(&parts.headers, TEAM_HEADER).map_err(IntoResponse::into_response)?;

        Ok(TenantContext {
            company_id,
            user_id,
            team_id,
        })
    }
}
