//! Caller identity
//!
//! Authentication happens upstream; the gateway in front of this service
//! forwards the resolved user id in `x-user-id`.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::{AppError, AppErrorKind, DomainError};
use crate::middleware::error::get_request_id_from_headers;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match user_id {
            Some(user_id) => Ok(Self {
                user_id: user_id.to_string(),
            }),
            None => {
                let mut err = AppError::new(AppErrorKind::Domain(DomainError::Unauthenticated));
                if let Some(request_id) = get_request_id_from_headers(&parts.headers) {
                    err = err.with_request_id(request_id);
                }
                Err(err)
            }
        }
    }
}
