//! Role guard. Authentication happens upstream; the fronting proxy forwards
//! the caller's role in `X-Caller-Role`.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::AppError;

pub const ROLE_HEADER: &str = "x-caller-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Dashboard routes.
pub const VIEWERS: &[Role] = &[Role::User, Role::Admin];
pub const ADMINS: &[Role] = &[Role::Admin];

/// Role of the current caller. Extraction fails with 401 when the header is
/// absent; an unrecognised role is treated as insufficient.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Option<Role>);

impl Caller {
    pub fn require(self, allowed: &[Role]) -> Result<Role, AppError> {
        match self.0 {
            Some(role) if allowed.contains(&role) => Ok(role),
            _ => Err(AppError::Forbidden),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ROLE_HEADER)
            .ok_or(AppError::Unauthenticated)?;
        let role = header.to_str().ok().and_then(Role::parse);
        Ok(Caller(role))
    }
}
