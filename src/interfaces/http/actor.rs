use super::error::ApiError;
use crate::domain::user::UserId;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

pub const ACTOR_HEADER: &str = "x-user-id";

/// The calling user, as asserted by the upstream authentication layer.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {ACTOR_HEADER} header")))?;
        value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .map(|id| Actor(UserId(id)))
            .ok_or_else(|| ApiError::Unauthorized(format!("malformed {ACTOR_HEADER} header")))
    }
}
