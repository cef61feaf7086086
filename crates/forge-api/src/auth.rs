//! Authentication is explicitly out of scope for this pipeline
//! (`spec.md` §1 Non-goals: "assumed provided upstream"). This
//! extractor stands in for whatever upstream gateway would normally
//! attach an authenticated identity, reading it from a header so the
//! rest of the router can treat every handler's caller as already
//! authenticated.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use forge_types::UserId;

pub const CALLER_HEADER: &str = "x-user-id";

pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing x-user-id header"))?;

        let id = uuid::Uuid::parse_str(header)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "x-user-id is not a valid uuid"))?;

        Ok(Caller(UserId(id)))
    }
}
