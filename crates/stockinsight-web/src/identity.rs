use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use stockinsight_core::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity from the `X-User-Id` header. Extraction fails with a
/// validation error before the handler body runs.
#[derive(Debug, Clone)]
pub struct CallerId(pub UserId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .map(|value| value.to_str().unwrap_or_default());
        Ok(Self(UserId::from_header(raw)?))
    }
}
