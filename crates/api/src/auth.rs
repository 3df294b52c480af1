//! Caller identity extracted from request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use domain::{Caller, Role};

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller role (`user` or `admin`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller on whose behalf a handler runs.
///
/// Identity is set by the gateway in front of this service. A request without
/// `x-user-id` is rejected with `401`; a missing role means `user`.
#[derive(Debug, Clone)]
pub struct CurrentCaller(pub Caller);

impl<S> FromRequestParts<S> for CurrentCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;

        let role = match header(parts, USER_ROLE_HEADER)? {
            Some(role) => role.parse::<Role>().map_err(ApiError::Unauthorized)?,
            None => Role::User,
        };

        Ok(CurrentCaller(Caller {
            user_id: user_id.into(),
            role,
        }))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| ApiError::Unauthorized(format!("{name} header is not valid text")))
        })
        .transpose()
}
