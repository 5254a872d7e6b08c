//! Acting user extractor.
//!
//! Structural edits record who made them so a second user editing the same
//! draft can be turned away. The user id is read from the `X-Flowplane-User`
//! header; requests without it act anonymously.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::error::AppError;

pub const USER_HEADER: &str = "x-flowplane-user";

/// The user a request acts on behalf of, if any.
pub struct ActingUser(pub Option<String>);

impl ActingUser {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_HEADER) else {
            return Ok(ActingUser(None));
        };
        let user = value
            .to_str()
            .map_err(|_| AppError::Validation(format!("Invalid {USER_HEADER} header encoding")))?
            .trim();
        Ok(ActingUser((!user.is_empty()).then(|| user.to_string())))
    }
}
