//! Caller identity from gateway-set headers.
//!
//! Authentication happens upstream; these headers are trusted as-is.

use crate::error::ApiError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use cohort_core::{SessionType, UserContext};

pub const USER_HEADER: &str = "x-cohort-user";
pub const ISSUER_HEADER: &str = "x-cohort-issuer";
pub const GROUPS_HEADER: &str = "x-cohort-groups";
pub const ADMIN_HEADER: &str = "x-cohort-admin";
pub const SESSION_HEADER: &str = "x-cohort-session";

/// The caller of a request.
#[derive(Clone, Debug)]
pub struct Caller(pub UserContext);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Caller)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn caller_from_headers(headers: &HeaderMap) -> Result<UserContext, ApiError> {
    let username = header(headers, USER_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_HEADER} header")))?;
    let issuer = header(headers, ISSUER_HEADER).unwrap_or_default();

    let groups: Vec<&str> = header(headers, GROUPS_HEADER)
        .map(|g| g.split(',').map(str::trim).filter(|g| !g.is_empty()).collect())
        .unwrap_or_default();

    let is_admin = header(headers, ADMIN_HEADER)
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");

    let session_type = match header(headers, SESSION_HEADER) {
        Some(raw) => raw.parse::<SessionType>()?,
        None => SessionType::default(),
    };

    let user = UserContext::new(username, issuer)?
        .with_groups(groups)
        .with_admin(is_admin)
        .with_session(session_type, false);

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_reads_all_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("jdoe"));
        headers.insert(ISSUER_HEADER, HeaderValue::from_static("idp"));
        headers.insert(GROUPS_HEADER, HeaderValue::from_static("onc, cardio,,"));
        headers.insert(ADMIN_HEADER, HeaderValue::from_static("TRUE"));
        headers.insert(SESSION_HEADER, HeaderValue::from_static("qi"));

        let user = caller_from_headers(&headers).unwrap();

        assert_eq!(user.qualified_name(), "jdoe@idp");
        assert_eq!(user.groups, vec!["onc", "cardio"]);
        assert!(user.is_admin);
        assert_eq!(user.session_type, SessionType::QualityImprovement);
    }

    #[test]
    fn test_missing_user_is_unauthorized() {
        let result = caller_from_headers(&HeaderMap::new());

        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_unknown_session_is_bad_request() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("jdoe"));
        headers.insert(SESSION_HEADER, HeaderValue::from_static("training"));

        assert!(matches!(caller_from_headers(&headers), Err(ApiError::BadRequest(_))));
    }
}
