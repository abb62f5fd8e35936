//! Input validation utilities.
//!
//! This module contains functions for validating configuration inputs before they are used to
//! build outbound requests.

use crate::constants::MAX_HUB_URL_LEN;
use crate::{CoreError, CoreResult};

/// Validates that a hub base URL is safe to use for outbound deliveries.
///
/// Applies the same guardrails as any externally supplied URI:
/// - Rejects empty or whitespace-only strings
/// - Bounds the length to avoid pathological inputs
/// - Requires ASCII and an `http://` or `https://` scheme with a non-empty host
/// - Rejects query strings and fragments, since delivery paths are appended to the base
///
/// # Arguments
///
/// * `url` - The hub base URL to validate.
///
/// # Errors
///
/// Returns a `CoreError::InvalidInput` if the URL is invalid.
pub fn validate_hub_url(url: &str) -> CoreResult<()> {
    if url.trim().is_empty() {
        return Err(CoreError::InvalidInput("hub URL cannot be empty".into()));
    }

    if url.len() > MAX_HUB_URL_LEN {
        return Err(CoreError::InvalidInput(format!(
            "hub URL exceeds maximum length of {} characters",
            MAX_HUB_URL_LEN
        )));
    }

    if !url.is_ascii() {
        return Err(CoreError::InvalidInput(
            "hub URL must contain only ASCII characters".into(),
        ));
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            CoreError::InvalidInput("hub URL must use the http or https scheme".into())
        })?;

    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(CoreError::InvalidInput("hub URL must include a host".into()));
    }

    if url.bytes().any(|b| b.is_ascii_whitespace() || b == b'?' || b == b'#') {
        return Err(CoreError::InvalidInput(
            "hub URL must not contain whitespace, a query string or a fragment".into(),
        ));
    }

    Ok(())
}
