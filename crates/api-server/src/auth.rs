use std::collections::HashSet;

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Checks for a bearer API key in:
/// 1. `X-API-Key` header (recommended)
/// 2. `Authorization: Bearer <token>` header
/// 3. `api_key` query parameter (discouraged, kept for producers that can't
///    set headers)
///
/// `/`, `/health`, and `/metrics` are exempt. This is the only auth this
/// system has (§1 non-goal: "authentication beyond a shared bearer token").
pub async fn auth_middleware(headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, AuthError> {
    let path = request.uri().path();
    if path == "/" || path == "/health" || path == "/metrics" {
        return Ok(next.run(request).await);
    }

    let valid_keys = get_valid_api_keys();
    let api_key = extract_api_key(&headers, &request)?;

    if !valid_keys.contains(&api_key) {
        tracing::warn!(key = %mask_api_key(&api_key), "invalid API key attempted");
        return Err(AuthError::InvalidApiKey);
    }

    tracing::debug!(key = %mask_api_key(&api_key), "authenticated request");
    request.extensions_mut().insert(ValidatedApiKey(api_key));
    Ok(next.run(request).await)
}

fn extract_api_key(headers: &HeaderMap, request: &Request) -> Result<String, AuthError> {
    if let Some(key) = headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    if let Some(auth) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
    }

    if let Some(query) = request.uri().query() {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                if key == "api_key" && !value.is_empty() {
                    return Ok(value.to_string());
                }
            }
        }
    }

    Err(AuthError::MissingApiKey)
}

fn get_valid_api_keys() -> HashSet<String> {
    std::env::var("API_KEYS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

#[derive(Clone)]
pub struct ValidatedApiKey(#[allow(dead_code)] pub String);

#[derive(Debug)]
pub enum AuthError {
    MissingApiKey,
    InvalidApiKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingApiKey => (
                StatusCode::UNAUTHORIZED,
                "missing API key. Provide via X-API-Key header, Authorization: Bearer header, or api_key query parameter.",
            ),
            AuthError::InvalidApiKey => (StatusCode::FORBIDDEN, "invalid API key."),
        };
        (status, Json(json!({"success": false, "error": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_keys_showing_first_and_last_four() {
        assert_eq!(mask_api_key("sk_live_abcdefgh1234"), "sk_l...1234");
    }

    #[test]
    fn masks_short_keys_entirely() {
        assert_eq!(mask_api_key("short"), "****");
    }

    #[test]
    fn reads_keys_from_env_var() {
        std::env::set_var("API_KEYS", "alpha, beta ,");
        let keys = get_valid_api_keys();
        assert!(keys.contains("alpha"));
        assert!(keys.contains("beta"));
        assert_eq!(keys.len(), 2);
        std::env::remove_var("API_KEYS");
    }
}
