//! HTTP Basic authentication.

use super::AppState;
use crate::config::AuthConfig;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Reject requests without valid credentials. A no-op when auth is off.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(auth) = state.auth.as_deref() else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic)
        .map(|(username, password)| credentials_match(auth, &username, &password))
        .unwrap_or(false);

    if authorized {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "Rejected unauthenticated request");
        unauthorized()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"relay\"")],
        "Unauthorized",
    )
        .into_response()
}

/// Username and password from a `Basic` authorization header.
pub fn parse_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Lowercase hex SHA-256 of `password`.
pub fn hash_password(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Constant-time check of a username and plaintext password.
pub fn credentials_match(auth: &AuthConfig, username: &str, password: &str) -> bool {
    let digest = hash_password(password);
    let expected = auth.password_sha256.to_ascii_lowercase();

    let user_ok = username.as_bytes().ct_eq(auth.username.as_bytes());
    let pass_ok = digest.as_bytes().ct_eq(expected.as_bytes());
    (user_ok & pass_ok).into()
}
