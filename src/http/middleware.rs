//! Session token extraction middleware

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};

/// Opaque session token taken from the `Authorization` header
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Extract token from a `Bearer` authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidFormat,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string()
        });

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Middleware to require a session token. Whether the token belongs to a
/// live session is decided by the game task.
pub async fn require_session(mut request: Request, next: Next) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;

    let token = extract_bearer_token(auth_header)
        .ok_or(AuthError::InvalidFormat)?
        .to_string();

    // Insert into request extensions for handlers to access
    request.extensions_mut().insert(SessionToken(token));

    Ok(next.run(request).await)
}
