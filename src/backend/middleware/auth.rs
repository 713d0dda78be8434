/**
 * Authentication Middleware
 *
 * Protects the workspace routes. The token is read from the
 * `Authorization: Bearer <token>` header. The SSE stream also accepts a
 * `token` query parameter since browser `EventSource` connections cannot set
 * headers; no other route does. The verified caller is attached to the
 * request extensions.
 */

use crate::backend::auth::sessions::verify_token;
use crate::backend::error::BackendError;
use crate::backend::server::state::AppState;
use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, Method},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

/// Subject assigned to requests when auth is disabled
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Authenticated caller extracted from the JWT
#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(request: &Request) -> Option<String> {
    if let Some(header) = request.headers().get(AUTHORIZATION) {
        return header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());
    }

    if request.method() != Method::GET || !request.uri().path().ends_with("/events") {
        return None;
    }
    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.token)
}

/// Authentication middleware
///
/// Returns 401 with a JSON error body if the token is missing or invalid.
pub async fn auth_middleware(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, BackendError> {
    if app_state.auth.disabled {
        request.extensions_mut().insert(AuthenticatedUser {
            subject: ANONYMOUS_SUBJECT.to_string(),
            email: None,
        });
        return Ok(next.run(request).await);
    }

    let token = bearer_token(&request).ok_or_else(|| {
        tracing::warn!("[Auth] Missing bearer token for {}", request.uri().path());
        BackendError::unauthorized("Missing bearer token")
    })?;

    let claims = verify_token(&token, app_state.auth.secret()).map_err(|e| {
        tracing::warn!("[Auth] Invalid token: {}", e);
        BackendError::unauthorized("Invalid token")
    })?;

    request.extensions_mut().insert(AuthenticatedUser {
        subject: claims.sub,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

/// Axum extractor for the authenticated caller
#[derive(Clone, Debug)]
pub struct AuthUser(pub AuthenticatedUser);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for AuthUser {
    type Rejection = BackendError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                tracing::warn!("[Auth] AuthenticatedUser not found in request extensions");
                BackendError::unauthorized("Not authenticated")
            })
    }
}
