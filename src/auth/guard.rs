//! Page and request gating on session status.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;

use super::sync::{ObservedSession, SessionStatus};
use super::token::SessionClaims;
use crate::AppState;
use crate::error::ApiError;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session-token";

pub const SIGNIN_PATH: &str = "/auth/signin";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// Path prefixes reachable without a session.
pub const PUBLIC_PATHS: &[&str] = &[
    "auth/signin",
    "auth/error",
    "api/auth",
    "_next",
    "favicon.ico",
    "debug",
    "images",
    "static",
    "api/countries",
];

/// What a protected page should do for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still resolving: show a placeholder, do not navigate.
    Placeholder,
    /// Navigate away and render nothing.
    Redirect(String),
    /// Render the protected content.
    Render,
}

/// Decide how to treat a visit to `current_path`.
pub fn guard(
    status: SessionStatus,
    user_role: Option<&str>,
    required_role: Option<&str>,
    current_path: &str,
) -> GuardDecision {
    match status {
        SessionStatus::Loading => GuardDecision::Placeholder,
        SessionStatus::Unauthenticated => GuardDecision::Redirect(signin_redirect(current_path)),
        SessionStatus::Authenticated => match required_role {
            Some(required) if user_role != Some(required) => {
                GuardDecision::Redirect(UNAUTHORIZED_PATH.to_string())
            }
            _ => GuardDecision::Render,
        },
    }
}

/// Sign-in URL carrying `path` as the callback target.
pub fn signin_redirect(path: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("{SIGNIN_PATH}?callbackUrl={encoded}")
}

/// `/api/auth/session/` -> `api/auth/session`.
fn normalize(path: &str) -> String {
    path.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("/")
}

pub fn is_public_path(path: &str) -> bool {
    let path = normalize(path);
    PUBLIC_PATHS.iter().any(|public| {
        path == *public
            || path
                .strip_prefix(public)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Session token from the cookie, or from a `Bearer` header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = CookieJar::from_headers(headers).get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToString::to_string)
}

/// Verified session of the current request, inserted by
/// [`session_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionClaims);

/// Gate every request on a valid session token.
///
/// Public paths pass through. Without a session, API paths get 401 and
/// pages redirect to sign-in; a signed-in visit to sign-in goes to the
/// dashboard.
pub async fn session_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let claims = session_token(request.headers()).and_then(|token| match state.tokens.verify(&token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!(name: "auth.token.rejected", error = %e, "Ignoring invalid session token");
            None
        }
    });

    if let Some(claims) = claims {
        if normalize(&path) == "auth/signin" {
            return Redirect::temporary(DASHBOARD_PATH).into_response();
        }
        state
            .sessions
            .get_or_open(&claims.sub)
            .observe(ObservedSession::authenticated(claims.user()));
        request.extensions_mut().insert(CurrentSession(claims));
        return next.run(request).await;
    }

    if is_public_path(&path) {
        return next.run(request).await;
    }

    let normalized = normalize(&path);
    if normalized == "api" || normalized.starts_with("api/") {
        return ApiError::Unauthorized.into_response();
    }

    tracing::debug!(name: "auth.guard.redirect", path = %path, "No valid session, redirecting to sign-in");
    Redirect::temporary(&signin_redirect(&path)).into_response()
}
