//! Sign-in endpoints.

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;
use crate::auth::credentials::{Credentials, resolve_callback};
use crate::auth::guard::{DASHBOARD_PATH, SESSION_COOKIE};
use crate::auth::{CurrentSession, ObservedSession, SessionStatus, SessionUser, errors, otp, validation};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    country_code: Option<String>,
}

/// POST /api/auth/send-otp
pub async fn send_otp(
    State(state): State<AppState>,
    Json(req): Json<SendOtpRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let phone = req.phone_number.trim();
    validation::validate_phone(phone)?;
    let phone = validation::normalize_phone(phone, req.country_code.as_deref());

    match state.otp.send_code(&phone).await {
        Ok(sent) => {
            tracing::info!(name: "auth.otp.sent", "Verification code sent");
            Ok(Json(json!({ "success": true, "sid": sent.sid })))
        }
        Err(e) => {
            tracing::error!(name: "auth.otp.send_failed", error = %e, "Failed to send verification code");
            Err(ApiError::BadRequest(e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    country_code: Option<String>,
}

/// POST /api/auth/verify-otp
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Response, ApiError> {
    let phone = req.phone_number.trim();
    let code = req.code.trim();
    if phone.is_empty() || code.is_empty() {
        return Err(ApiError::BadRequest(
            "Phone number and code are required".to_string(),
        ));
    }
    validation::validate_otp(code)?;
    let phone = validation::normalize_phone(phone, req.country_code.as_deref());

    let verification = otp::verify_code(state.otp.as_ref(), &phone, code).await;
    let status = if verification.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(verification)).into_response())
}

fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}={token}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax{secure}")
}

/// POST /api/auth/callback/credentials
pub async fn sign_in(State(state): State<AppState>, Json(credentials): Json<Credentials>) -> Response {
    let user = match state.credentials.authorize(&credentials).await {
        Ok(user) => user,
        Err(e) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "CredentialsSignin", "message": e.to_string() })),
            )
                .into_response();
        }
    };

    let token = match state.tokens.issue(&user) {
        Ok(token) => token,
        Err(e) => return ApiError::Internal(e.to_string()).into_response(),
    };

    let session = state.sessions.get_or_open(&user.id);
    session.auth.set_otp_sent(true);
    session.auth.set_otp_verified(true);
    let session_user = SessionUser {
        id: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        phone_number: user.phone_number.clone(),
    };
    session.observe(ObservedSession::authenticated(session_user.clone()));

    let callback = credentials.callback_url.as_deref().unwrap_or(DASHBOARD_PATH);
    let url = resolve_callback(callback, &state.config.app.base_url);
    let cookie = session_cookie(
        &token,
        state.tokens.max_age().as_secs(),
        state.config.security.cookie_secure,
    );

    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true, "url": url, "user": session_user })),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    status: SessionStatus,
    user: Option<SessionUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<String>,
    otp_sent: bool,
    otp_verified: bool,
}

/// GET /api/auth/session
pub async fn session(
    State(state): State<AppState>,
    current: Option<Extension<CurrentSession>>,
) -> Json<SessionResponse> {
    let Some(Extension(CurrentSession(claims))) = current else {
        return Json(SessionResponse {
            status: SessionStatus::Unauthenticated,
            user: None,
            role: None,
            expires: None,
            otp_sent: false,
            otp_verified: false,
        });
    };

    let local = state.sessions.get_or_open(&claims.sub).auth.state();
    let expires = i64::try_from(claims.exp)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|at| at.to_rfc3339());
    Json(SessionResponse {
        status: SessionStatus::Authenticated,
        user: Some(claims.user()),
        role: Some(claims.role.clone()),
        expires,
        otp_sent: local.otp_sent,
        otp_verified: local.otp_verified,
    })
}

/// POST /api/auth/signout
pub async fn sign_out(
    State(state): State<AppState>,
    current: Option<Extension<CurrentSession>>,
) -> Response {
    if let Some(Extension(CurrentSession(claims))) = current {
        if let Some(session) = state.sessions.remove(&claims.sub) {
            session.observe(ObservedSession::unauthenticated());
            session.auth.logout();
        }
        tracing::info!(name: "auth.signout", user_id = %claims.sub, "User signed out");
    }

    let cookie = format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax");
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true, "url": state.config.app.base_url })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    #[serde(default)]
    email: String,
}

/// POST /api/auth/resend-verification
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let email = req.email.trim();
    if email.is_empty() {
        return Err(ApiError::BadRequest("Email is required".to_string()));
    }
    let Some(token) = state.users.issue_verification_token(email) else {
        return Err(ApiError::NotFound("No user found with this email".to_string()));
    };

    // No mail transport; the link is only logged.
    let link = format!(
        "{}/api/auth/verify-email?token={token}",
        state.config.app.base_url.trim_end_matches('/')
    );
    tracing::info!(name: "auth.email.verification_link", email, link = %link, "Verification email resent");

    Ok(Json(json!({
        "success": true,
        "message": "Verification email resent successfully"
    })))
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// GET /api/auth/verify-email?token=...
pub async fn verify_email(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> Redirect {
    let base = state.config.app.base_url.trim_end_matches('/');
    let result = state.users.verify_email(query.token.as_deref().unwrap_or_default());
    match result {
        Ok(user) => {
            tracing::info!(name: "auth.email.verified", user_id = %user.id, "Email verified");
            Redirect::temporary(&format!("{base}/auth/signin?verified=true"))
        }
        Err(e) => Redirect::temporary(&format!("{base}/auth/error?error={e}")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorQuery {
    error: Option<String>,
}

/// GET /auth/error?error=...
pub async fn error_page(Query(query): Query<ErrorQuery>) -> Response {
    match query.error.filter(|code| !code.is_empty()) {
        Some(code) => Html(errors::error_page(&code)).into_response(),
        None => Redirect::temporary("/").into_response(),
    }
}
