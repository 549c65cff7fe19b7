//! HTML pages. The browser app lives in `static/`; these handlers decide
//! whether the current visitor may see it.

use axum::{
    Extension,
    body::Body,
    extract::Request,
    response::{Html, IntoResponse, Redirect, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::auth::guard::{GuardDecision, guard};
use crate::auth::{CurrentSession, SessionStatus};

const APP_PAGE: &str = "static/index.html";
const SIGNIN_PAGE: &str = "static/signin.html";

const LOADING_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Loading</title></head>
<body><div class="spinner" aria-busy="true">Loading...</div></body>
</html>"#;

const UNAUTHORIZED_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Unauthorized</title></head>
<body>
  <h1>Unauthorized</h1>
  <p>You do not have permission to view this page.</p>
  <a href="/dashboard">Back to dashboard</a>
</body>
</html>"#;

async fn serve_file(path: &str, req: Request) -> Response {
    match ServeFile::new(path).oneshot(req).await {
        Ok(res) => res.map(Body::new),
        Err(never) => match never {},
    }
}

/// `/`, `/dashboard` and `/chat/{id}`.
pub async fn protected_page(current: Option<Extension<CurrentSession>>, req: Request) -> Response {
    let (status, role) = match &current {
        Some(Extension(CurrentSession(claims))) => {
            (SessionStatus::Authenticated, Some(claims.role.as_str()))
        }
        None => (SessionStatus::Unauthenticated, None),
    };

    match guard(status, role, None, req.uri().path()) {
        GuardDecision::Placeholder => Html(LOADING_PAGE).into_response(),
        GuardDecision::Redirect(to) => Redirect::temporary(&to).into_response(),
        GuardDecision::Render => serve_file(APP_PAGE, req).await,
    }
}

/// `/auth/signin`. Signed-in visitors never reach this; the session
/// middleware sends them to the dashboard.
pub async fn signin_page(req: Request) -> Response {
    serve_file(SIGNIN_PAGE, req).await
}

/// `/unauthorized`
pub async fn unauthorized_page() -> Html<&'static str> {
    Html(UNAUTHORIZED_PAGE)
}
