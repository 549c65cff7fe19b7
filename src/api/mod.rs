//! HTTP surface: JSON API, notification stream and pages.

pub mod auth;
pub mod chat;
pub mod countries;
pub mod pages;
pub mod sse;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::AppState;

/// Every route of the application, without middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        // Pages
        .route("/", get(pages::protected_page))
        .route("/dashboard", get(pages::protected_page))
        .route("/chat/{id}", get(pages::protected_page))
        .route("/auth/signin", get(pages::signin_page))
        .route("/auth/error", get(auth::error_page))
        .route("/unauthorized", get(pages::unauthorized_page))
        // Auth
        .route("/api/auth/send-otp", post(auth::send_otp))
        .route("/api/auth/verify-otp", post(auth::verify_otp))
        .route("/api/auth/callback/credentials", post(auth::sign_in))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/signout", post(auth::sign_out))
        .route("/api/auth/resend-verification", post(auth::resend_verification))
        .route("/api/auth/verify-email", get(auth::verify_email))
        // Countries
        .route("/api/countries", get(countries::list_countries))
        .route("/api/countries/{code}", get(countries::get_country))
        .route("/api/countries/dial/{dial_code}", get(countries::get_country_by_dial_code))
        // Chat
        .route(
            "/api/chatrooms",
            get(chat::list_chatrooms).post(chat::create_chatroom),
        )
        .route("/api/chatrooms/current", put(chat::set_current_chatroom))
        .route(
            "/api/chatrooms/{id}",
            delete(chat::delete_chatroom).patch(chat::rename_chatroom),
        )
        .route("/api/chatrooms/{id}/messages", get(chat::get_messages))
        .route("/api/chatrooms/{id}/load-more", post(chat::load_more))
        .route("/api/messages", post(chat::send_message))
        .route("/api/chat", delete(chat::clear_chat))
        .route("/api/notifications", get(chat::notifications))
}
