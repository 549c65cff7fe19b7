//! Phone OTP sign-in and Gemini chat
//!
//! A web service where users sign in with a one-time code sent by SMS and
//! then chat with a hosted generative model in named chat rooms.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with session gating and SSE notifications
//! - **Auth**: OTP verification, signed session tokens, per-user auth mirror
//! - **Chat**: chat rooms with chunked history, persisted snapshots
//! - **LLM**: Gemini driver with call spacing and rate-limit retries
//!
//! # Modules
//!
//! - [`api`]: HTTP handlers and routes
//! - [`auth`]: sign-in, sessions and page guards
//! - [`chat`]: chat state management
//! - [`llm`]: reply generation
//! - [`session`]: per-user state held by the server

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod countries;
pub mod error;
pub mod llm;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod storage;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::credentials::CredentialsProvider;
use crate::auth::users::UserDirectory;
use crate::auth::{OtpProvider, SessionTokens, TwilioVerify};
use crate::chat::{HistorySource, Responder, SimulatedHistory};
use crate::config::AppConfig;
use crate::countries::{CountryDirectory, CountrySource, RestCountries};
use crate::llm::{CallSpacer, GeminiClient, ResponseGenerator};
use crate::rate_limit::RequestLimiter;
use crate::session::SessionRegistry;
use crate::storage::{FileStorage, KeyValueStorage};

/// External collaborators the application is built from.
#[derive(Debug, Clone)]
pub struct Services {
    pub otp: Arc<dyn OtpProvider>,
    pub responder: Arc<dyn Responder>,
    pub history: Arc<dyn HistorySource>,
    pub storage: Arc<dyn KeyValueStorage>,
    pub countries: Arc<dyn CountrySource>,
}

impl Services {
    /// Production services: Twilio Verify, Gemini, files under the data dir.
    pub fn from_config(config: &AppConfig) -> Self {
        let model = Arc::new(GeminiClient::new(config.ai.gemini_settings()));
        let spacer = Arc::new(CallSpacer::new(Duration::from_millis(
            config.ai.min_interval_ms,
        )));
        let generator = ResponseGenerator::new(model, spacer).with_retries(
            config.ai.max_retries,
            Duration::from_millis(config.ai.backoff_base_ms),
        );

        Self {
            otp: Arc::new(TwilioVerify::new(config.sms.twilio_settings())),
            responder: Arc::new(generator),
            history: Arc::new(SimulatedHistory::new(Duration::from_millis(
                config.ai.history_latency_ms,
            ))),
            storage: Arc::new(FileStorage::new(&config.storage.data_dir)),
            countries: Arc::new(RestCountries::new(&config.countries.source_url)),
        }
    }
}

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<AppConfig>,
    /// Session token signer.
    pub tokens: Arc<SessionTokens>,
    /// SMS code sender and checker.
    pub otp: Arc<dyn OtpProvider>,
    /// Phone + code sign-in.
    pub credentials: CredentialsProvider,
    /// Known users.
    pub users: UserDirectory,
    /// Per-user chat and auth state.
    pub sessions: SessionRegistry,
    /// Cached country list.
    pub countries: Arc<CountryDirectory>,
    /// Global rate limiter.
    pub rate_limiter: Arc<RequestLimiter>,
}

impl AppState {
    pub fn new(config: AppConfig, services: Services) -> Self {
        let users = UserDirectory::open(Arc::clone(&services.storage));
        let tokens = SessionTokens::new(
            &config.security.session_secret,
            config.security.session_max_age(),
        );
        let countries = CountryDirectory::new(
            services.countries,
            Duration::from_secs(config.countries.cache_ttl_secs),
        );
        let rate_limiter = RequestLimiter::new(
            config.resilience.requests_per_second,
            config.resilience.burst_size,
        );

        Self {
            tokens: Arc::new(tokens),
            credentials: CredentialsProvider::new(Arc::clone(&services.otp), users.clone()),
            otp: services.otp,
            users,
            sessions: SessionRegistry::new(services.responder, services.history, services.storage),
            countries: Arc::new(countries),
            rate_limiter: Arc::new(rate_limiter),
            config: Arc::new(config),
        }
    }

    pub fn from_config(config: AppConfig) -> Self {
        let services = Services::from_config(&config);
        Self::new(config, services)
    }
}
