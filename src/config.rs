use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::auth::TwilioSettings;
use crate::llm::GeminiSettings;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory for persisted state
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<String>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub resilience: ResilienceConfig,
    pub ai: AiConfig,
    pub sms: SmsConfig,
    pub countries: CountriesConfig,
    pub storage: StorageConfig,
    pub app: AppUrlConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Deserialize, Clone)]
pub struct SecurityConfig {
    pub session_secret: String,
    pub session_max_age_days: u64,
    pub cookie_secure: bool,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("session_max_age_days", &self.session_max_age_days)
            .field("cookie_secure", &self.cookie_secure)
            .finish_non_exhaustive()
    }
}

impl SecurityConfig {
    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_days * 24 * 60 * 60)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub requests_per_second: f32,
    pub burst_size: f32,
    pub timeout_secs: u64,
}

#[derive(Deserialize, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Simulated latency of older-history pages.
    pub history_latency_ms: u64,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("min_interval_ms", &self.min_interval_ms)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl AiConfig {
    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub verify_service_sid: String,
    pub base_url: String,
}

impl std::fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsConfig")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SmsConfig {
    pub fn twilio_settings(&self) -> TwilioSettings {
        TwilioSettings {
            account_sid: self.account_sid.clone(),
            auth_token: self.auth_token.clone(),
            verify_service_sid: self.verify_service_sid.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CountriesConfig {
    pub source_url: String,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppUrlConfig {
    /// Public base URL used for redirects and emailed links.
    pub base_url: String,
}

/// Conventional variable names mapped onto config keys.
const SECRET_VARS: &[(&str, &str)] = &[
    ("SESSION_SECRET", "security.session_secret"),
    ("GEMINI_API_KEY", "ai.api_key"),
    ("TWILIO_ACCOUNT_SID", "sms.account_sid"),
    ("TWILIO_AUTH_TOKEN", "sms.auth_token"),
    ("TWILIO_VERIFY_SERVICE_SID", "sms.verify_service_sid"),
    ("APP_BASE_URL", "app.base_url"),
];

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("security.session_secret", "")?
            .set_default("security.session_max_age_days", 30)?
            .set_default("security.cookie_secure", false)?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)?
            .set_default("resilience.timeout_secs", 60)?
            .set_default("ai.api_key", "")?
            .set_default("ai.base_url", "https://generativelanguage.googleapis.com")?
            .set_default("ai.model", "gemini-2.0-flash")?
            .set_default("ai.min_interval_ms", 2000)?
            .set_default("ai.max_retries", 3)?
            .set_default("ai.backoff_base_ms", 1000)?
            .set_default("ai.max_output_tokens", 1000)?
            .set_default("ai.temperature", 0.7)?
            .set_default("ai.top_p", 0.95)?
            .set_default("ai.top_k", 40)?
            .set_default("ai.history_latency_ms", 1000)?
            .set_default("sms.account_sid", "")?
            .set_default("sms.auth_token", "")?
            .set_default("sms.verify_service_sid", "")?
            .set_default("sms.base_url", "https://verify.twilio.com")?
            .set_default(
                "countries.source_url",
                "https://restcountries.com/v3.1/all?fields=name,cca2,idd,flags",
            )?
            .set_default("countries.cache_ttl_secs", 86_400)?
            .set_default("storage.data_dir", "data")?
            .set_default("app.base_url", "http://localhost:3000")?;

        // 2. Config file: explicit path must exist, the default one is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::new(path, FileFormat::Yaml)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder.add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml))
            }
            None => builder,
        };

        // 3. Prefixed environment, e.g. CHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. Conventional secret variables
        for (var, key) in SECRET_VARS {
            if let Ok(val) = env::var(var) {
                if !val.trim().is_empty() {
                    builder = builder.set_override(*key, val)?;
                }
            }
        }

        // 5. CLI flags (clap also reads their env fallbacks)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(dir) = cli.data_dir {
            builder = builder.set_override("storage.data_dir", dir)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }

    /// Reject configurations that cannot serve sign-in or chat.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let missing = |name: &str| config::ConfigError::Message(format!("Missing required environment variable: {name}"));

        if self.security.session_secret.trim().is_empty() {
            return Err(missing("SESSION_SECRET"));
        }
        if self.ai.api_key.trim().is_empty() {
            return Err(missing("GEMINI_API_KEY"));
        }
        if self.sms.account_sid.is_empty() {
            return Err(missing("TWILIO_ACCOUNT_SID"));
        }
        if !self.sms.account_sid.starts_with("AC") {
            return Err(config::ConfigError::Message(
                "Invalid TWILIO_ACCOUNT_SID: Must start with 'AC'".to_string(),
            ));
        }
        if self.sms.auth_token.is_empty() {
            return Err(missing("TWILIO_AUTH_TOKEN"));
        }
        if self.sms.verify_service_sid.is_empty() {
            return Err(missing("TWILIO_VERIFY_SERVICE_SID"));
        }
        if !self.sms.verify_service_sid.starts_with("VA") {
            return Err(config::ConfigError::Message(
                "Invalid TWILIO_VERIFY_SERVICE_SID: Must start with 'VA'".to_string(),
            ));
        }
        Ok(())
    }
}
