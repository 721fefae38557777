use anyhow::{bail, Context, Result};
use chrono::TimeDelta;

/// Upper bound for `TOKEN_REFRESH_SKEW_SECS`: one day.
const MAX_REFRESH_SKEW_SECS: i64 = 86_400;

/// Application configuration, loaded from environment variables once at start.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    /// Where the browser lands after a successful OAuth callback.
    pub landing_url: String,
    pub debug: bool,

    // ── Database ────────────────────────────────────────────────────────
    pub database_url: String,

    // ── Crypto ──────────────────────────────────────────────────────────
    /// Seeds token encryption and cookie / state signing.
    pub secret_key: String,

    // ── MercadoLibre ────────────────────────────────────────────────────
    pub meli_client_id: String,
    pub meli_client_secret: String,
    pub meli_redirect_uri: String,
    pub meli_api_url: String,
    pub meli_auth_url: String,
    /// Tokens expiring within this many seconds are refreshed before use.
    pub token_refresh_skew_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()
                .context("Invalid PORT")?,
            landing_url: std::env::var("LANDING_URL").unwrap_or_else(|_| "/".into()),
            debug: std::env::var("DEBUG")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),

            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL is required (PostgreSQL connection string)")?,
            secret_key: std::env::var("SECRET_KEY").context("SECRET_KEY is required")?,

            meli_client_id: std::env::var("MELI_CLIENT_ID")
                .context("MELI_CLIENT_ID is required")?,
            meli_client_secret: std::env::var("MELI_CLIENT_SECRET")
                .context("MELI_CLIENT_SECRET is required")?,
            meli_redirect_uri: std::env::var("MELI_REDIRECT_URI")
                .context("MELI_REDIRECT_URI is required")?,
            meli_api_url: std::env::var("MELI_API_URL")
                .unwrap_or_else(|_| "https://api.mercadolibre.com".into()),
            meli_auth_url: std::env::var("MELI_AUTH_URL")
                .unwrap_or_else(|_| "https://auth.mercadolibre.com.ar/authorization".into()),
            token_refresh_skew_secs: parse_refresh_skew(
                &std::env::var("TOKEN_REFRESH_SKEW_SECS").unwrap_or_else(|_| "300".into()),
            )
            .context("Invalid TOKEN_REFRESH_SKEW_SECS")?,
        })
    }

    /// Refresh skew as a duration; out-of-range values collapse to zero.
    pub fn token_refresh_skew(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.token_refresh_skew_secs)
            .filter(|skew| *skew >= TimeDelta::zero())
            .unwrap_or_else(TimeDelta::zero)
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "meli_sync=debug,tower_http=debug"
        } else {
            "meli_sync=info"
        }
    }
}

fn parse_refresh_skew(value: &str) -> Result<i64> {
    let secs: i64 = value.trim().parse()?;
    if !(0..=MAX_REFRESH_SKEW_SECS).contains(&secs) {
        bail!("{secs} is outside 0..={MAX_REFRESH_SKEW_SECS}");
    }
    Ok(secs)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
