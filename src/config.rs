use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Secret and lifetimes for confirmation / password-reset tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionTokenConfig {
    pub secret: String,
    pub signup_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub domain: String,
    pub signup_sender: String,
    pub reset_sender: String,
    pub templates_dir: Option<PathBuf>,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupConfig {
    pub confirmation_redirect_url: String,
    pub confirmation_error_redirect_url: Option<String>,
    pub password_min_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub tokens: ActionTokenConfig,
    pub email: EmailConfig,
    pub signup: SignupConfig,
}

fn var_or(key: &str, default: impl Into<String>) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

/// Upper bound for every token lifetime: ten years.
const MAX_TTL_MINUTES: i64 = 60 * 24 * 366 * 10;

fn ttl_minutes(key: &str, default: i64) -> anyhow::Result<i64> {
    let minutes = parsed_or(key, default);
    if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
        anyhow::bail!(
            "{} must be between 1 and {} minutes, got {}",
            key,
            MAX_TTL_MINUTES,
            minutes
        );
    }
    Ok(minutes)
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: var_or("JWT_ISSUER", "accounts"),
            audience: var_or("JWT_AUDIENCE", "accounts-users"),
            ttl_minutes: ttl_minutes("JWT_TTL_MINUTES", 60 * 24)?,
        };
        let tokens = ActionTokenConfig {
            secret: var_or("ACTION_TOKEN_SECRET", jwt.secret.clone()),
            signup_ttl_minutes: ttl_minutes("SIGNUP_TOKEN_TTL_MINUTES", 60 * 24 * 3)?,
            reset_ttl_minutes: ttl_minutes("RESET_TOKEN_TTL_MINUTES", 60)?,
        };

        let domain = std::env::var("EMAIL_DOMAIN")
            .or_else(|_| std::env::var("DOMAIN"))
            .unwrap_or_else(|_| "localhost:8080".into());
        let signup_sender = var_or("SIGNUP_EMAIL_SENDER", format!("no-reply@{}", domain));
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: parsed_or("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME").ok(),
                password: std::env::var("SMTP_PASSWORD").ok(),
            }),
            Err(_) => None,
        };
        let email = EmailConfig {
            reset_sender: var_or("RESET_PASSWORD_EMAIL_SENDER", signup_sender.clone()),
            signup_sender,
            templates_dir: std::env::var("EMAIL_TEMPLATES_DIR").ok().map(PathBuf::from),
            smtp,
            domain,
        };

        let signup = SignupConfig {
            confirmation_redirect_url: var_or(
                "SIGNUP_CONFIRMATION_REDIRECT_URL",
                format!("https://{}/signup/confirmed", email.domain),
            ),
            confirmation_error_redirect_url: std::env::var(
                "SIGNUP_CONFIRMATION_ERROR_REDIRECT_URL",
            )
            .ok(),
            password_min_length: parsed_or("PASSWORD_MIN_LENGTH", 8),
        };

        Ok(Self {
            database_url,
            jwt,
            tokens,
            email,
            signup,
        })
    }
}
