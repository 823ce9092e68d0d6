use anyhow::{bail, Context};
use serde::Deserialize;
use time::Duration;

use crate::auth::password::HasherConfig;

/// Reset links live between one minute and one week.
const RESET_TTL_DEFAULT_MINUTES: i64 = 120;
const RESET_TTL_MAX_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Without a host, mail is written to the log instead of sent.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Public origin used to build links in outgoing mail.
    pub base_url: String,
    pub hasher: HasherConfig,
    pub reset_ttl: Duration,
    pub mail: MailConfig,
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// `PASSWORD_RESET_TTL_MINUTES`; unset means the two hour default.
fn parse_reset_ttl(raw: Option<&str>) -> anyhow::Result<Duration> {
    let Some(raw) = raw else {
        return Ok(Duration::minutes(RESET_TTL_DEFAULT_MINUTES));
    };
    let minutes: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("PASSWORD_RESET_TTL_MINUTES is not a number: {raw:?}"))?;
    if !(1..=RESET_TTL_MAX_MINUTES).contains(&minutes) {
        bail!("PASSWORD_RESET_TTL_MINUTES must be between 1 and {RESET_TTL_MAX_MINUTES}, got {minutes}");
    }
    Ok(Duration::minutes(minutes))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;
        let base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();
        let hasher = HasherConfig {
            cost: std::env::var("HASH_COST")
                .ok()
                .and_then(|v| v.parse::<u32>().ok()),
            minimum_cost_override: env_flag("HASH_MIN_COST"),
        };
        let reset_ttl = parse_reset_ttl(std::env::var("PASSWORD_RESET_TTL_MINUTES").ok().as_deref())?;
        let mail = MailConfig {
            smtp_host: std::env::var("SMTP_HOST").ok().filter(|h| !h.is_empty()),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@example.com".into()),
        };
        Ok(Self {
            database_url,
            base_url,
            hasher,
            reset_ttl,
            mail,
        })
    }
}
