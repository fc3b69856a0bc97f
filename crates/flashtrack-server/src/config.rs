use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing::info;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me", "secret"];

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_hours: i64,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("FLASHTRACK_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("FLASHTRACK_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let token_ttl_hours: i64 = parse_or(&lookup, "FLASHTRACK_TOKEN_TTL_HOURS", "24")?;
        if token_ttl_hours <= 0 {
            bail!("FLASHTRACK_TOKEN_TTL_HOURS must be positive, got {}", token_ttl_hours);
        }

        let origins = or_default(&lookup, "FLASHTRACK_CORS_ORIGINS", DEFAULT_CORS_ORIGINS);

        Ok(Self {
            jwt_secret,
            db_path: or_default(&lookup, "FLASHTRACK_DB_PATH", "flashtrack.db").into(),
            host: or_default(&lookup, "FLASHTRACK_HOST", "0.0.0.0"),
            port: parse_or(&lookup, "FLASHTRACK_PORT", "8080")?,
            token_ttl_hours,
            cors_origins: parse_origins(&origins),
        })
    }
}

/// Comma-separated origin list; blanks are skipped.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn or_default(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = or_default(lookup, key, default);
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("invalid {key} value {raw:?}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("FLASHTRACK_JWT_SECRET", "s3cr3t-value")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.db_path, PathBuf::from("flashtrack.db"));
        assert_eq!(config.token_ttl_hours, 24);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000", "http://localhost:5173"]);
    }

    #[test]
    fn test_secret_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("FLASHTRACK_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let secret = ("FLASHTRACK_JWT_SECRET", "s3cr3t-value");
        assert!(load(&[secret, ("FLASHTRACK_PORT", "eighty")]).is_err());
        assert!(load(&[secret, ("FLASHTRACK_TOKEN_TTL_HOURS", "0")]).is_err());
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(parse_origins(" https://a.example , ,https://b.example,"), vec![
            "https://a.example",
            "https://b.example"
        ]);
        assert!(parse_origins("").is_empty());
    }
}
