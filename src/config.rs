use std::str::FromStr;

use serde::Deserialize;

const PLACEHOLDER_SECRET: &str = "CHANGE_ME";

/// What happens to a repeat scan of the same attendee/booth pair inside the dedup window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// No new row; the earlier scan is returned with `is_first_visit = false`.
    Suppress,
    /// A new row is written and flagged `is_first_visit = false`.
    Flag,
}

impl FromStr for DedupMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suppress" => Ok(DedupMode::Suppress),
            "flag" => Ok(DedupMode::Flag),
            other => anyhow::bail!("invalid dedup mode: {}. Must be 'suppress' or 'flag'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub admin_key: String,
    /// HMAC secret for session JWTs returned by `verify-qr`.
    pub session_secret: String,
    pub session_ttl_secs: u64,
    /// Lifetime of a freshly issued QR token. `None` = never expires.
    pub qr_token_ttl_secs: Option<u64>,
    pub qr_default_size: u32,
    /// Set via EXPOPASS_SCAN_DEDUP_WINDOW_SECS. 0 disables dedup.
    pub scan_dedup_window_secs: u64,
    pub scan_dedup_mode: DedupMode,
    pub dashboard_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "postgres://localhost/expopass".into(),
            admin_key: PLACEHOLDER_SECRET.into(),
            session_secret: PLACEHOLDER_SECRET.into(),
            session_ttl_secs: 86_400,
            qr_token_ttl_secs: None,
            qr_default_size: 300,
            scan_dedup_window_secs: 300,
            scan_dedup_mode: DedupMode::Suppress,
            dashboard_origin: "http://localhost:3000".into(),
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Builds a config from an arbitrary key lookup. `load()` feeds it the process env.
pub fn from_lookup<F>(get: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let admin_key = get("EXPOPASS_ADMIN_KEY").unwrap_or(defaults.admin_key);
    let session_secret = get("EXPOPASS_SESSION_SECRET").unwrap_or(defaults.session_secret);

    if admin_key == PLACEHOLDER_SECRET || session_secret == PLACEHOLDER_SECRET {
        let env_mode = get("EXPOPASS_ENV")
            .or_else(|| get("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "EXPOPASS_ADMIN_KEY / EXPOPASS_SESSION_SECRET are still the insecure placeholder. \
                 Set real secrets before running in production."
            );
        }
        tracing::warn!("admin key or session secret not set, using insecure placeholder");
    }

    let scan_dedup_mode = match get("EXPOPASS_SCAN_DEDUP_MODE") {
        Some(raw) => raw.parse()?,
        None => defaults.scan_dedup_mode,
    };

    Ok(Config {
        port: parse_or(&get, "EXPOPASS_PORT", defaults.port),
        database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
        admin_key,
        session_secret,
        session_ttl_secs: parse_or(&get, "EXPOPASS_SESSION_TTL_SECS", defaults.session_ttl_secs),
        qr_token_ttl_secs: get("EXPOPASS_QR_TOKEN_TTL_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0),
        qr_default_size: parse_or(&get, "EXPOPASS_QR_DEFAULT_SIZE", defaults.qr_default_size),
        scan_dedup_window_secs: parse_or(
            &get,
            "EXPOPASS_SCAN_DEDUP_WINDOW_SECS",
            defaults.scan_dedup_window_secs,
        ),
        scan_dedup_mode,
        dashboard_origin: get("DASHBOARD_ORIGIN").unwrap_or(defaults.dashboard_origin),
    })
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let cfg = from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.scan_dedup_window_secs, 300);
        assert_eq!(cfg.scan_dedup_mode, DedupMode::Suppress);
        assert_eq!(cfg.qr_token_ttl_secs, None);
    }

    #[test]
    fn test_overrides() {
        let cfg = from_lookup(lookup(&[
            ("EXPOPASS_PORT", "9000"),
            ("EXPOPASS_SCAN_DEDUP_WINDOW_SECS", "60"),
            ("EXPOPASS_SCAN_DEDUP_MODE", "Flag"),
            ("EXPOPASS_QR_TOKEN_TTL_SECS", "3600"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.scan_dedup_window_secs, 60);
        assert_eq!(cfg.scan_dedup_mode, DedupMode::Flag);
        assert_eq!(cfg.qr_token_ttl_secs, Some(3600));
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let cfg = from_lookup(lookup(&[("EXPOPASS_QR_TOKEN_TTL_SECS", "0")])).unwrap();
        assert_eq!(cfg.qr_token_ttl_secs, None);
    }

    #[test]
    fn test_garbage_number_falls_back() {
        let cfg = from_lookup(lookup(&[("EXPOPASS_PORT", "eighty")])).unwrap();
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn test_invalid_dedup_mode_is_rejected() {
        assert!(from_lookup(lookup(&[("EXPOPASS_SCAN_DEDUP_MODE", "merge")])).is_err());
    }

    #[test]
    fn test_placeholder_rejected_in_production() {
        let result = from_lookup(lookup(&[("EXPOPASS_ENV", "production")]));
        assert!(result.is_err());

        let ok = from_lookup(lookup(&[
            ("EXPOPASS_ENV", "production"),
            ("EXPOPASS_ADMIN_KEY", "a-real-admin-key"),
            ("EXPOPASS_SESSION_SECRET", "a-real-session-secret"),
        ]));
        assert!(ok.is_ok());
    }
}
