use crate::autosave::AutosaveConfig;
use crate::coordinator::CoordinatorConfig;
use crate::session::SessionMode;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, loaded from the environment (and `.env` when present).
///
/// | Variable | Default |
/// |----------|---------|
/// | `RESUME_SYNC_API_URL` | unset: an in-process resource server stands in |
/// | `RESUME_SYNC_API_TOKEN` | unset |
/// | `RESUME_SYNC_SESSION` | `guest` |
/// | `RESUME_SYNC_DATA_DIR` | unset: documents are kept in memory |
/// | `RESUME_SYNC_DEBOUNCE_MS` | `1000` |
/// | `RESUME_SYNC_REVALIDATE_MS` | `150`, `0` disables |
/// | `RESUME_SYNC_HTTP_TIMEOUT_SECS` | `30` |
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub session: SessionMode,
    pub data_dir: Option<PathBuf>,
    pub debounce: Duration,
    pub revalidate_after: Option<Duration>,
    pub http_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            session: SessionMode::Guest,
            data_dir: None,
            debounce: Duration::from_millis(1000),
            revalidate_after: Some(Duration::from_millis(150)),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let session = match var("RESUME_SYNC_SESSION") {
            Some(raw) => raw
                .parse::<SessionMode>()
                .context("RESUME_SYNC_SESSION must be guest, demo or authenticated")?,
            None => defaults.session,
        };
        let debounce = match var("RESUME_SYNC_DEBOUNCE_MS") {
            Some(raw) => Duration::from_millis(
                parse_u64(&raw).context("RESUME_SYNC_DEBOUNCE_MS must be a number of milliseconds")?,
            ),
            None => defaults.debounce,
        };
        let revalidate_after = match var("RESUME_SYNC_REVALIDATE_MS") {
            Some(raw) => {
                match parse_u64(&raw)
                    .context("RESUME_SYNC_REVALIDATE_MS must be a number of milliseconds")?
                {
                    0 => None,
                    ms => Some(Duration::from_millis(ms)),
                }
            }
            None => defaults.revalidate_after,
        };
        let http_timeout = match var("RESUME_SYNC_HTTP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                parse_u64(&raw).context("RESUME_SYNC_HTTP_TIMEOUT_SECS must be a number of seconds")?,
            ),
            None => defaults.http_timeout,
        };

        Ok(Self {
            api_url: var("RESUME_SYNC_API_URL"),
            api_token: var("RESUME_SYNC_API_TOKEN"),
            session,
            data_dir: var("RESUME_SYNC_DATA_DIR").map(PathBuf::from),
            debounce,
            revalidate_after,
            http_timeout,
        })
    }

    pub fn autosave(&self) -> AutosaveConfig {
        AutosaveConfig {
            debounce: self.debounce,
            ..AutosaveConfig::default()
        }
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            revalidate_after: self.revalidate_after,
        }
    }
}

fn parse_u64(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("'{raw}' is not a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.session, SessionMode::Guest);
        assert!(config.api_url.is_none());
        assert_eq!(config.autosave().debounce, Duration::from_millis(1000));
        assert_eq!(
            config.coordinator().revalidate_after,
            Some(Duration::from_millis(150))
        );
    }

    #[test]
    fn test_reads_every_variable() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("RESUME_SYNC_API_URL", "https://api.example.com"),
            ("RESUME_SYNC_API_TOKEN", "secret"),
            ("RESUME_SYNC_SESSION", "authenticated"),
            ("RESUME_SYNC_DATA_DIR", "/tmp/resumes"),
            ("RESUME_SYNC_DEBOUNCE_MS", "250"),
            ("RESUME_SYNC_REVALIDATE_MS", "0"),
            ("RESUME_SYNC_HTTP_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.api_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.session, SessionMode::Authenticated);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/resumes")));
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.revalidate_after, None);
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = SyncConfig::from_lookup(lookup(&[("RESUME_SYNC_DEBOUNCE_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("RESUME_SYNC_DEBOUNCE_MS"));
        assert!(SyncConfig::from_lookup(lookup(&[("RESUME_SYNC_SESSION", "admin")])).is_err());
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = SyncConfig::from_lookup(lookup(&[("RESUME_SYNC_API_URL", "  ")])).unwrap();
        assert!(config.api_url.is_none());
    }
}
