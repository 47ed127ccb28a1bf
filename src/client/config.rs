use std::env;
use std::time::Duration;

use log::info;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// The backend refuses `limit` above this.
pub const MAX_SEARCH_BATCH: u32 = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid OPERADORAS_API_URL '{value}': {source}")]
    InvalidApiUrl { value: String, source: url::ParseError },
    #[error("PAGE_SIZE must be greater than zero")]
    ZeroPageSize,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub page_size: u32,
    pub search_batch_limit: u32,
    pub request_timeout: Duration,
    pub log_level: String,
}

impl ClientConfig {
    /// Carica `.env` (se presente) e poi le variabili d'ambiente
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Logs the effective settings; call once the logger is up.
    pub fn log_summary(&self) {
        info!("Client configuration loaded:");
        info!("  API URL: {}", self.api_url);
        info!("  Page size: {}", self.page_size);
        info!("  Search batch limit: {}", self.search_batch_limit);
        info!("  Request timeout: {}s", self.request_timeout.as_secs());
        info!("  Log level: {}", self.log_level);
    }

    /// Builds the config from any key lookup; unparseable numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("OPERADORAS_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(raw_url.trim()).map_err(|source| ConfigError::InvalidApiUrl {
            value: raw_url.clone(),
            source,
        })?;

        let page_size = lookup("PAGE_SIZE")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }

        let search_batch_limit = lookup("SEARCH_BATCH_LIMIT")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(MAX_SEARCH_BATCH)
            .clamp(1, MAX_SEARCH_BATCH);

        let timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            api_url,
            page_size,
            search_batch_limit,
            request_timeout: Duration::from_secs(timeout_secs),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:8000/api");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.search_batch_limit, 500);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("OPERADORAS_API_URL", "https://api.example.com/api"),
            ("PAGE_SIZE", "25"),
            ("SEARCH_BATCH_LIMIT", "200"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.api_url.host_str(), Some("api.example.com"));
        assert_eq!(config.page_size, 25);
        assert_eq!(config.search_batch_limit, 200);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn batch_limit_is_clamped_to_backend_max() {
        let config = ClientConfig::from_lookup(lookup(&[("SEARCH_BATCH_LIMIT", "5000")])).unwrap();
        assert_eq!(config.search_batch_limit, MAX_SEARCH_BATCH);
        let config = ClientConfig::from_lookup(lookup(&[("SEARCH_BATCH_LIMIT", "0")])).unwrap();
        assert_eq!(config.search_batch_limit, 1);
    }

    #[test]
    fn rejects_bad_url_and_zero_page_size() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("OPERADORAS_API_URL", "not a url")])),
            Err(ConfigError::InvalidApiUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("PAGE_SIZE", "0")])),
            Err(ConfigError::ZeroPageSize)
        ));
    }
}
