//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::SagaConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory storage when unset
/// - `CALL_TIMEOUT_MS`: timeout for each external call (default: `10000`)
/// - `AUTO_RELEASE_DAYS`: hold grace period for new escrows (default: `7`)
/// - `DEFAULT_CURRENCY`: currency when a request omits one (default: `"USD"`)
/// - `SEED_LISTINGS`: `listing:seller` pairs published in the mock listing
///   service at startup, comma separated
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub call_timeout_ms: u64,
    pub auto_release_days: u32,
    pub default_currency: String,
    pub seed_listings: Vec<(String, String)>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            call_timeout_ms: parsed(&lookup, "CALL_TIMEOUT_MS").unwrap_or(defaults.call_timeout_ms),
            auto_release_days: parsed(&lookup, "AUTO_RELEASE_DAYS")
                .unwrap_or(defaults.auto_release_days),
            default_currency: lookup("DEFAULT_CURRENCY").unwrap_or(defaults.default_currency),
            seed_listings: lookup("SEED_LISTINGS")
                .map(|raw| parse_listing_pairs(&raw))
                .unwrap_or_default(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the saga settings derived from this configuration.
    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            auto_release_days: self.auto_release_days,
            currency: self.default_currency.clone(),
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.parse().ok())
}

fn parse_listing_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (listing, seller) = pair.trim().split_once(':')?;
            let (listing, seller) = (listing.trim(), seller.trim());
            (!listing.is_empty() && !seller.is_empty())
                .then(|| (listing.to_string(), seller.to_string()))
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            call_timeout_ms: 10_000,
            auto_release_days: 7,
            default_currency: "USD".to_string(),
            seed_listings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.call_timeout_ms, 10_000);
        assert_eq!(config.auto_release_days, 7);
        assert_eq!(config.default_currency, "USD");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_lookup_overrides_defaults() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://localhost/escrow"),
            ("CALL_TIMEOUT_MS", "250"),
            ("AUTO_RELEASE_DAYS", "14"),
            ("DEFAULT_CURRENCY", "EUR"),
        ]);

        assert_eq!(config.port, 8081);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/escrow"));
        assert_eq!(config.call_timeout_ms, 250);
        assert_eq!(config.auto_release_days, 14);
        assert_eq!(config.default_currency, "EUR");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = from_pairs(&[("PORT", "not-a-port"), ("CALL_TIMEOUT_MS", "-5")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.call_timeout_ms, 10_000);
    }

    #[test]
    fn test_empty_database_url_means_in_memory() {
        assert!(from_pairs(&[("DATABASE_URL", "")]).database_url.is_none());
    }

    #[test]
    fn test_seed_listings_skip_malformed_pairs() {
        let config = from_pairs(&[("SEED_LISTINGS", "l-1:s-1, broken ,l-2:s-2,:nobody")]);
        assert_eq!(
            config.seed_listings,
            vec![
                ("l-1".to_string(), "s-1".to_string()),
                ("l-2".to_string(), "s-2".to_string())
            ]
        );
    }

    #[test]
    fn test_saga_config_mapping() {
        let config = from_pairs(&[("CALL_TIMEOUT_MS", "1500"), ("AUTO_RELEASE_DAYS", "3")]);
        let saga = config.saga_config();
        assert_eq!(saga.call_timeout, Duration::from_millis(1500));
        assert_eq!(saga.auto_release_days, 3);
        assert_eq!(saga.currency, "USD");
    }
}
