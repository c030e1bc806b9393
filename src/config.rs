use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;

/// Engine configuration, resolved once from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub environment: String,
    /// Management fee percentage applied when a caller does not supply one.
    pub default_fee_percent: Decimal,
    /// Tolerance when checking that ownership percentages sum to 100.
    pub ownership_percent_tolerance: Decimal,
    pub period_rate_cache_ttl_seconds: u64,
    pub period_rate_cache_max_entries: u64,
    /// Upper bound on rows fetched for one reporting window.
    pub window_query_limit: i64,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            environment: env_or("ENVIRONMENT", "development"),
            default_fee_percent: env_parse_decimal_or("DEFAULT_FEE_PERCENT", Decimal::TEN),
            ownership_percent_tolerance: env_parse_decimal_or(
                "OWNERSHIP_PERCENT_TOLERANCE",
                Decimal::new(1, 2),
            ),
            period_rate_cache_ttl_seconds: env_parse_or("PERIOD_RATE_CACHE_TTL_SECONDS", 20),
            period_rate_cache_max_entries: env_parse_or("PERIOD_RATE_CACHE_MAX_ENTRIES", 2000),
            window_query_limit: env_parse_or("WINDOW_QUERY_LIMIT", 10_000),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            default_fee_percent: Decimal::TEN,
            ownership_percent_tolerance: Decimal::new(1, 2),
            period_rate_cache_ttl_seconds: 20,
            period_rate_cache_max_entries: 2000,
            window_query_limit: 10_000,
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_decimal_or(key: &str, default: Decimal) -> Decimal {
    env_opt(key)
        .and_then(|raw| Decimal::from_str(&raw).ok())
        .filter(|value| !value.is_sign_negative())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::EngineConfig;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.default_fee_percent, dec!(10));
        assert_eq!(config.ownership_percent_tolerance, dec!(0.01));
        assert!(!config.is_production());
    }
}
