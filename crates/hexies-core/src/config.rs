//! Configuration for the plugin core
//!
//! Values come from defaults, overridden by `HEXIES_*` environment variables
//! (a `.env` file is honoured when present).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::data::{HexiesError, HexiesResult, PlanId, Size};
use crate::entitlement::EntitlementPolicy;

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Base URL of the backend API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Timeout for backend requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Two selections of the same widget closer than this are a flip request
    #[serde(default = "default_click_window_ms")]
    pub click_window_ms: u64,

    /// How long before token expiry the refresh task fires
    #[serde(default = "default_refresh_lead_secs")]
    pub refresh_lead_secs: u64,

    /// Age after which a cached catalog snapshot is no longer served
    #[serde(default = "default_cache_freshness_secs")]
    pub cache_freshness_secs: u64,

    /// Directory for the file-backed fallback cache
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Plans granted access to non-free catalog items
    #[serde(default = "default_premium_plans")]
    pub premium_plans: Vec<PlanId>,

    /// Custom item limit of the synthetic free-tier record used in fallback mode
    #[serde(default = "default_free_item_limit")]
    pub free_item_limit: i64,

    /// Size of newly placed widgets
    #[serde(default = "default_widget_size")]
    pub widget_size: Size,

    /// Maximum offset from the viewport centre when placing without coordinates
    #[serde(default = "default_placement_jitter")]
    pub placement_jitter: f64,

    /// Log filter directive
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit JSON logs instead of pretty ones
    #[serde(default)]
    pub json_logs: bool,
}

fn default_api_base_url() -> String {
    "http://localhost:3001/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_click_window_ms() -> u64 {
    300
}

fn default_refresh_lead_secs() -> u64 {
    300 // 5 minutes
}

fn default_cache_freshness_secs() -> u64 {
    24 * 60 * 60
}

fn default_premium_plans() -> Vec<PlanId> {
    vec![PlanId::Pro, PlanId::Lifetime, PlanId::Enterprise]
}

fn default_free_item_limit() -> i64 {
    5
}

fn default_widget_size() -> Size {
    Size::new(180.0, 156.0)
}

fn default_placement_jitter() -> f64 {
    300.0
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            click_window_ms: default_click_window_ms(),
            refresh_lead_secs: default_refresh_lead_secs(),
            cache_freshness_secs: default_cache_freshness_secs(),
            cache_dir: None,
            premium_plans: default_premium_plans(),
            free_item_limit: default_free_item_limit(),
            widget_size: default_widget_size(),
            placement_jitter: default_placement_jitter(),
            log_filter: default_log_filter(),
            json_logs: false,
        }
    }
}

impl PluginConfig {
    /// Load configuration from the process environment.
    pub fn load() -> HexiesResult<Self> {
        dotenv::dotenv().ok();
        let vars: HashMap<String, String> = env::vars()
            .filter(|(key, _)| key.starts_with("HEXIES_"))
            .collect();
        Self::from_vars(&vars)
    }

    /// Build a configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> HexiesResult<Self> {
        let mut config = Self::default();

        if let Some(url) = vars.get("HEXIES_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        parse_into(vars, "HEXIES_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs);
        parse_into(vars, "HEXIES_CLICK_WINDOW_MS", &mut config.click_window_ms);
        parse_into(vars, "HEXIES_REFRESH_LEAD_SECS", &mut config.refresh_lead_secs);
        parse_into(vars, "HEXIES_CACHE_FRESHNESS_SECS", &mut config.cache_freshness_secs);
        parse_into(vars, "HEXIES_FREE_ITEM_LIMIT", &mut config.free_item_limit);
        parse_into(vars, "HEXIES_PLACEMENT_JITTER", &mut config.placement_jitter);

        if let Some(dir) = vars.get("HEXIES_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(dir));
        }

        if let Some(plans) = vars.get("HEXIES_PREMIUM_PLANS") {
            let parsed: Vec<PlanId> = plans
                .split(',')
                .filter(|p| !p.trim().is_empty())
                .map(PlanId::parse)
                .collect();
            if parsed.contains(&PlanId::Unknown) {
                warn!("Ignoring unknown plan names in HEXIES_PREMIUM_PLANS: {}", plans);
            }
            config.premium_plans = parsed.into_iter().filter(|p| *p != PlanId::Unknown).collect();
        }

        if let Some(filter) = vars.get("HEXIES_LOG_FILTER") {
            config.log_filter = filter.clone();
        }

        if let Some(json) = vars.get("HEXIES_JSON_LOGS") {
            config.json_logs = json.eq_ignore_ascii_case("true") || json == "1";
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the services cannot work with.
    pub fn validate(&self) -> HexiesResult<()> {
        if self.api_base_url.is_empty() {
            return Err(HexiesError::Configuration("api_base_url must not be empty".into()));
        }
        if self.click_window_ms == 0 {
            return Err(HexiesError::Configuration("click_window_ms must be positive".into()));
        }
        if self.free_item_limit < -1 {
            return Err(HexiesError::Configuration(
                "free_item_limit must be -1 (unlimited) or non-negative".into(),
            ));
        }
        let Size { width, height } = self.widget_size;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(HexiesError::Configuration(
                "widget_size must be finite and positive".into(),
            ));
        }
        if !self.placement_jitter.is_finite() || self.placement_jitter < 0.0 {
            return Err(HexiesError::Configuration(
                "placement_jitter must be finite and not negative".into(),
            ));
        }
        Ok(())
    }

    pub fn click_window(&self) -> Duration {
        Duration::from_millis(self.click_window_ms)
    }

    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    pub fn cache_freshness(&self) -> Duration {
        Duration::from_secs(self.cache_freshness_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn entitlement_policy(&self) -> EntitlementPolicy {
        EntitlementPolicy::new(self.premium_plans.iter().copied())
    }
}

fn parse_into<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str, target: &mut T) {
    if let Some(raw) = vars.get(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = PluginConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.click_window(), Duration::from_millis(300));
        assert_eq!(config.refresh_lead(), Duration::from_secs(300));
        assert_eq!(config.free_item_limit, 5);
        assert_eq!(
            config.premium_plans,
            vec![PlanId::Pro, PlanId::Lifetime, PlanId::Enterprise]
        );
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = PluginConfig::from_vars(&vars(&[
            ("HEXIES_API_URL", "https://api.example.com/"),
            ("HEXIES_CLICK_WINDOW_MS", "450"),
            ("HEXIES_REFRESH_LEAD_SECS", "soon"),
            ("HEXIES_PREMIUM_PLANS", "enterprise, bogus"),
            ("HEXIES_JSON_LOGS", "1"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.click_window_ms, 450);
        assert_eq!(config.refresh_lead_secs, 300, "invalid value keeps the default");
        assert_eq!(config.premium_plans, vec![PlanId::Enterprise]);
        assert!(config.json_logs);
    }

    #[test]
    fn test_validation_rejects_non_finite_geometry() {
        for raw in ["inf", "NaN"] {
            let result = PluginConfig::from_vars(&vars(&[("HEXIES_PLACEMENT_JITTER", raw)]));
            assert!(matches!(result, Err(HexiesError::Configuration(_))), "{}", raw);
        }

        let config = PluginConfig {
            widget_size: Size {
                width: f64::NAN,
                height: 200.0,
            },
            ..PluginConfig::default()
        };
        assert!(matches!(config.validate(), Err(HexiesError::Configuration(_))));
    }

    #[test]
    fn test_validation_rejects_zero_click_window() {
        let result = PluginConfig::from_vars(&vars(&[("HEXIES_CLICK_WINDOW_MS", "0")]));
        assert!(matches!(result, Err(HexiesError::Configuration(_))));
    }
}
