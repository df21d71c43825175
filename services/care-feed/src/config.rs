use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use svckit::config::{BackendConfig, ObservabilityConfig};

use crate::filter::FilterConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CareFeedConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub clinician: ClinicianProfile,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    /// Seconds between mock notifications in demo mode.
    #[serde(default = "default_demo_tick")]
    pub demo_tick_secs: u64,
}

impl FeedsConfig {
    pub fn demo_tick(&self) -> Duration {
        Duration::from_secs(self.demo_tick_secs.max(1))
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            demo_tick_secs: default_demo_tick(),
        }
    }
}

fn default_demo_tick() -> u64 {
    30
}

/// The signed-in clinician shown in the dashboard header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicianProfile {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
}

impl Default for ClinicianProfile {
    fn default() -> Self {
        Self {
            name: "Dr. Sarah Wilson".to_string(),
            role: "doctor".to_string(),
            doctor_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

fn default_port() -> u16 {
    8080
}

/// Layer `CARE_FEED__SECTION__KEY` environment variables over the optional
/// YAML file at `path`.
pub fn load_config(path: &str) -> Result<CareFeedConfig> {
    let config = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::with_prefix("CARE_FEED").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use svckit::types::NotificationPriority;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config("does/not/exist/care-feed").unwrap();
        assert_eq!(config.backend.driver, "memory");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.feeds.demo_tick_secs, 30);
        assert!(!config.feeds.filter.scope_to_doctor);
    }

    #[test]
    fn test_yaml_sections() {
        let yaml = r#"
backend:
  driver: hosted
  url: https://demo.supabase.co
  api_key: anon
feeds:
  demo_tick_secs: 5
  filter:
    scope_to_doctor: true
    min_priority: medium
clinician:
  name: Dr. Lee
  role: doctor
  doctor_id: dr-7
"#;
        let config: CareFeedConfig = Config::builder()
            .add_source(File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.backend.driver, "hosted");
        assert_eq!(config.backend.api_key.as_deref(), Some("anon"));
        assert_eq!(config.backend.schema, "public");
        assert_eq!(config.feeds.demo_tick(), Duration::from_secs(5));
        assert_eq!(config.feeds.filter.min_priority, NotificationPriority::Medium);
        assert_eq!(config.clinician.doctor_id.as_deref(), Some("dr-7"));
    }
}
