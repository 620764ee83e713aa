use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use audit_core::{ExpertKey, MobilePolicy};
use audit_engine::{BackendSettings, PipelineSettings};
use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Serialize};

pub const ENV_API_KEY: &str = "AUDIT_API_KEY";
pub const ENV_ENDPOINT: &str = "AUDIT_ENDPOINT";

/// On-disk configuration, read from a `ron` file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub endpoint: String,
    pub api_key: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: Option<u64>,
    /// Expert names in run order: "Strategy", "UX", "Product", "Visual".
    pub experts: Vec<String>,
    pub expert_delay_ms: u64,
    pub min_content_chars: usize,
    pub max_inputs: usize,
    pub mobile_for_all_urls: bool,
    pub include_all_screenshots: bool,
    pub screenshot_mime_type: String,
    pub output_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let backend = BackendSettings::default();
        let pipeline = PipelineSettings::default();
        Self {
            endpoint: backend.endpoint,
            api_key: backend.api_key,
            connect_timeout_secs: backend.connect_timeout.as_secs(),
            request_timeout_secs: backend.request_timeout.map(|t| t.as_secs()),
            experts: pipeline
                .experts
                .iter()
                .map(|e| e.name().to_string())
                .collect(),
            expert_delay_ms: pipeline.expert_delay.as_millis() as u64,
            min_content_chars: pipeline.min_content_chars,
            max_inputs: pipeline.max_inputs,
            mobile_for_all_urls: pipeline.mobile_policy == MobilePolicy::AllUrls,
            include_all_screenshots: pipeline.include_all_screenshots,
            screenshot_mime_type: pipeline.screenshot_mime_type,
            output_dir: "audit-reports".to_string(),
        }
    }
}

impl AppConfig {
    /// Load `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                engine_info!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config {:?}", path));
            }
        };
        let config: AppConfig = ron::from_str(&content)
            .with_context(|| format!("failed to parse config {:?}", path))?;
        engine_info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, normally `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.api_key = key;
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint;
        }
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn pipeline_settings(&self) -> anyhow::Result<PipelineSettings> {
        let experts = self
            .experts
            .iter()
            .map(|name| parse_expert(name))
            .collect::<anyhow::Result<Vec<_>>>()?;
        if experts.is_empty() {
            bail!("config lists no experts to run");
        }
        if self.api_key.is_empty() {
            engine_warn!("No API key configured; set {} or api_key in the config", ENV_API_KEY);
        }
        Ok(PipelineSettings {
            experts,
            expert_delay: Duration::from_millis(self.expert_delay_ms),
            min_content_chars: self.min_content_chars,
            max_inputs: self.max_inputs,
            mobile_policy: if self.mobile_for_all_urls {
                MobilePolicy::AllUrls
            } else {
                MobilePolicy::PrimaryOnly
            },
            include_all_screenshots: self.include_all_screenshots,
            screenshot_mime_type: self.screenshot_mime_type.clone(),
        })
    }
}

fn parse_expert(name: &str) -> anyhow::Result<ExpertKey> {
    let wanted = name.trim();
    ExpertKey::ALL
        .into_iter()
        .find(|e| e.name().eq_ignore_ascii_case(wanted))
        .with_context(|| format!("unknown expert {wanted:?} in config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.ron")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.expert_delay_ms, 5000);
        assert_eq!(config.experts, vec!["Strategy", "UX", "Product", "Visual"]);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.ron");
        fs::write(&path, r#"(experts: ["ux", "Visual"], expert_delay_ms: 0)"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        let pipeline = config.pipeline_settings().unwrap();
        assert_eq!(pipeline.experts, vec![ExpertKey::Ux, ExpertKey::Visual]);
        assert_eq!(pipeline.expert_delay, Duration::ZERO);
        assert_eq!(pipeline.min_content_chars, 50);
    }

    #[test]
    fn unknown_expert_is_rejected() {
        let config = AppConfig {
            experts: vec!["Legal".to_string()],
            ..AppConfig::default()
        };
        assert!(config.pipeline_settings().is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig {
            api_key: "from-file".to_string(),
            ..AppConfig::default()
        };
        config.apply_env(|name| match name {
            ENV_API_KEY => Some("from-env".to_string()),
            ENV_ENDPOINT => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.endpoint, AppConfig::default().endpoint);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.ron");
        fs::write(&path, "not ron at all {").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }
}
