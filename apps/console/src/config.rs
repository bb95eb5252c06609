use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use agent_core::{FetchFailurePolicy, SequenceTiming, StageCatalog};
use anyhow::{anyhow, Context};
use serde::Deserialize;
use shared::sanitize::{SanitizePolicy, Sanitizer};

pub const DEFAULT_CONFIG_FILE: &str = "support_agent.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub lead_in_ms: u64,
    pub stage_processing_ms: u64,
    pub stage_reveal_ms: u64,
    pub sanitize_policy: SanitizePolicy,
    pub fetch_failure_policy: FetchFailurePolicy,
    pub request_timeout_secs: u64,
    /// TOML stage catalog replacing the built-in IDOC walkthrough.
    pub catalog_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let timing = SequenceTiming::default();
        Self {
            api_url: "http://127.0.0.1:8000/api".into(),
            lead_in_ms: millis(timing.lead_in),
            stage_processing_ms: millis(timing.stage_processing),
            stage_reveal_ms: millis(timing.stage_reveal),
            sanitize_policy: SanitizePolicy::ExtractScalar,
            fetch_failure_policy: FetchFailurePolicy::FailOpen,
            request_timeout_secs: 30,
            catalog_path: None,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Settings {
    pub fn timing(&self) -> SequenceTiming {
        SequenceTiming {
            lead_in: Duration::from_millis(self.lead_in_ms),
            stage_processing: Duration::from_millis(self.stage_processing_ms),
            stage_reveal: Duration::from_millis(self.stage_reveal_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sanitizer(&self) -> Sanitizer {
        Sanitizer::new(self.sanitize_policy)
    }

    pub fn catalog(&self) -> anyhow::Result<StageCatalog> {
        let Some(path) = &self.catalog_path else {
            return Ok(StageCatalog::idoc_triage());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read stage catalog '{}'", path.display()))?;
        StageCatalog::from_toml_str(&raw)
            .with_context(|| format!("invalid stage catalog '{}'", path.display()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    api_url: Option<String>,
    lead_in_ms: Option<u64>,
    stage_processing_ms: Option<u64>,
    stage_reveal_ms: Option<u64>,
    sanitize_policy: Option<String>,
    fetch_failure_policy: Option<String>,
    request_timeout_secs: Option<u64>,
    catalog_path: Option<PathBuf>,
}

/// Defaults, then the config file, then the environment. An explicit
/// `config_path` must exist; the default file is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let raw = match config_path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?,
        ),
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).ok(),
    };
    if let Some(raw) = raw {
        apply_file(&mut settings, &raw)?;
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw).context("invalid config file")?;

    if let Some(v) = file.api_url {
        settings.api_url = v;
    }
    if let Some(v) = file.lead_in_ms {
        settings.lead_in_ms = v;
    }
    if let Some(v) = file.stage_processing_ms {
        settings.stage_processing_ms = v;
    }
    if let Some(v) = file.stage_reveal_ms {
        settings.stage_reveal_ms = v;
    }
    if let Some(v) = file.sanitize_policy {
        settings.sanitize_policy = parse_setting("sanitize_policy", &v)?;
    }
    if let Some(v) = file.fetch_failure_policy {
        settings.fetch_failure_policy = parse_setting("fetch_failure_policy", &v)?;
    }
    if let Some(v) = file.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file.catalog_path {
        settings.catalog_path = Some(v);
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("SUPPORT_AGENT_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = lookup("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = lookup("APP__LEAD_IN_MS") {
        settings.lead_in_ms = parse_setting("APP__LEAD_IN_MS", &v)?;
    }
    if let Some(v) = lookup("APP__STAGE_PROCESSING_MS") {
        settings.stage_processing_ms = parse_setting("APP__STAGE_PROCESSING_MS", &v)?;
    }
    if let Some(v) = lookup("APP__STAGE_REVEAL_MS") {
        settings.stage_reveal_ms = parse_setting("APP__STAGE_REVEAL_MS", &v)?;
    }

    if let Some(v) = lookup("APP__SANITIZE_POLICY") {
        settings.sanitize_policy = parse_setting("APP__SANITIZE_POLICY", &v)?;
    }
    if let Some(v) = lookup("APP__FETCH_FAILURE_POLICY") {
        settings.fetch_failure_policy = parse_setting("APP__FETCH_FAILURE_POLICY", &v)?;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = parse_setting("APP__REQUEST_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup("APP__CATALOG_PATH") {
        settings.catalog_path = Some(PathBuf::from(v));
    }
    Ok(())
}

fn parse_setting<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|error| anyhow!("invalid value '{raw}' for {name}: {error}"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
