/// `load_config` module: reads the harness YAML file into a typed [`HarnessConfig`].
///
/// This is the only place where user-supplied YAML is parsed. Store settings
/// can be overridden from the environment so that credentials-adjacent values
/// (region, endpoint) stay out of checked-in files:
///
/// - `FILESET_SYNC_REGION` replaces `store.region`
/// - `FILESET_SYNC_ENDPOINT_URL` replaces `store.endpoint_url`
///
/// # Errors
/// All failures are `anyhow::Error`s with the offending path or resource name
/// in the message, surfaced at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use fileset_sync_core::FilesetConfiguration;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const REGION_ENV: &str = "FILESET_SYNC_REGION";
pub const ENDPOINT_URL_ENV: &str = "FILESET_SYNC_ENDPOINT_URL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub store: StoreSection,
    /// Directory match patterns are resolved against. Defaults to the
    /// working directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Ceiling for each object's post-write existence check.
    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,
    #[serde(default)]
    pub resources: BTreeMap<String, FilesetConfiguration>,
}

impl HarnessConfig {
    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }

    pub fn resource(&self, name: &str) -> Result<&FilesetConfiguration> {
        self.resources
            .get(name)
            .ok_or_else(|| anyhow!("No resource named `{name}` in configuration"))
    }
}

fn env_override(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Loads and validates the harness configuration at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<HarnessConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let mut config: HarnessConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;

    if let Some(region) = env_override(REGION_ENV) {
        info!(region = %region, "Store region taken from environment");
        config.store.region = Some(region);
    }
    if let Some(endpoint) = env_override(ENDPOINT_URL_ENV) {
        info!(endpoint_url = %endpoint, "Store endpoint taken from environment");
        config.store.endpoint_url = Some(endpoint);
    }

    for (name, resource) in &config.resources {
        resource
            .validate()
            .with_context(|| format!("Resource `{name}` is invalid"))?;
    }

    info!(
        config_path = ?path_ref,
        resources = config.resources.len(),
        "Parsed config YAML successfully"
    );
    Ok(config)
}
