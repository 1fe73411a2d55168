use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engagements::{parse_limit, EngagementPipeline};
use crate::error::EngagementError;
use crate::types::Config;

pub const HUBSPOT_TOKEN_ENV: &str = "HUBSPOT_ACCESS_TOKEN";
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ENGAGEMENTS_LIMIT_ENV: &str = "HUBSPOT_ENGAGEMENTS_LIMIT";

/// Process-wide state: the loaded config and the pipeline built from it.
///
/// The pipeline (and with it the engagement cache) is created on first use
/// and shared by every later lookup.
pub struct AppState {
    config: Config,
    pipeline: Mutex<Option<Arc<EngagementPipeline>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pipeline: Mutex::new(None),
        }
    }

    /// The shared pipeline, built from the config on first call.
    pub fn pipeline(&self) -> Result<Arc<EngagementPipeline>, EngagementError> {
        let mut guard = self.pipeline.lock();
        if let Some(pipeline) = guard.as_ref() {
            return Ok(pipeline.clone());
        }
        let pipeline = Arc::new(EngagementPipeline::from_config(&self.config)?);
        *guard = Some(pipeline.clone());
        Ok(pipeline)
    }
}

/// Get the canonical config file path (~/.prospector/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".prospector").join("config.json"))
}

/// Load configuration from ~/.prospector/config.json plus environment overrides.
///
/// A missing file is not an error: credentials commonly come from the
/// environment alone.
pub fn load_config() -> Result<Config, String> {
    let config = load_config_from(&config_path()?)?;
    Ok(apply_env_overrides(config, |name| std::env::var(name).ok()))
}

/// Parse a config file, or return defaults when it doesn't exist.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::debug!("Config: no file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply environment variables on top of file config.
///
/// `lookup` is `std::env::var` in production; tests pass a map.
pub fn apply_env_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = non_blank(HUBSPOT_TOKEN_ENV) {
        config.hubspot.access_token = Some(token.trim().to_string());
    }
    if let Some(key) = non_blank(ANTHROPIC_KEY_ENV) {
        config.summary.api_key = Some(key.trim().to_string());
    }
    if let Some(raw) = lookup(ENGAGEMENTS_LIMIT_ENV) {
        let limit = parse_limit(&raw);
        if raw.trim().parse::<usize>().ok() != Some(limit) {
            log::warn!(
                "Config: {}={:?} is out of range or invalid, using {}",
                ENGAGEMENTS_LIMIT_ENV,
                raw,
                limit
            );
        }
        config.engagements.limit = limit;
    }
    config
}
