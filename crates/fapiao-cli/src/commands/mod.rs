//! Subcommands.

pub mod batch;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};

use tracing::debug;

use fapiao_core::{DocumentPipeline, ExtractionMode, FapiaoConfig, ModelProfile};

use crate::client::HttpModelClient;

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fapiao")
        .join("config.json")
}

/// Configuration file in effect: the explicit path, else the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the explicit configuration file, the default one if it exists, or defaults.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<FapiaoConfig> {
    if let Some(path) = explicit {
        return Ok(FapiaoConfig::from_file(Path::new(path))?);
    }
    let path = default_config_path();
    if path.exists() {
        debug!("Loading configuration from {}", path.display());
        Ok(FapiaoConfig::from_file(&path)?)
    } else {
        Ok(FapiaoConfig::default())
    }
}

/// Build a pipeline for `mode` with the named (or active) model profile.
pub fn build_pipeline(
    config: &FapiaoConfig,
    mode: Option<ExtractionMode>,
    profile: Option<&str>,
) -> anyhow::Result<DocumentPipeline<HttpModelClient>> {
    let mode = mode.unwrap_or(config.extraction.mode);
    let profile: ModelProfile = config.models.resolve(profile)?;
    if mode.uses_model() {
        debug!(
            api = ?profile.api,
            base_url = %profile.base_url,
            model = profile.model_for(mode == ExtractionMode::Vlm),
            "using model profile"
        );
    }
    let client = HttpModelClient::new(&profile);
    Ok(DocumentPipeline::new(config, client, &profile)?.with_mode(mode))
}
