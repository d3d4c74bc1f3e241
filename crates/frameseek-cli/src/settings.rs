//! Settings file

use anyhow::{Context, Result};
use frameseek_core::PipelineConfig;
use frameseek_gateway::GatewayConfig;
use serde::Deserialize;
use std::path::Path;

/// Contents of the optional TOML settings file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) gateway: GatewayConfig,
    pub(crate) pipeline: PipelineConfig,
}

impl Settings {
    /// Read settings, or defaults when no path is given
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing settings in {}", path.display()))
    }

    pub(crate) fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
