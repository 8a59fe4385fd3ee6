use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Tunables for a bulk import. Every field has a default, so a TOML file only
/// needs the keys it wants to change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// chrono format strings tried in order.
    pub date_formats: Vec<String>,
    pub default_category_icon: String,
    /// Palette new categories draw their color from.
    pub category_colors: Vec<String>,
    /// Minimum similarity (0.0–1.0) for a "did you mean" hint.
    pub suggestion_threshold: f32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            date_formats: ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d.%m.%Y"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_category_icon: "tag".to_string(),
            category_colors: [
                "#EF5350", "#AB47BC", "#5C6BC0", "#29B6F6", "#26A69A", "#9CCC65", "#FFCA28",
                "#FF7043", "#8D6E63", "#78909C",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            suggestion_threshold: 0.75,
        }
    }
}

impl ImportConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ImportConfig = toml::from_str(toml_content)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.date_formats.is_empty() {
            return Err(ConfigError::Invalid("date_formats must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.suggestion_threshold) {
            return Err(ConfigError::Invalid(format!(
                "suggestion_threshold must be between 0 and 1, got {}",
                self.suggestion_threshold
            )));
        }
        Ok(())
    }
}
