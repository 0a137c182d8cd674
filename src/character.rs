use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

const DEFAULT_IMAGE_SCENE: &str =
    "a quiet landscape at golden hour, soft light, detailed digital painting";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    pub name: String,
    /// Persona preamble handed to the text generator.
    pub prompt: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub adjectives: Vec<String>,
    /// Scene used when an image request has nothing left after cleanup.
    #[serde(default)]
    pub image_scene: Option<String>,
    /// Reply used when no text generator is configured. `{author}` is substituted.
    #[serde(default)]
    pub fallback_reply: Option<String>,
}

impl CharacterConfig {
    pub fn image_scene(&self) -> &str {
        self.image_scene.as_deref().unwrap_or(DEFAULT_IMAGE_SCENE)
    }

    /// Topic and trait words the classifier treats as engagement triggers.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.topics
            .iter()
            .chain(self.adjectives.iter())
            .map(String::as_str)
    }
}

pub fn character_path(root: impl AsRef<Path>, character_name: &str) -> PathBuf {
    let mut config_path = root.as_ref().to_path_buf();
    config_path.push(character_name);
    config_path.push("config.json");
    config_path
}

pub fn load_character_config(
    root: impl AsRef<Path>,
    character_name: &str,
) -> Result<CharacterConfig, ConfigError> {
    let config_path = character_path(root, character_name);

    if !config_path.exists() {
        return Err(ConfigError::Character {
            name: character_name.to_string(),
            reason: format!("no config at {}", config_path.display()),
        });
    }

    let config_str = fs::read_to_string(&config_path)?;
    let config: CharacterConfig =
        serde_json::from_str(&config_str).map_err(|e| ConfigError::Character {
            name: character_name.to_string(),
            reason: e.to_string(),
        })?;

    if config.prompt.trim().is_empty() {
        return Err(ConfigError::Character {
            name: character_name.to_string(),
            reason: "prompt is empty".to_string(),
        });
    }

    info!(character = %config.name, topics = config.topics.len(), "Loaded character profile");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_fields_default() {
        let config: CharacterConfig =
            serde_json::from_str(r#"{"name":"bot","prompt":"you are a bot"}"#).unwrap();
        assert!(config.topics.is_empty());
        assert_eq!(config.image_scene(), DEFAULT_IMAGE_SCENE);
        assert_eq!(config.keywords().count(), 0);
    }

    #[test]
    fn keywords_merge_topics_and_adjectives() {
        let config: CharacterConfig = serde_json::from_str(
            r#"{"name":"bot","prompt":"p","topics":["space"],"adjectives":["curious"]}"#,
        )
        .unwrap();
        let words: Vec<&str> = config.keywords().collect();
        assert_eq!(words, vec!["space", "curious"]);
    }

    #[test]
    fn unknown_character_is_a_config_error() {
        let err = load_character_config(std::env::temp_dir(), "definitely-not-here").unwrap_err();
        assert!(matches!(err, ConfigError::Character { .. }));
    }

    #[test]
    fn bundled_character_loads() {
        let config =
            load_character_config(concat!(env!("CARGO_MANIFEST_DIR"), "/characters"), "agentbot")
                .unwrap();
        assert_eq!(config.name, "agentbot");
        assert!(!config.topics.is_empty());
    }
}
