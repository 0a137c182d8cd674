//! Runtime settings read from the environment (after `.env` is loaded).

use std::str::FromStr;
use std::time::Duration;

use crate::core::classifier::TopicAction;
use crate::core::composer::ImageOptions;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    File(String),
    Redis(String),
    Memory,
}

#[derive(Debug, Clone)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub upload_url: String,
    pub public_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HeuristSettings {
    pub api_key: String,
    pub model_id: String,
}

/// Everything the composition root needs to wire the pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Handle of the account the agent posts as, without the leading `@`.
    pub twitter_username: String,
    pub twitter_credentials: Option<TwitterCredentials>,
    pub poll_interval: Duration,
    pub search_window: usize,
    pub poll_timeout: Duration,
    pub min_post_spacing: Duration,
    /// Chance of engaging with a topical item that does not mention the agent.
    pub engagement_probability: f64,
    pub topic_keywords: Vec<String>,
    pub topic_action: TopicAction,
    pub dry_run: bool,
    /// Bound on the in-memory dedupe set. `None` keeps every id for the process lifetime.
    pub dedupe_capacity: Option<u64>,
    pub cache: CacheBackend,
    pub character_name: String,
    pub anthropic_api_key: Option<String>,
    pub heurist: Option<HeuristSettings>,
    pub storage: Option<StorageSettings>,
    pub image: ImageOptions,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let twitter_username = get("TWITTER_USERNAME")
            .map(|u| u.trim_start_matches('@').to_string())
            .ok_or_else(|| ConfigError::MissingEnvVar("TWITTER_USERNAME".to_string()))?;

        let twitter_credentials = match (
            get("TWITTER_CONSUMER_KEY"),
            get("TWITTER_CONSUMER_SECRET"),
            get("TWITTER_ACCESS_TOKEN"),
            get("TWITTER_ACCESS_TOKEN_SECRET"),
        ) {
            (Some(consumer_key), Some(consumer_secret), Some(access_token), Some(access_token_secret)) => {
                Some(TwitterCredentials {
                    consumer_key,
                    consumer_secret,
                    access_token,
                    access_token_secret,
                })
            }
            _ => None,
        };

        let engagement_probability: f64 = parse_or(&get, "ENGAGEMENT_PROBABILITY", 0.2)?;
        if !(0.0..=1.0).contains(&engagement_probability) {
            return Err(ConfigError::InvalidValue {
                key: "ENGAGEMENT_PROBABILITY".to_string(),
                message: format!("{} is outside [0, 1]", engagement_probability),
            });
        }

        let topic_action = match get("TOPIC_RESPONSE").as_deref() {
            None | Some("image") => TopicAction::Image,
            Some("text") => TopicAction::Text,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "TOPIC_RESPONSE".to_string(),
                    message: format!("expected 'image' or 'text', got '{}'", other),
                })
            }
        };

        let cache = match get("CACHE_BACKEND").as_deref() {
            None | Some("file") => CacheBackend::File(
                get("CACHE_PATH").unwrap_or_else(|| crate::memory::FileCache::DEFAULT_PATH.to_string()),
            ),
            Some("redis") => {
                CacheBackend::Redis(get("REDIS_ADDR").unwrap_or_else(|| "127.0.0.1:6379".to_string()))
            }
            Some("memory") => CacheBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "CACHE_BACKEND".to_string(),
                    message: format!("unknown backend '{}'", other),
                })
            }
        };

        let storage = match (get("STORAGE_UPLOAD_URL"), get("STORAGE_PUBLIC_URL")) {
            (Some(upload_url), Some(public_url)) => Some(StorageSettings {
                upload_url,
                public_url,
                token: get("STORAGE_TOKEN"),
            }),
            _ => None,
        };

        let heurist = get("HEURIS_API").map(|api_key| HeuristSettings {
            api_key,
            model_id: get("HEURIS_MODEL_ID").unwrap_or_else(|| "BluePencilRealistic".to_string()),
        });

        let image = ImageOptions {
            width: parse_opt(&get, "IMAGE_WIDTH")?,
            height: parse_opt(&get, "IMAGE_HEIGHT")?,
            seed: parse_opt(&get, "IMAGE_SEED")?,
            guidance_scale: parse_opt(&get, "IMAGE_GUIDANCE_SCALE")?,
            num_iterations: parse_opt(&get, "IMAGE_STEPS")?,
            negative_prompt: get("IMAGE_NEGATIVE_PROMPT"),
        };

        Ok(Settings {
            twitter_username,
            twitter_credentials,
            poll_interval: Duration::from_secs(parse_or(&get, "TWITTER_POLL_INTERVAL", 120)?),
            search_window: parse_or(&get, "TWITTER_SEARCH_WINDOW", 20)?,
            poll_timeout: Duration::from_secs(parse_or(&get, "TWITTER_POLL_TIMEOUT", 15)?),
            min_post_spacing: Duration::from_secs(parse_or(&get, "POST_MIN_SPACING", 2)?),
            engagement_probability,
            topic_keywords: get("TOPIC_KEYWORDS")
                .map(|list| {
                    list.split(',')
                        .map(|w| w.trim().to_string())
                        .filter(|w| !w.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            topic_action,
            dry_run: parse_or(&get, "TWITTER_DRY_RUN", false)?,
            dedupe_capacity: parse_opt(&get, "DEDUPE_CAPACITY")?,
            cache,
            character_name: get("CHARACTER_NAME").unwrap_or_else(|| "agentbot".to_string()),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            heurist,
            storage,
            image,
        })
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}': {}", raw, e),
            })
        })
        .transpose()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_username_is_set() {
        let s = settings(&[("TWITTER_USERNAME", "@agentbot")]).unwrap();
        assert_eq!(s.twitter_username, "agentbot");
        assert_eq!(s.poll_interval, Duration::from_secs(120));
        assert_eq!(s.search_window, 20);
        assert_eq!(s.poll_timeout, Duration::from_secs(15));
        assert_eq!(s.min_post_spacing, Duration::from_secs(2));
        assert_eq!(s.engagement_probability, 0.2);
        assert_eq!(s.topic_action, TopicAction::Image);
        assert_eq!(s.dedupe_capacity, None);
        assert!(!s.dry_run);
        assert!(s.twitter_credentials.is_none());
        assert!(s.heurist.is_none());
        assert!(s.storage.is_none());
        assert_eq!(
            s.cache,
            CacheBackend::File(crate::memory::FileCache::DEFAULT_PATH.to_string())
        );
    }

    #[test]
    fn missing_username_is_rejected() {
        let err = settings(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "TWITTER_USERNAME"));
    }

    #[test]
    fn probability_outside_unit_interval_is_rejected() {
        let err = settings(&[
            ("TWITTER_USERNAME", "agentbot"),
            ("ENGAGEMENT_PROBABILITY", "1.5"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "ENGAGEMENT_PROBABILITY"));
    }

    #[test]
    fn keywords_and_overrides_parse() {
        let s = settings(&[
            ("TWITTER_USERNAME", "agentbot"),
            ("TOPIC_KEYWORDS", "rust, tokio ,,async"),
            ("TOPIC_RESPONSE", "text"),
            ("DEDUPE_CAPACITY", "5000"),
            ("TWITTER_DRY_RUN", "true"),
            ("CACHE_BACKEND", "redis"),
            ("IMAGE_WIDTH", "768"),
        ])
        .unwrap();
        assert_eq!(s.topic_keywords, vec!["rust", "tokio", "async"]);
        assert_eq!(s.topic_action, TopicAction::Text);
        assert_eq!(s.dedupe_capacity, Some(5000));
        assert!(s.dry_run);
        assert_eq!(s.cache, CacheBackend::Redis("127.0.0.1:6379".to_string()));
        assert_eq!(s.image.width, Some(768));
        assert_eq!(s.image.height, None);
    }

    #[test]
    fn malformed_number_names_the_key() {
        let err = settings(&[
            ("TWITTER_USERNAME", "agentbot"),
            ("TWITTER_POLL_INTERVAL", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "TWITTER_POLL_INTERVAL"));
    }
}
