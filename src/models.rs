use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single platform post pulled in by the poller. Never mutated after fetch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    /// Platform id. Empty when the platform omitted it.
    pub id: String,
    pub author_handle: String,
    pub text: String,
    pub created_at_epoch_secs: Option<i64>,
    pub conversation_id: Option<String>,
    pub in_reply_to_id: Option<String>,
}

impl Item {
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Latest,
    Top,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseAction {
    RespondImage,
    RespondText,
    Ignore,
}

/// Classifier output for one item. Not persisted.
#[derive(Clone, Debug)]
pub struct ResponsePlan<'a> {
    pub action: ResponseAction,
    pub target: &'a Item,
    pub prompt_override: Option<String>,
}

impl<'a> ResponsePlan<'a> {
    pub fn new(action: ResponseAction, target: &'a Item) -> Self {
        ResponsePlan {
            action,
            target,
            prompt_override: None,
        }
    }

    #[cfg(test)]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_override = Some(prompt.into());
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MediaRef {
    pub url: String,
}

/// A reply ready for the poster. Consumed once.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OutboundPost {
    pub reply_to_id: Option<String>,
    pub text: String,
    pub image: Option<MediaRef>,
}

/// What the platform hands back after a successful submission.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SentPost {
    pub id: String,
    pub permalink: String,
}

/// Cached under the account's `lastPost` key after every successful post.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PostedRecord {
    pub id: String,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
}
