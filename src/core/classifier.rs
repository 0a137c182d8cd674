//! Decides whether and how to answer an item.
//!
//! Direct mentions always get an answer (image when the text asks for one).
//! Items that only touch a configured topic pass a probability gate first.

use std::sync::Arc;

use rand::Rng;
use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use tracing::debug;

use crate::models::{Item, ResponseAction, ResponsePlan};

/// Source of uniform floats in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next(&self) -> f64;
}

pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// What a topical item that passes the gate gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicAction {
    Image,
    Text,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub handle: String,
    pub keywords: Vec<String>,
    pub engagement_probability: f64,
    pub topic_action: TopicAction,
}

// Keyword fragments, matched anywhere in the text and in any order
const DRAW: usize = 0;
const PICTURE: usize = 1;
const IMAGE: usize = 2;
const GENERATE: usize = 3;
const CRAFT: usize = 4;
const IMAGE_INTENT_KEYWORDS: [&str; 5] = [
    "draw",
    "picture",
    "image",
    "generat",
    "creat|mak(?:e|ing)|paint",
];

pub struct Classifier {
    mention: String,
    topics: Option<Regex>,
    image_intent: RegexSet,
    engagement_probability: f64,
    topic_action: TopicAction,
    rng: Arc<dyn RandomSource>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig, rng: Arc<dyn RandomSource>) -> Result<Self, regex::Error> {
        let image_intent = RegexSetBuilder::new(IMAGE_INTENT_KEYWORDS)
            .case_insensitive(true)
            .build()?;

        let escaped: Vec<String> = config
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        let topics = if escaped.is_empty() {
            None
        } else {
            Some(
                RegexBuilder::new(&escaped.join("|"))
                    .case_insensitive(true)
                    .build()?,
            )
        };

        Ok(Classifier {
            mention: format!("@{}", config.handle.trim_start_matches('@').to_lowercase()),
            topics,
            image_intent,
            engagement_probability: config.engagement_probability,
            topic_action: config.topic_action,
            rng,
        })
    }

    pub fn mentions_agent(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.mention)
    }

    /// "draw" or "picture" alone, or "image" together with a generate, create,
    /// make or paint word.
    pub fn has_image_intent(&self, text: &str) -> bool {
        let found = self.image_intent.matches(text);
        found.matched(DRAW)
            || found.matched(PICTURE)
            || (found.matched(IMAGE) && (found.matched(GENERATE) || found.matched(CRAFT)))
    }

    pub fn classify<'a>(&self, item: &'a Item) -> ResponsePlan<'a> {
        let action = if self.mentions_agent(&item.text) {
            if self.has_image_intent(&item.text) {
                ResponseAction::RespondImage
            } else {
                ResponseAction::RespondText
            }
        } else if self
            .topics
            .as_ref()
            .is_some_and(|topics| topics.is_match(&item.text))
        {
            let roll = self.rng.next();
            if roll < self.engagement_probability {
                match self.topic_action {
                    TopicAction::Image => ResponseAction::RespondImage,
                    TopicAction::Text => ResponseAction::RespondText,
                }
            } else {
                debug!(item_id = %item.id, roll, "Topical item lost the engagement roll");
                ResponseAction::Ignore
            }
        } else {
            ResponseAction::Ignore
        };

        debug!(item_id = %item.id, action = ?action, "Classified item");
        ResponsePlan::new(action, item)
    }
}
