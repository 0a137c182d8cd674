//! Turns a response plan into an outbound post.
//!
//! Text replies come from the persona-driven text generator. Image replies run
//! prompt derivation, generation and upload; any failure on that path degrades
//! to a text reply with an apology instead of dropping the item.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::character::CharacterConfig;
use crate::error::{GenerationError, PipelineError, StorageError};
use crate::models::{Item, MediaRef, OutboundPost, ResponseAction, ResponsePlan};
use crate::providers::{
    GeneratedImage, ImageGenerator, ImageRequest, ObjectStorage, TextConstraints, TextGenerator,
};

pub const MAX_POST_CHARS: usize = 280;

// Room kept for " <url>" when an image link is appended
const LINK_RESERVE: usize = 24;

const APOLOGY_TEXT: &str = "Sorry, I couldn't put a reply together just now. Try me again in a bit!";
const IMAGE_APOLOGY_PREFIX: &str = "Sorry, I couldn't make that image right now.";
const DEFAULT_FALLBACK_REPLY: &str = "@{author} thanks for the mention!";

/// Image tuning knobs. Unset fields fall back to the documented defaults when
/// the request is resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageOptions {
    /// Defaults to 1024.
    pub width: Option<u32>,
    /// Defaults to 1024.
    pub height: Option<u32>,
    /// Provider picks one when unset.
    pub seed: Option<u64>,
    /// Provider default when unset.
    pub guidance_scale: Option<f64>,
    /// Provider default when unset.
    pub num_iterations: Option<u32>,
    pub negative_prompt: Option<String>,
}

impl ImageOptions {
    pub const DEFAULT_SIZE: u32 = 1024;

    pub fn resolve(&self, prompt: String) -> ImageRequest {
        ImageRequest {
            prompt,
            width: self.width.unwrap_or(Self::DEFAULT_SIZE),
            height: self.height.unwrap_or(Self::DEFAULT_SIZE),
            seed: self.seed,
            guidance_scale: self.guidance_scale,
            num_iterations: self.num_iterations,
            negative_prompt: self.negative_prompt.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ImageStepError {
    #[error("image generation is not configured")]
    Unavailable,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct ResponseComposer {
    character: CharacterConfig,
    text: Option<Arc<dyn TextGenerator>>,
    images: Option<Arc<dyn ImageGenerator>>,
    storage: Option<Arc<dyn ObjectStorage>>,
    image_options: ImageOptions,
    mentions: Regex,
    triggers: Regex,
    filler: Regex,
}

impl ResponseComposer {
    pub fn new(
        character: CharacterConfig,
        text: Option<Arc<dyn TextGenerator>>,
        images: Option<Arc<dyn ImageGenerator>>,
        storage: Option<Arc<dyn ObjectStorage>>,
        image_options: ImageOptions,
    ) -> Result<Self, regex::Error> {
        Ok(ResponseComposer {
            character,
            text,
            images,
            storage,
            image_options,
            mentions: Regex::new(r"@\w+")?,
            triggers: RegexBuilder::new(
                r"\b(?:generat\w*|creat\w*|make|makes|making|paint\w*|\w*draw\w*|images?|pictures?)\b",
            )
            .case_insensitive(true)
            .build()?,
            filler: RegexBuilder::new(r"^(?:(?:please|me|us|an?|of)\s+)+")
                .case_insensitive(true)
                .build()?,
        })
    }

    pub async fn compose(&self, plan: &ResponsePlan<'_>) -> Result<OutboundPost, PipelineError> {
        let item = plan.target;
        match plan.action {
            ResponseAction::Ignore => Err(PipelineError::ContractViolation(format!(
                "compose called for ignored item {}",
                item.id
            ))),
            ResponseAction::RespondText => Ok(OutboundPost {
                reply_to_id: Some(item.id.clone()),
                text: self.reply_text(item, None, MAX_POST_CHARS).await,
                image: None,
            }),
            ResponseAction::RespondImage => match self.render_image(plan).await {
                Ok(media) => {
                    let text = self
                        .reply_text(item, None, MAX_POST_CHARS - LINK_RESERVE)
                        .await;
                    Ok(OutboundPost {
                        reply_to_id: Some(item.id.clone()),
                        text,
                        image: Some(media),
                    })
                }
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "Image step failed, replying with text only");
                    Ok(OutboundPost {
                        reply_to_id: Some(item.id.clone()),
                        text: self
                            .reply_text(item, Some(IMAGE_APOLOGY_PREFIX), MAX_POST_CHARS)
                            .await,
                        image: None,
                    })
                }
            },
        }
    }

    /// Item text minus @-mentions and generation keywords. Falls back to the
    /// persona's default scene when nothing is left.
    pub fn image_prompt(&self, text: &str) -> String {
        let without_mentions = self.mentions.replace_all(text, " ");
        let without_triggers = self.triggers.replace_all(&without_mentions, " ");
        let collapsed = without_triggers.split_whitespace().collect::<Vec<_>>().join(" ");
        let prompt = self.filler.replace(&collapsed, "").trim().to_string();

        if prompt.chars().any(char::is_alphanumeric) {
            prompt
        } else {
            self.character.image_scene().to_string()
        }
    }

    async fn render_image(&self, plan: &ResponsePlan<'_>) -> Result<MediaRef, ImageStepError> {
        let item = plan.target;
        let (images, storage) = match (&self.images, &self.storage) {
            (Some(images), Some(storage)) => (images, storage),
            _ => return Err(ImageStepError::Unavailable),
        };

        let prompt = match &plan.prompt_override {
            Some(prompt) => prompt.trim().to_string(),
            None => self.image_prompt(&item.text),
        };
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt.into());
        }

        let request = self.image_options.resolve(prompt);
        debug!(item_id = %item.id, prompt = %request.prompt, "Requesting image");
        let generated = images.generate(&request).await?;

        let bytes: Bytes = match generated.into_iter().next() {
            Some(GeneratedImage::Data(bytes)) => bytes,
            Some(GeneratedImage::Url(url)) => images.download(&url).await?,
            None => return Err(GenerationError::EmptyResult("image".to_string()).into()),
        };
        if bytes.is_empty() {
            return Err(GenerationError::EmptyResult("image".to_string()).into());
        }

        let filename = format!("{}-{}.png", item.id, Utc::now().timestamp_millis());
        let url = storage.upload(bytes, &filename).await?;
        info!(item_id = %item.id, url = %url, "Stored generated image");
        Ok(MediaRef { url })
    }

    async fn reply_text(&self, item: &Item, prefix: Option<&str>, max_chars: usize) -> String {
        let budget = match prefix {
            Some(prefix) => max_chars.saturating_sub(prefix.chars().count() + 1),
            None => max_chars,
        };

        let body = match &self.text {
            None => self.template_reply(item),
            Some(generator) => {
                let constraints = TextConstraints { max_chars: budget };
                match generator
                    .generate(&self.reply_context(item, budget), &constraints)
                    .await
                {
                    Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                    Ok(_) => {
                        warn!(item_id = %item.id, "Text generator returned nothing, using apology");
                        APOLOGY_TEXT.to_string()
                    }
                    Err(e) => {
                        warn!(item_id = %item.id, error = %e, "Text generation failed, using apology");
                        APOLOGY_TEXT.to_string()
                    }
                }
            }
        };

        let text = match prefix {
            Some(prefix) => format!("{} {}", prefix, truncate_chars(&body, budget)),
            None => body,
        };
        truncate_chars(&text, max_chars)
    }

    fn reply_context(&self, item: &Item, max_chars: usize) -> String {
        format!(
            "{}\n\nTask: Generate a reply in your voice, style and perspective to this post:\n\
            Author: @{}\n\
            Post: '{}'\n\
            Requirements:\n\
            - Stay under {} characters\n\
            - No hashtags\n\
            - Do not wrap the reply in quotes\n\
            Write only the reply text, nothing else:",
            self.character.prompt, item.author_handle, item.text, max_chars
        )
    }

    fn template_reply(&self, item: &Item) -> String {
        let template = self
            .character
            .fallback_reply
            .as_deref()
            .unwrap_or(DEFAULT_FALLBACK_REPLY);
        let author = if item.author_handle.is_empty() {
            "there"
        } else {
            item.author_handle.as_str()
        };
        let reply = template.replace("{author}", author);
        if reply.trim().is_empty() {
            APOLOGY_TEXT.to_string()
        } else {
            reply
        }
    }
}

/// Cuts to at most `max` chars, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(max - 1).collect();
    cut.push('…');
    cut
}
