use std::time::Duration;

use async_trait::async_trait;
use rig::agent::Agent as RigAgent;
use rig::completion::Prompt;
use rig::providers::anthropic::completion::CompletionModel;
use rig::providers::anthropic::{self, CLAUDE_3_HAIKU};
use tracing::debug;

use crate::error::GenerationError;
use crate::providers::{TextConstraints, TextGenerator};

const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Persona-driven reply writer backed by an Anthropic agent.
pub struct RigTextGenerator {
    agent: RigAgent<CompletionModel>,
}

impl RigTextGenerator {
    pub fn new(anthropic_api_key: &str, prompt: &str) -> Self {
        let client = anthropic::ClientBuilder::new(anthropic_api_key).build();
        let temperature = 0.9;

        let agent = client
            .agent(CLAUDE_3_HAIKU)
            .preamble(prompt)
            .temperature(temperature)
            .max_tokens(1024)
            .build();
        RigTextGenerator { agent }
    }
}

#[async_trait]
impl TextGenerator for RigTextGenerator {
    async fn generate(
        &self,
        context: &str,
        constraints: &TextConstraints,
    ) -> Result<String, GenerationError> {
        debug!(max_chars = constraints.max_chars, "Prompting text generator");
        let failed = |reason: String| GenerationError::RequestFailed {
            provider: "anthropic".to_string(),
            reason,
        };
        let response = tokio::time::timeout(GENERATION_TIMEOUT, self.agent.prompt(context))
            .await
            .map_err(|_| failed(format!("no answer within {:?}", GENERATION_TIMEOUT)))?
            .map_err(|e| failed(e.to_string()))?;

        let text = response.trim().trim_matches('"').trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::EmptyResult("anthropic".to_string()));
        }
        Ok(text)
    }
}
