//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the script-generating LLM.
//! It implements the `ScriptGenerationService` port from the `core` crate against
//! any OpenAI-compatible chat-completions endpoint, in JSON mode.

const SYSTEM_INSTRUCTIONS: &str = "You are an expert IELTS speaking examiner and coach. You always reply with one raw JSON object and nothing else: no markdown, no code fences, no commentary.";

const USER_INPUT_TEMPLATE: &str = r#"Task 1: Write a Band {band} answer for IELTS Speaking {part}.
Topic: {topic}
Candidate's idea: {idea}
Requirements:
- Build the answer around the candidate's idea, even if the idea is written in Chinese.
- Sound like natural spoken English, not an essay.
- Use idiomatic collocations suitable for Band {band}.

Task 2: Pick 3-5 "magic phrases" (high-scoring collocations or idioms) from the answer you just wrote.
- The phrases must be generic enough to be reused for other topics.
- Give the Chinese meaning of each phrase.

Output format: return a JSON object with exactly these two fields:
{
  "content": "the full English spoken answer",
  "highlights": [
    {
      "phrase": "the English phrase",
      "cn_meaning": "Chinese meaning",
      "reusability": "a short tip, in Chinese, on where else to use it"
    }
  ]
}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use speaking_coach_core::{
    domain::{GenerationRequest, GenerationResult, Highlight},
    ports::{PortError, PortResult, ScriptGenerationService},
};
use tracing::{info, warn};

use crate::config::GenerationProvider;

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptPayload {
    content: String,
    highlights: Vec<HighlightPayload>,
}

#[derive(Deserialize)]
struct HighlightPayload {
    phrase: String,
    cn_meaning: String,
    reusability: String,
}

/// Fills the prompt template for one request.
pub fn build_user_input(request: &GenerationRequest) -> String {
    USER_INPUT_TEMPLATE
        .replace("{band}", &request.band.to_string())
        .replace("{part}", request.part.label())
        .replace("{topic}", request.topic.trim())
        .replace("{idea}", request.idea.trim())
}

/// Parses the provider's JSON answer. Any deviation from the agreed shape,
/// including an empty answer, is a `PortError::Parse`.
pub fn parse_script_payload(raw: &str) -> PortResult<GenerationResult> {
    let payload: ScriptPayload =
        serde_json::from_str(raw.trim()).map_err(|e| PortError::Parse(e.to_string()))?;

    if payload.content.trim().is_empty() {
        return Err(PortError::Parse("The answer text is empty.".to_string()));
    }

    Ok(GenerationResult {
        content: payload.content,
        highlights: payload
            .highlights
            .into_iter()
            .map(|h| Highlight {
                phrase: h.phrase,
                cn_meaning: h.cn_meaning,
                reusability_note: h.reusability,
            })
            .collect(),
    })
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ScriptGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiScriptAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiScriptAdapter {
    /// Creates a new `OpenAiScriptAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self {
            client: Some(client),
            model,
        }
    }

    /// Builds the adapter from the configured provider. Without one, every call
    /// fails with a configuration error instead of reaching the network.
    pub fn from_provider(provider: Option<GenerationProvider>, model: String) -> Self {
        let client = provider.map(|provider| {
            let mut openai_config = OpenAIConfig::new().with_api_key(provider.api_key);
            if let Some(api_base) = provider.api_base {
                openai_config = openai_config.with_api_base(api_base);
            }
            Client::with_config(openai_config)
        });
        Self { client, model }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

//=========================================================================================
// `ScriptGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ScriptGenerationService for OpenAiScriptAdapter {
    /// Generates a model answer and its reusable phrases for the request.
    async fn generate_script(&self, request: &GenerationRequest) -> PortResult<GenerationResult> {
        let client = self.client.as_ref().ok_or_else(|| {
            PortError::Configuration(
                "No generation API key is configured (set OPENAI_API_KEY or GEMINI_API_KEY)."
                    .to_string(),
            )
        })?;

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Generation(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(build_user_input(request))
                .build()
                .map_err(|e| PortError::Generation(e.to_string()))?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .response_format(ResponseFormat::JsonObject)
            .n(1)
            .build()
            .map_err(|e| PortError::Generation(e.to_string()))?;

        info!(model = %self.model, part = %request.part, band = %request.band, "Requesting script generation.");

        let response = client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e: OpenAIError| {
                warn!("Generation provider call failed: {}", e);
                PortError::Generation(e.to_string())
            })?;

        // Extract the text content from the first choice in the response.
        let raw = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Parse("The model returned no text content.".to_string())
            })?;

        parse_script_payload(&raw).inspect_err(|e| warn!("Unusable generation payload: {}", e))
    }
}
