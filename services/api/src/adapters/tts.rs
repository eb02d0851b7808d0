//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `TextToSpeechService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use speaking_coach_core::ports::{PortError, PortResult, TextToSpeechService};
use tracing::debug;

/// The built-in voices, all of which read English well.
pub const OPENAI_VOICES: [&str; 11] = [
    "alloy", "ash", "ballad", "coral", "echo", "fable", "onyx", "nova", "sage", "shimmer", "verse",
];

/// Maps a configured model name onto the client's enum, passing unknown names through.
pub fn speech_model(name: &str) -> SpeechModel {
    match name.trim().to_lowercase().as_str() {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        "gpt-4o-mini-tts" => SpeechModel::Gpt4oMiniTts,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn voice(name: &str) -> Voice {
    match name.trim().to_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "ash" => Voice::Ash,
        "ballad" => Voice::Ballad,
        "coral" => Voice::Coral,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "sage" => Voice::Sage,
        "shimmer" => Voice::Shimmer,
        "verse" => Voice::Verse,
        other => Voice::Other(other.to_string()),
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiTtsAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: SpeechModel,
}

impl OpenAiTtsAdapter {
    /// Creates a new `OpenAiTtsAdapter`. Without a client every call fails
    /// with a configuration error.
    pub fn new(client: Option<Client<OpenAIConfig>>, model: SpeechModel) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for OpenAiTtsAdapter {
    /// Generates a vector of audio data (`Vec<u8>`) from the given text.
    async fn generate_audio(&self, text: &str, voice_name: &str, speed: f32) -> PortResult<Vec<u8>> {
        let client = self.client.as_ref().ok_or_else(|| {
            PortError::Configuration("OPENAI_API_KEY is required for speech.".to_string())
        })?;

        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: voice(voice_name),
            speed: Some(speed),
            ..Default::default()
        };
        debug!(voice = voice_name, speed, chars = text.len(), "Synthesizing speech.");

        let response = client
            .audio()
            .speech()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Generation(e.to_string()))?;

        Ok(response.bytes.to_vec())
    }
}
