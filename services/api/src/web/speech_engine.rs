//! services/api/src/web/speech_engine.rs
//!
//! A `SpeechEngine` that synthesizes each utterance with the TTS adapter and
//! streams the audio down a WebSocket connection.
//!
//! The browser plays the audio; it reports the end of playback with a
//! `playback_finished` message, which is what completes the utterance.

use speaking_coach_core::{
    ports::TextToSpeechService,
    speech::{CompletionHandle, SpeechEngine, Utterance, UtteranceId, Voice},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::web::protocol::ServerMessage;

/// Everything the connection's writer task sends to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Audio(Vec<u8>),
}

/// The OpenAI voices as engine voices, `preferred` first. With an HD model
/// every voice carries the quality marker in its name.
pub fn openai_voice_catalogue(voice_ids: &[&str], preferred: &str, hd: bool) -> Vec<Voice> {
    let preferred = preferred.trim().to_lowercase();
    let mut ids: Vec<String> = voice_ids.iter().map(|id| id.to_string()).collect();
    match ids.iter().position(|id| *id == preferred) {
        Some(index) => {
            let id = ids.remove(index);
            ids.insert(0, id);
        }
        None if !preferred.is_empty() => ids.insert(0, preferred),
        None => {}
    }

    ids.into_iter()
        .map(|id| {
            let mut display: String = id.chars().take(1).flat_map(char::to_uppercase).collect();
            display.extend(id.chars().skip(1));
            Voice {
                name: if hd {
                    format!("OpenAI {} (HD)", display)
                } else {
                    format!("OpenAI {}", display)
                },
                id,
                locale: "en-US".to_string(),
            }
        })
        .collect()
}

#[derive(Default)]
struct EngineState {
    /// Cancels the synthesis task of the utterance being prepared or played.
    token: Option<CancellationToken>,
    /// Utterances whose audio was sent and whose playback the client has not finished.
    awaiting_playback: HashMap<UtteranceId, CompletionHandle>,
}

/// One per WebSocket connection.
pub struct StreamingSpeechEngine {
    tts: Arc<dyn TextToSpeechService>,
    voices: Vec<Voice>,
    outbound: UnboundedSender<Outbound>,
    state: Arc<Mutex<EngineState>>,
}

fn lock(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StreamingSpeechEngine {
    pub fn new(
        tts: Arc<dyn TextToSpeechService>,
        voices: Vec<Voice>,
        outbound: UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            tts,
            voices,
            outbound,
            state: Arc::new(Mutex::new(EngineState::default())),
        }
    }

    /// The client finished playing `id`. Unknown or stale ids are ignored.
    pub fn playback_finished(&self, id: UtteranceId) {
        let handle = lock(&self.state).awaiting_playback.remove(&id);
        match handle {
            Some(handle) => {
                handle.complete();
                let _ = self.outbound.send(Outbound::Message(ServerMessage::SpeechEnded {
                    utterance_id: id.as_u64(),
                }));
                debug!(utterance = id.as_u64(), "Client finished playback.");
            }
            None => debug!(utterance = id.as_u64(), "Ignoring playback report for an inactive utterance."),
        }
    }
}

impl SpeechEngine for StreamingSpeechEngine {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance) {
        let token = CancellationToken::new();
        lock(&self.state).token = Some(token.clone());

        let tts = self.tts.clone();
        let outbound = self.outbound.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            let id = utterance.id;
            let synthesis = tts.generate_audio(&utterance.text, &utterance.voice.id, utterance.rate);
            let audio = tokio::select! {
                _ = token.cancelled() => {
                    debug!(utterance = id.as_u64(), "Synthesis cancelled.");
                    return;
                }
                audio = synthesis => audio,
            };

            let audio = match audio {
                Ok(audio) => audio,
                Err(e) => {
                    error!(utterance = id.as_u64(), "Speech synthesis failed: {}", e);
                    if !token.is_cancelled() {
                        utterance.completion.complete();
                        let _ = outbound.send(Outbound::Message(ServerMessage::Error {
                            message: format!("Speech synthesis failed: {}", e),
                        }));
                    }
                    return;
                }
            };

            // Registering under the lock keeps a concurrent cancel from slipping in
            // between the check and the send.
            let mut guard = lock(&state);
            if token.is_cancelled() {
                return;
            }
            guard
                .awaiting_playback
                .insert(id, utterance.completion.clone());
            let started = outbound.send(Outbound::Message(ServerMessage::SpeechStarted {
                utterance_id: id.as_u64(),
                voice: utterance.voice.name.clone(),
            }));
            if started.is_err() || outbound.send(Outbound::Audio(audio)).is_err() {
                warn!(utterance = id.as_u64(), "Connection closed before audio could be sent.");
                guard.awaiting_playback.remove(&id);
                drop(guard);
                utterance.completion.complete();
                return;
            }
            info!(utterance = id.as_u64(), "Utterance audio sent.");
        });
    }

    fn cancel(&self) {
        {
            // Cancelled under the lock, so a synthesis task that finishes now
            // either registered before the clear or sees the cancellation.
            let mut state = lock(&self.state);
            if let Some(token) = state.token.take() {
                token.cancel();
            }
            state.awaiting_playback.clear();
        }
        let _ = self.outbound.send(Outbound::Message(ServerMessage::SpeechStopped));
    }
}
