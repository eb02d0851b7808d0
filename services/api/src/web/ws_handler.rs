//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for the speech channel.
//! Each connection gets its own engine and playback controller; the scripts
//! it reads come from the caller's editing session.

use crate::web::{
    protocol::{ClientMessage, ScriptVariant, ServerMessage},
    speech_engine::{Outbound, StreamingSpeechEngine},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use speaking_coach_core::{
    domain::{Scope, ValidationError},
    speech::{SpeechPlaybackController, UtteranceId},
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, scope))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, scope: Scope) {
    info!(scope = ?scope, "Speech channel opened.");

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

    // --- 1. Writer Task ---
    // The only place that writes to the socket.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            let message = match outbound {
                Outbound::Message(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        error!("Failed to serialize server message: {}", e);
                        continue;
                    }
                },
                Outbound::Audio(audio) => Message::Binary(audio.into()),
            };
            if sender.send(message).await.is_err() {
                warn!("Client went away; stopping the writer.");
                break;
            }
        }
    });

    let engine = Arc::new(StreamingSpeechEngine::new(
        app_state.tts_adapter.clone(),
        app_state.speech.voices.clone(),
        outbound_tx.clone(),
    ));
    let controller = SpeechPlaybackController::new(engine.clone()).with_rate(app_state.speech.rate);

    // --- 2. Main Message Loop ---
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(
                        client_msg,
                        &app_state,
                        &scope,
                        &engine,
                        &controller,
                        &outbound_tx,
                    )
                    .await
                }
                Err(e) => {
                    warn!("Failed to deserialize client message: {}", e);
                    send_error(&outbound_tx, format!("Unrecognized message: {}", e));
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Speech channel receive error: {}", e);
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    controller.stop();
    writer.abort();
    info!("Speech channel closed.");
}

async fn handle_client_message(
    msg: ClientMessage,
    app_state: &Arc<AppState>,
    scope: &Scope,
    engine: &StreamingSpeechEngine,
    controller: &SpeechPlaybackController,
    outbound: &UnboundedSender<Outbound>,
) {
    match msg {
        ClientMessage::Speak { variant } | ClientMessage::Toggle { variant } => {
            let toggle = matches!(msg, ClientMessage::Toggle { .. });
            let Some(text) = script_text(app_state, scope, variant).await else {
                send_error(outbound, ValidationError::NoScript.to_string());
                return;
            };
            let started = if toggle {
                controller.toggle(&text)
            } else {
                controller.speak(&text)
            };
            info!(?variant, toggle, utterance = started.map(UtteranceId::as_u64), "Speech request handled.");
        }
        ClientMessage::Stop => controller.stop(),
        ClientMessage::PlaybackFinished { utterance_id } => {
            engine.playback_finished(UtteranceId::from_raw(utterance_id));
        }
    }
}

/// The requested script of the caller's session, if it has one.
async fn script_text(app_state: &AppState, scope: &Scope, variant: ScriptVariant) -> Option<String> {
    let session = app_state.sessions.session_for(scope).await;
    let session = session.lock().await;
    let text = match variant {
        ScriptVariant::Ai => session.ai_script(),
        ScriptVariant::Personal => session.personal_script(),
    };
    text.map(str::to_string)
}

fn send_error(outbound: &UnboundedSender<Outbound>, message: String) {
    let _ = outbound.send(Outbound::Message(ServerMessage::Error { message }));
}
