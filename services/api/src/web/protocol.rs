//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol of the speech channel.

use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Which of the session's two scripts to read aloud.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptVariant {
    Ai,
    Personal,
}

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Read a script aloud, replacing whatever is playing.
    Speak { variant: ScriptVariant },

    /// Stop if something is playing, otherwise read the script.
    Toggle { variant: ScriptVariant },

    /// Stop playback immediately.
    Stop,

    /// The client finished playing the audio of an utterance.
    PlaybackFinished { utterance_id: u64 },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================
// NOTE: The synthesized audio is sent as one raw Binary frame after `SpeechStarted`.
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Audio for this utterance follows.
    SpeechStarted { utterance_id: u64, voice: String },

    /// The utterance played to the end.
    SpeechEnded { utterance_id: u64 },

    /// Playback was cancelled; the client should silence any audio it holds.
    SpeechStopped,

    /// Reports an error to the client, which should display it.
    Error { message: String },
}
