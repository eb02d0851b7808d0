pub mod domain;
pub mod ports;
pub mod session;
pub mod speech;

pub use domain::{
    group_by_part, Band, GenerationRequest, GenerationResult, Highlight, Part, Record, RecordId,
    Scope, UserId, ValidationError,
};
pub use ports::{PortError, PortResult, RecordStore, ScriptGenerationService, TextToSpeechService};
pub use session::{GenerationOutcome, GenerationTicket, SessionError, SessionPhase, StudySession};
pub use speech::{SpeechEngine, SpeechPlaybackController, Utterance, UtteranceId, Voice};
