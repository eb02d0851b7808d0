//! crates/speaking_coach_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the text-generation provider, the persistence backend and
//! the speech synthesizer.

use async_trait::async_trait;
use crate::domain::{GenerationRequest, GenerationResult, Record, RecordId, Scope};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// A required credential or setting is missing. Raised before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The generation provider call failed; carries the provider's message.
    #[error("Generation failed: {0}")]
    Generation(String),
    /// The provider answered, but not in the agreed shape.
    #[error("Could not parse the generated response: {0}")]
    Parse(String),
    /// A persistence call failed. Nothing was committed.
    #[error("Store error: {0}")]
    Store(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ScriptGenerationService: Send + Sync {
    /// Asks the text-generation provider for a model answer and its reusable phrases.
    ///
    /// Fails with `Configuration`, `Generation` or `Parse`. Never retried.
    async fn generate_script(&self, request: &GenerationRequest) -> PortResult<GenerationResult>;
}

/// One CRUD contract shared by the device-local and the remote multi-tenant backend.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether operations need an `Owner` scope. Remote backends return `true`.
    fn requires_identity(&self) -> bool;

    /// Records visible in `scope`, most recently updated first.
    async fn list(&self, scope: &Scope) -> PortResult<Vec<Record>>;

    /// Replaces the record with the same id in place, or inserts it as new.
    /// The returned record carries the stored timestamps.
    async fn upsert(&self, scope: &Scope, record: Record) -> PortResult<Record>;

    /// Deletes a record. Removing an unknown id succeeds.
    async fn remove(&self, scope: &Scope, id: RecordId) -> PortResult<()>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text using the named voice.
    async fn generate_audio(&self, text: &str, voice: &str, speed: f32) -> PortResult<Vec<u8>>;
}
