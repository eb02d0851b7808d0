//! crates/speaking_coach_core/src/session.rs
//!
//! The in-memory editing session and its transition rules.
//!
//! A `StudySession` owns the current draft (part, band, topic, idea), the generated
//! script with the user's personal edits, and the id of the stored record being
//! edited, if any. Generation is split into `begin_generation` / `finish_generation`
//! so a caller can release its lock on the session while the provider call is in
//! flight; at most one generation may be outstanding at a time.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{
    Band, GenerationResult, GenerationRequest, Highlight, Part, Record, RecordId, Scope,
    ValidationError,
};
use crate::ports::{PortError, PortResult, RecordStore, ScriptGenerationService};

//=========================================================================================
// Session Errors
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    /// A second generate was requested while the first is still outstanding.
    #[error("A generation request is already in progress")]
    GenerationInProgress,
    #[error(transparent)]
    Port(#[from] PortError),
}

//=========================================================================================
// Phases & Tickets
//=========================================================================================

/// The observable state of a session. Derived from the session's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No topic, no idea, no content.
    Empty,
    /// Topic or idea entered, nothing generated yet.
    Drafting,
    /// A generation call is outstanding.
    Generating,
    /// Content present, never saved.
    GeneratedUnsaved,
    /// Content present and identical to the stored record.
    GeneratedSaved,
    /// Content present, stored once, changed since the last save.
    EditingSaved,
}

/// Proof that a generation was started. Must be handed back to `finish_generation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTicket {
    serial: u64,
    request: GenerationRequest,
}

impl GenerationTicket {
    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }
}

/// What `finish_generation` did with a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Applied,
    /// The session was reset or switched records while the call was in flight.
    Discarded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Script {
    ai_script: String,
    personal_script: String,
    highlights: Vec<Highlight>,
}

//=========================================================================================
// StudySession
//=========================================================================================

/// One active editing context, bound to the scope its records live in.
#[derive(Debug, Clone)]
pub struct StudySession {
    scope: Scope,
    part: Part,
    band: Band,
    topic: String,
    idea: String,
    script: Option<Script>,
    record_id: Option<RecordId>,
    created_at: Option<DateTime<Utc>>,
    dirty: bool,
    pending: Option<u64>,
    next_serial: u64,
}

impl StudySession {
    /// Creates an empty session whose store operations run in `scope`.
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            part: Part::default(),
            band: Band::default(),
            topic: String::new(),
            idea: String::new(),
            script: None,
            record_id: None,
            created_at: None,
            dirty: false,
            pending: None,
            next_serial: 0,
        }
    }

    // --- Accessors ---

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn part(&self) -> Part {
        self.part
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn idea(&self) -> &str {
        &self.idea
    }

    pub fn ai_script(&self) -> Option<&str> {
        self.script.as_ref().map(|s| s.ai_script.as_str())
    }

    pub fn personal_script(&self) -> Option<&str> {
        self.script.as_ref().map(|s| s.personal_script.as_str())
    }

    pub fn highlights(&self) -> &[Highlight] {
        self.script.as_ref().map(|s| s.highlights.as_slice()).unwrap_or(&[])
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn is_generating(&self) -> bool {
        self.pending.is_some()
    }

    /// True when the session edits a stored record rather than a new topic.
    pub fn is_editing_saved_record(&self) -> bool {
        self.record_id.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.pending.is_some() {
            return SessionPhase::Generating;
        }
        match (&self.script, self.record_id) {
            (None, _) if self.topic.trim().is_empty() && self.idea.trim().is_empty() => {
                SessionPhase::Empty
            }
            (None, _) => SessionPhase::Drafting,
            (Some(_), None) => SessionPhase::GeneratedUnsaved,
            (Some(_), Some(_)) if self.dirty => SessionPhase::EditingSaved,
            (Some(_), Some(_)) => SessionPhase::GeneratedSaved,
        }
    }

    // --- Draft edits ---

    pub fn set_part(&mut self, part: Part) {
        if self.part != part {
            self.part = part;
            self.mark_metadata_changed();
        }
    }

    pub fn set_band(&mut self, band: Band) {
        if self.band != band {
            self.band = band;
            self.mark_metadata_changed();
        }
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        let topic = topic.into();
        if self.topic != topic {
            self.topic = topic;
            self.mark_metadata_changed();
        }
    }

    /// The idea is session-local; it is never stored and never dirties a record.
    pub fn set_idea(&mut self, idea: impl Into<String>) {
        self.idea = idea.into();
    }

    /// Replaces the user's own version of the script.
    pub fn edit_personal_script(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        let script = self
            .script
            .as_mut()
            .ok_or(SessionError::Validation(ValidationError::NoScript))?;
        let text = text.into();
        if script.personal_script != text {
            script.personal_script = text;
            if self.record_id.is_some() {
                self.dirty = true;
            }
        }
        Ok(())
    }

    fn mark_metadata_changed(&mut self) {
        if self.record_id.is_some() && self.script.is_some() {
            self.dirty = true;
        }
    }

    // --- Generation ---

    /// Validates the draft and moves the session to `Generating`.
    ///
    /// A first-time generation clears any previous unsaved content up front; a
    /// re-generation on a stored record keeps everything until the result arrives.
    pub fn begin_generation(&mut self) -> Result<GenerationTicket, SessionError> {
        if self.pending.is_some() {
            warn!("Rejecting generate: another generation is still outstanding.");
            return Err(SessionError::GenerationInProgress);
        }
        let request =
            GenerationRequest::new(self.part, self.band, self.topic.clone(), self.idea.clone())?;

        if self.record_id.is_none() {
            self.script = None;
        }
        self.next_serial += 1;
        self.pending = Some(self.next_serial);
        info!(
            part = %request.part,
            band = %request.band,
            regenerate = self.record_id.is_some(),
            "Generation started."
        );
        Ok(GenerationTicket {
            serial: self.next_serial,
            request,
        })
    }

    /// Folds the outcome of a generation call back into the session.
    ///
    /// Errors are always returned to the caller. A result whose ticket no longer
    /// matches (the session was reset or loaded meanwhile) leaves the session alone.
    pub fn finish_generation(
        &mut self,
        ticket: GenerationTicket,
        outcome: PortResult<GenerationResult>,
    ) -> Result<GenerationOutcome, SessionError> {
        if self.pending != Some(ticket.serial) {
            debug!(serial = ticket.serial, "Generation result no longer belongs to this session.");
            return match outcome {
                Ok(_) => Ok(GenerationOutcome::Discarded),
                Err(e) => Err(e.into()),
            };
        }
        self.pending = None;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!("Generation failed: {}", e);
                return Err(e.into());
            }
        };

        match (self.record_id, self.script.as_mut()) {
            (Some(_), Some(script)) => {
                script.ai_script = result.content;
                script.highlights = result.highlights;
                self.dirty = true;
            }
            _ => {
                self.script = Some(Script {
                    personal_script: result.content.clone(),
                    ai_script: result.content,
                    highlights: result.highlights,
                });
                if self.record_id.is_some() {
                    self.dirty = true;
                }
            }
        }
        info!(phase = ?self.phase(), "Generation applied.");
        Ok(GenerationOutcome::Applied)
    }

    /// Runs a full generation round trip while holding the session.
    pub async fn generate(
        &mut self,
        gateway: &dyn ScriptGenerationService,
    ) -> Result<GenerationOutcome, SessionError> {
        let ticket = self.begin_generation()?;
        let outcome = gateway.generate_script(ticket.request()).await;
        self.finish_generation(ticket, outcome)
    }

    // --- Persistence ---

    /// Saves the session: creates a record with a fresh id the first time, then
    /// updates the same id. Session state only changes once the store succeeded.
    pub async fn save(&mut self, store: &dyn RecordStore) -> Result<Record, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::GenerationInProgress);
        }
        let script = self
            .script
            .as_ref()
            .ok_or(SessionError::Validation(ValidationError::NothingToSave))?;
        if self.topic.trim().is_empty() {
            return Err(ValidationError::MissingTopic.into());
        }

        let now = Utc::now();
        let record = Record {
            id: self.record_id.unwrap_or_default(),
            owner: self.scope.owner().cloned(),
            created_at: self.created_at.unwrap_or(now),
            updated_at: now,
            part: self.part,
            topic: self.topic.clone(),
            band: self.band,
            ai_script: script.ai_script.clone(),
            personal_script: script.personal_script.clone(),
            highlights: script.highlights.clone(),
        };
        let is_update = self.record_id.is_some();

        let stored = store.upsert(&self.scope, record).await?;

        self.record_id = Some(stored.id);
        self.created_at = Some(stored.created_at);
        self.dirty = false;
        info!(record_id = %stored.id, is_update, "Session saved.");
        Ok(stored)
    }

    /// Replaces every stored field of the session with the record's values.
    /// The idea is not part of a record and is left as it is.
    pub fn load(&mut self, record: Record) {
        if self.pending.take().is_some() {
            debug!("Loading a record supersedes the outstanding generation.");
        }
        self.part = record.part;
        self.band = record.band;
        self.topic = record.topic;
        self.script = Some(Script {
            ai_script: record.ai_script,
            personal_script: record.personal_script,
            highlights: record.highlights,
        });
        self.record_id = Some(record.id);
        self.created_at = Some(record.created_at);
        self.dirty = false;
        info!(record_id = %record.id, "Record loaded into session.");
    }

    /// Looks the record up in the session's scope and loads it.
    pub async fn load_by_id(
        &mut self,
        store: &dyn RecordStore,
        id: RecordId,
    ) -> Result<(), SessionError> {
        let record = store
            .list(&self.scope)
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| PortError::NotFound(format!("Record {} not found", id)))?;
        self.load(record);
        Ok(())
    }

    /// Records visible to this session, most recent first.
    pub async fn list(&self, store: &dyn RecordStore) -> Result<Vec<Record>, SessionError> {
        Ok(store.list(&self.scope).await?)
    }

    /// Removes a stored record. Deleting the record being edited resets the session.
    pub async fn delete(&mut self, store: &dyn RecordStore, id: RecordId) -> Result<(), SessionError> {
        store.remove(&self.scope, id).await?;
        if self.record_id == Some(id) {
            info!(record_id = %id, "Deleted the active record; resetting session.");
            self.reset();
        }
        Ok(())
    }

    /// Back to `Empty`, discarding unsaved edits. Part and band are kept as the
    /// user's preferred settings.
    pub fn reset(&mut self) {
        self.topic.clear();
        self.idea.clear();
        self.script = None;
        self.record_id = None;
        self.created_at = None;
        self.dirty = false;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    //-------------------------------------------------------------------------------------
    // Fakes
    //-------------------------------------------------------------------------------------

    struct FakeGenerator {
        outcome: PortResult<GenerationResult>,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn answering(content: &str) -> Self {
            Self {
                outcome: Ok(GenerationResult {
                    content: content.to_string(),
                    highlights: vec![Highlight {
                        phrase: "broaden my horizons".to_string(),
                        cn_meaning: "开阔眼界".to_string(),
                        reusability_note: "可用于旅行、阅读类话题".to_string(),
                    }],
                }),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(error: PortError) -> Self {
            Self {
                outcome: Err(error),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ScriptGenerationService for FakeGenerator {
        async fn generate_script(&self, _request: &GenerationRequest) -> PortResult<GenerationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<Record>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        fn requires_identity(&self) -> bool {
            false
        }

        async fn list(&self, scope: &Scope) -> PortResult<Vec<Record>> {
            let mut records: Vec<Record> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.owner.as_ref() == scope.owner())
                .cloned()
                .collect();
            records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(records)
        }

        async fn upsert(&self, _scope: &Scope, record: Record) -> PortResult<Record> {
            if self.fail_writes {
                return Err(PortError::Store("connection reset".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => {
                    let created_at = existing.created_at;
                    *existing = Record { created_at, ..record };
                    Ok(existing.clone())
                }
                None => {
                    records.insert(0, record.clone());
                    Ok(record)
                }
            }
        }

        async fn remove(&self, _scope: &Scope, id: RecordId) -> PortResult<()> {
            self.records.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }
    }

    fn drafted_session() -> StudySession {
        let mut session = StudySession::new(Scope::Local);
        session.set_part(Part::Part2);
        session.set_band("7.5".parse().unwrap());
        session.set_topic("Describe a book you enjoyed");
        session.set_idea("科幻小说,改变了我对未来的看法");
        session
    }

    //-------------------------------------------------------------------------------------
    // Generation
    //-------------------------------------------------------------------------------------

    #[test]
    fn phases_follow_the_draft() {
        let mut session = StudySession::new(Scope::Local);
        assert_eq!(session.phase(), SessionPhase::Empty);
        session.set_topic("Hometown");
        assert_eq!(session.phase(), SessionPhase::Drafting);
    }

    #[tokio::test]
    async fn generate_without_input_is_rejected_before_calling_the_provider() {
        let generator = FakeGenerator::answering("unused");
        let mut session = StudySession::new(Scope::Local);
        session.set_topic("Hometown");

        let err = session.generate(&generator).await.unwrap_err();

        assert_eq!(err, SessionError::Validation(ValidationError::MissingIdea));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.phase(), SessionPhase::Drafting);
    }

    #[tokio::test]
    async fn first_generation_fills_both_scripts() {
        let generator = FakeGenerator::answering("I'd like to talk about a sci-fi novel.");
        let mut session = drafted_session();

        let outcome = session.generate(&generator).await.unwrap();

        assert_eq!(outcome, GenerationOutcome::Applied);
        assert_eq!(session.phase(), SessionPhase::GeneratedUnsaved);
        assert_eq!(session.ai_script(), Some("I'd like to talk about a sci-fi novel."));
        assert_eq!(session.personal_script(), session.ai_script());
        assert_eq!(session.highlights().len(), 1);
    }

    #[test]
    fn second_generate_while_outstanding_is_rejected() {
        let mut session = drafted_session();
        let first = session.begin_generation().unwrap();

        assert_eq!(session.begin_generation(), Err(SessionError::GenerationInProgress));
        assert_eq!(session.phase(), SessionPhase::Generating);

        let result = GenerationResult {
            content: "answer".to_string(),
            highlights: Vec::new(),
        };
        session.finish_generation(first, Ok(result)).unwrap();
        assert_eq!(session.phase(), SessionPhase::GeneratedUnsaved);
    }

    #[tokio::test]
    async fn failed_first_generation_leaves_no_content() {
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("old draft")).await.unwrap();

        let err = session
            .generate(&FakeGenerator::failing(PortError::Generation("quota".to_string())))
            .await
            .unwrap_err();

        assert_eq!(err, SessionError::Port(PortError::Generation("quota".to_string())));
        assert_eq!(session.ai_script(), None);
        assert_eq!(session.phase(), SessionPhase::Drafting);
    }

    #[tokio::test]
    async fn regeneration_on_a_saved_record_keeps_the_personal_script() {
        let store = MemoryStore::default();
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("first answer")).await.unwrap();
        session.edit_personal_script("my own words").unwrap();
        session.save(&store).await.unwrap();

        session.generate(&FakeGenerator::answering("second answer")).await.unwrap();

        assert_eq!(session.phase(), SessionPhase::EditingSaved);
        assert_eq!(session.ai_script(), Some("second answer"));
        assert_eq!(session.personal_script(), Some("my own words"));
    }

    #[tokio::test]
    async fn regeneration_keeps_unsaved_personal_edits_of_a_stored_record() {
        let store = MemoryStore::default();
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("first answer")).await.unwrap();
        let saved = session.save(&store).await.unwrap();
        session.edit_personal_script("unsaved words").unwrap();
        assert_eq!(session.phase(), SessionPhase::EditingSaved);

        session.generate(&FakeGenerator::answering("second answer")).await.unwrap();

        assert_eq!(session.phase(), SessionPhase::EditingSaved);
        assert_eq!(session.ai_script(), Some("second answer"));
        assert_eq!(session.personal_script(), Some("unsaved words"));
        assert_eq!(session.record_id(), Some(saved.id));
        assert_eq!(store.records.lock().unwrap()[0].ai_script, "first answer");
    }

    #[tokio::test]
    async fn failed_regeneration_keeps_saved_content() {
        let store = MemoryStore::default();
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("kept answer")).await.unwrap();
        session.save(&store).await.unwrap();

        let err = session
            .generate(&FakeGenerator::failing(PortError::Parse("not json".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Port(PortError::Parse(_))));
        assert_eq!(session.ai_script(), Some("kept answer"));
        assert_eq!(session.phase(), SessionPhase::GeneratedSaved);
    }

    #[test]
    fn result_arriving_after_reset_is_discarded() {
        let mut session = drafted_session();
        let ticket = session.begin_generation().unwrap();
        session.reset();

        let result = GenerationResult {
            content: "late".to_string(),
            highlights: Vec::new(),
        };
        let outcome = session.finish_generation(ticket, Ok(result)).unwrap();

        assert_eq!(outcome, GenerationOutcome::Discarded);
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(session.ai_script(), None);
    }

    //-------------------------------------------------------------------------------------
    // Persistence
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn save_then_load_round_trips_every_stored_field() {
        let store = MemoryStore::default();
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("model answer")).await.unwrap();
        session.edit_personal_script("edited answer").unwrap();
        let saved = session.save(&store).await.unwrap();

        let mut other = StudySession::new(Scope::Local);
        other.load_by_id(&store, saved.id).await.unwrap();

        assert_eq!(other.phase(), SessionPhase::GeneratedSaved);
        assert_eq!(other.topic(), "Describe a book you enjoyed");
        assert_eq!(other.part(), Part::Part2);
        assert_eq!(other.band().to_string(), "7.5");
        assert_eq!(other.ai_script(), Some("model answer"));
        assert_eq!(other.personal_script(), Some("edited answer"));
        assert_eq!(other.highlights(), session.highlights());
    }

    #[tokio::test]
    async fn saving_a_new_session_mints_an_id_listed_first() {
        let store = MemoryStore::default();
        let mut older = drafted_session();
        older.generate(&FakeGenerator::answering("older")).await.unwrap();
        older.save(&store).await.unwrap();

        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("newer")).await.unwrap();
        let saved = session.save(&store).await.unwrap();

        assert_eq!(session.phase(), SessionPhase::GeneratedSaved);
        assert_eq!(session.record_id(), Some(saved.id));
        let listed = session.list(&store).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, saved.id);
    }

    #[tokio::test]
    async fn saving_an_edited_record_updates_it_in_place() {
        let store = MemoryStore::default();
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("model answer")).await.unwrap();
        let saved = session.save(&store).await.unwrap();

        let mut editor = StudySession::new(Scope::Local);
        editor.load_by_id(&store, saved.id).await.unwrap();
        editor.edit_personal_script("rewritten").unwrap();
        assert_eq!(editor.phase(), SessionPhase::EditingSaved);
        editor.save(&store).await.unwrap();

        let listed = store.list(&Scope::Local).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, saved.id);
        assert_eq!(listed[0].ai_script, "model answer");
        assert_eq!(listed[0].personal_script, "rewritten");
        assert_eq!(listed[0].created_at, saved.created_at);
        assert_eq!(editor.phase(), SessionPhase::GeneratedSaved);
    }

    #[tokio::test]
    async fn failed_save_commits_nothing() {
        let store = MemoryStore {
            fail_writes: true,
            ..Default::default()
        };
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("answer")).await.unwrap();

        let err = session.save(&store).await.unwrap_err();

        assert!(matches!(err, SessionError::Port(PortError::Store(_))));
        assert_eq!(session.record_id(), None);
        assert_eq!(session.phase(), SessionPhase::GeneratedUnsaved);
    }

    #[tokio::test]
    async fn save_without_content_is_a_validation_error() {
        let store = MemoryStore::default();
        let mut session = drafted_session();

        let err = session.save(&store).await.unwrap_err();

        assert_eq!(err, SessionError::Validation(ValidationError::NothingToSave));
    }

    #[tokio::test]
    async fn owner_scope_is_stamped_on_saved_records() {
        let store = MemoryStore::default();
        let mut session = StudySession::new(Scope::Owner(UserId::new("user_42")));
        session.set_topic("Hometown");
        session.set_idea("小城市");
        session.generate(&FakeGenerator::answering("answer")).await.unwrap();

        let saved = session.save(&store).await.unwrap();

        assert_eq!(saved.owner, Some(UserId::new("user_42")));
    }

    #[tokio::test]
    async fn deleting_the_active_record_resets_the_session() {
        let store = MemoryStore::default();
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("answer")).await.unwrap();
        let saved = session.save(&store).await.unwrap();

        session.delete(&store, saved.id).await.unwrap();

        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(session.record_id(), None);
        assert!(store.list(&Scope::Local).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_another_record_leaves_the_session_alone() {
        let store = MemoryStore::default();
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("answer")).await.unwrap();
        session.save(&store).await.unwrap();
        session.edit_personal_script("unsaved edit").unwrap();

        session.delete(&store, RecordId::new()).await.unwrap();

        assert_eq!(session.phase(), SessionPhase::EditingSaved);
        assert_eq!(session.personal_script(), Some("unsaved edit"));
    }

    #[tokio::test]
    async fn load_keeps_the_idea_and_reset_clears_it() {
        let store = MemoryStore::default();
        let mut session = drafted_session();
        session.generate(&FakeGenerator::answering("answer")).await.unwrap();
        let saved = session.save(&store).await.unwrap();

        let mut other = StudySession::new(Scope::Local);
        other.set_idea("my next idea");
        other.load_by_id(&store, saved.id).await.unwrap();
        assert_eq!(other.idea(), "my next idea");

        other.reset();
        assert_eq!(other.phase(), SessionPhase::Empty);
        assert_eq!(other.idea(), "");
    }

    #[tokio::test]
    async fn loading_an_unknown_id_is_not_found() {
        let store = MemoryStore::default();
        let mut session = StudySession::new(Scope::Local);

        let err = session.load_by_id(&store, RecordId::new()).await.unwrap_err();

        assert!(matches!(err, SessionError::Port(PortError::NotFound(_))));
    }

    #[test]
    fn editing_without_a_script_is_rejected() {
        let mut session = drafted_session();
        assert_eq!(
            session.edit_personal_script("text"),
            Err(SessionError::Validation(ValidationError::NoScript))
        );
    }
}
