//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use speaking_coach_core::{
    domain::{group_by_part, Band, Highlight, Part, Record, RecordId, Scope, ValidationError},
    ports::PortError,
    session::{GenerationOutcome, SessionError, SessionPhase, StudySession},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_session_handler,
        update_draft_handler,
        edit_personal_script_handler,
        generate_handler,
        save_handler,
        reset_handler,
        list_records_handler,
        load_record_handler,
        delete_record_handler,
    ),
    components(
        schemas(
            SessionView,
            HighlightView,
            RecordView,
            PartGroupView,
            RecordListResponse,
            GenerateResponse,
            SaveResponse,
            DraftRequest,
            PersonalScriptRequest,
            ErrorBody
        )
    ),
    tags(
        (name = "Speaking Coach API", description = "Draft, generate, edit and store IELTS speaking answers.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The JSON body of every error response.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `parse_error`.
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HighlightView {
    pub phrase: String,
    pub cn_meaning: String,
    pub reusability: String,
}

impl From<&Highlight> for HighlightView {
    fn from(h: &Highlight) -> Self {
        Self {
            phrase: h.phrase.clone(),
            cn_meaning: h.cn_meaning.clone(),
            reusability: h.reusability_note.clone(),
        }
    }
}

/// A snapshot of the caller's editing session.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SessionView {
    /// One of `empty`, `drafting`, `generating`, `generated_unsaved`,
    /// `generated_saved`, `editing_saved`.
    pub phase: String,
    pub part: String,
    pub band: String,
    pub topic: String,
    pub idea: String,
    pub ai_script: Option<String>,
    pub personal_script: Option<String>,
    pub highlights: Vec<HighlightView>,
    pub record_id: Option<Uuid>,
    pub is_generating: bool,
    pub is_editing_saved_record: bool,
}

fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Empty => "empty",
        SessionPhase::Drafting => "drafting",
        SessionPhase::Generating => "generating",
        SessionPhase::GeneratedUnsaved => "generated_unsaved",
        SessionPhase::GeneratedSaved => "generated_saved",
        SessionPhase::EditingSaved => "editing_saved",
    }
}

impl From<&StudySession> for SessionView {
    fn from(session: &StudySession) -> Self {
        Self {
            phase: phase_label(session.phase()).to_string(),
            part: session.part().to_string(),
            band: session.band().to_string(),
            topic: session.topic().to_string(),
            idea: session.idea().to_string(),
            ai_script: session.ai_script().map(str::to_string),
            personal_script: session.personal_script().map(str::to_string),
            highlights: session.highlights().iter().map(HighlightView::from).collect(),
            record_id: session.record_id().map(|id| id.as_uuid()),
            is_generating: session.is_generating(),
            is_editing_saved_record: session.is_editing_saved_record(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RecordView {
    pub id: Uuid,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub part: String,
    pub topic: String,
    pub band: String,
    pub ai_script: String,
    pub personal_script: String,
    pub highlights: Vec<HighlightView>,
}

impl From<&Record> for RecordView {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.as_uuid(),
            owner: record.owner.as_ref().map(|o| o.as_str().to_string()),
            created_at: record.created_at,
            updated_at: record.updated_at,
            part: record.part.to_string(),
            topic: record.topic.clone(),
            band: record.band.to_string(),
            ai_script: record.ai_script.clone(),
            personal_script: record.personal_script.clone(),
            highlights: record.highlights.iter().map(HighlightView::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct PartGroupView {
    pub part: String,
    pub records: Vec<RecordView>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RecordListResponse {
    /// Most recently updated first.
    pub records: Vec<RecordView>,
    /// The same records grouped by part; empty parts are left out.
    pub groups: Vec<PartGroupView>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct GenerateResponse {
    /// `applied`, or `discarded` when the session moved on during the call.
    pub outcome: String,
    pub session: SessionView,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SaveResponse {
    pub record: RecordView,
    pub session: SessionView,
}

/// Any subset of the draft fields; absent fields are left unchanged.
#[derive(Serialize, Deserialize, ToSchema, Debug, Default)]
pub struct DraftRequest {
    /// "Part 1", "Part 2" or "Part 3".
    pub part: Option<String>,
    /// One of 6.0, 6.5, 7.0, 7.5, 8.0.
    pub band: Option<String>,
    pub topic: Option<String>,
    pub idea: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct PersonalScriptRequest {
    pub personal_script: String,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

pub type RestError = (StatusCode, Json<ErrorBody>);

/// Maps a session failure onto its HTTP status and error code.
pub fn rest_error(e: SessionError) -> RestError {
    let (status, code) = match &e {
        SessionError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        SessionError::GenerationInProgress => (StatusCode::CONFLICT, "generation_in_progress"),
        SessionError::Port(port) => match port {
            PortError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            PortError::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_error"),
            PortError::Parse(_) => (StatusCode::BAD_GATEWAY, "parse_error"),
            PortError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_error"),
            PortError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        },
    };
    if status.is_server_error() {
        error!(code, "Request failed: {}", e);
    } else {
        warn!(code, "Request rejected: {}", e);
    }
    (status, Json(ErrorBody::new(code, e.to_string())))
}

fn parse_record_id(raw: &str) -> Result<RecordId, RestError> {
    raw.parse::<RecordId>().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new(
                "validation_error",
                format!("'{}' is not a record id", raw),
            )),
        )
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Get the caller's editing session.
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "The current session", body = SessionView),
        (status = 401, description = "An identity is required", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Identity; required by the remote store."))
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
) -> Json<SessionView> {
    let session = app_state.sessions.session_for(&scope).await;
    let session = session.lock().await;
    Json(SessionView::from(&*session))
}

/// Update the draft: part, band, topic and idea.
#[utoipa::path(
    put,
    path = "/session/draft",
    request_body = DraftRequest,
    responses(
        (status = 200, description = "Draft updated", body = SessionView),
        (status = 400, description = "Unknown part or band", body = ErrorBody)
    )
)]
pub async fn update_draft_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Json(draft): Json<DraftRequest>,
) -> Result<Json<SessionView>, RestError> {
    // Parse everything first so a bad field changes nothing.
    let part = draft
        .part
        .as_deref()
        .map(str::parse::<Part>)
        .transpose()
        .map_err(|e| rest_error(e.into()))?;
    let band = draft
        .band
        .as_deref()
        .map(str::parse::<Band>)
        .transpose()
        .map_err(|e: ValidationError| rest_error(e.into()))?;

    let session = app_state.sessions.session_for(&scope).await;
    let mut session = session.lock().await;
    if let Some(part) = part {
        session.set_part(part);
    }
    if let Some(band) = band {
        session.set_band(band);
    }
    if let Some(topic) = draft.topic {
        session.set_topic(topic);
    }
    if let Some(idea) = draft.idea {
        session.set_idea(idea);
    }
    Ok(Json(SessionView::from(&*session)))
}

/// Replace the personal version of the script.
#[utoipa::path(
    put,
    path = "/session/personal-script",
    request_body = PersonalScriptRequest,
    responses(
        (status = 200, description = "Script updated", body = SessionView),
        (status = 400, description = "There is no script yet", body = ErrorBody)
    )
)]
pub async fn edit_personal_script_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Json(payload): Json<PersonalScriptRequest>,
) -> Result<Json<SessionView>, RestError> {
    let session = app_state.sessions.session_for(&scope).await;
    let mut session = session.lock().await;
    session
        .edit_personal_script(payload.personal_script)
        .map_err(rest_error)?;
    Ok(Json(SessionView::from(&*session)))
}

/// Generate (or re-generate) the model answer for the current draft.
#[utoipa::path(
    post,
    path = "/session/generate",
    responses(
        (status = 200, description = "Generation finished", body = GenerateResponse),
        (status = 400, description = "Topic or idea missing", body = ErrorBody),
        (status = 409, description = "A generation is already running", body = ErrorBody),
        (status = 500, description = "No generation credential configured", body = ErrorBody),
        (status = 502, description = "Provider failed or answered unusably", body = ErrorBody)
    )
)]
pub async fn generate_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
) -> Result<Json<GenerateResponse>, RestError> {
    let session = app_state.sessions.session_for(&scope).await;
    let ticket = session.lock().await.begin_generation().map_err(rest_error)?;

    // The provider call and the fold-back run in their own task: a client that
    // goes away mid-call must not leave the session stuck in `Generating`.
    // The session stays unlocked while the provider works.
    let generator = app_state.generator.clone();
    let task_session = session.clone();
    let generation = tokio::spawn(async move {
        let result = generator.generate_script(ticket.request()).await;
        let mut session = task_session.lock().await;
        let outcome = session.finish_generation(ticket, result)?;
        Ok::<_, SessionError>((outcome, SessionView::from(&*session)))
    });

    let (outcome, view) = generation
        .await
        .map_err(|e| {
            rest_error(SessionError::Port(PortError::Generation(format!(
                "Generation task failed: {}",
                e
            ))))
        })?
        .map_err(rest_error)?;
    let outcome = match outcome {
        GenerationOutcome::Applied => "applied",
        GenerationOutcome::Discarded => "discarded",
    };
    info!(outcome, "Generate request finished.");
    Ok(Json(GenerateResponse {
        outcome: outcome.to_string(),
        session: view,
    }))
}

/// Save the session as a new record, or update the record being edited.
#[utoipa::path(
    post,
    path = "/session/save",
    responses(
        (status = 200, description = "Saved", body = SaveResponse),
        (status = 400, description = "Nothing to save", body = ErrorBody),
        (status = 409, description = "A generation is still running", body = ErrorBody),
        (status = 503, description = "The store is unavailable", body = ErrorBody)
    )
)]
pub async fn save_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
) -> Result<Json<SaveResponse>, RestError> {
    let session = app_state.sessions.session_for(&scope).await;
    let mut session = session.lock().await;
    let record = session
        .save(app_state.store.as_ref())
        .await
        .map_err(rest_error)?;
    Ok(Json(SaveResponse {
        record: RecordView::from(&record),
        session: SessionView::from(&*session),
    }))
}

/// Start over with an empty session. Part and band are kept.
#[utoipa::path(
    post,
    path = "/session/reset",
    responses((status = 200, description = "Session reset", body = SessionView))
)]
pub async fn reset_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
) -> Json<SessionView> {
    let session = app_state.sessions.session_for(&scope).await;
    let mut session = session.lock().await;
    session.reset();
    Json(SessionView::from(&*session))
}

/// List the caller's records, flat and grouped by part.
#[utoipa::path(
    get,
    path = "/records",
    responses(
        (status = 200, description = "Stored records", body = RecordListResponse),
        (status = 503, description = "The store is unavailable", body = ErrorBody)
    )
)]
pub async fn list_records_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
) -> Result<Json<RecordListResponse>, RestError> {
    let session = app_state.sessions.session_for(&scope).await;
    let records = session
        .lock()
        .await
        .list(app_state.store.as_ref())
        .await
        .map_err(rest_error)?;

    let groups = group_by_part(&records)
        .into_iter()
        .map(|(part, records)| PartGroupView {
            part: part.to_string(),
            records: records.iter().map(RecordView::from).collect(),
        })
        .collect();
    Ok(Json(RecordListResponse {
        records: records.iter().map(RecordView::from).collect(),
        groups,
    }))
}

/// Load a stored record into the session for editing.
#[utoipa::path(
    post,
    path = "/records/{id}/load",
    params(("id" = Uuid, Path, description = "The record to load.")),
    responses(
        (status = 200, description = "Record loaded", body = SessionView),
        (status = 404, description = "No such record", body = ErrorBody)
    )
)]
pub async fn load_record_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, RestError> {
    let id = parse_record_id(&id)?;
    let session = app_state.sessions.session_for(&scope).await;
    let mut session = session.lock().await;
    session
        .load_by_id(app_state.store.as_ref(), id)
        .await
        .map_err(rest_error)?;
    Ok(Json(SessionView::from(&*session)))
}

/// Delete a record. Deleting an unknown id succeeds.
#[utoipa::path(
    delete,
    path = "/records/{id}",
    params(("id" = Uuid, Path, description = "The record to delete.")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 503, description = "The store is unavailable", body = ErrorBody)
    )
)]
pub async fn delete_record_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Path(id): Path<String>,
) -> Result<StatusCode, RestError> {
    let id = parse_record_id(&id)?;
    let session = app_state.sessions.session_for(&scope).await;
    let mut session = session.lock().await;
    session
        .delete(app_state.store.as_ref(), id)
        .await
        .map_err(rest_error)?;
    Ok(StatusCode::NO_CONTENT)
}
