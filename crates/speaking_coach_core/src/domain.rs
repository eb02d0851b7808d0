//! crates/speaking_coach_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage backend or wire format;
//! adapters translate field names and casing at their own boundary.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Validation Errors
//=========================================================================================

/// Raised locally when an action is missing required input. No network call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("A topic is required")]
    MissingTopic,
    #[error("An idea is required")]
    MissingIdea,
    #[error("There is no generated content to save")]
    NothingToSave,
    #[error("There is no script yet")]
    NoScript,
    #[error("Unsupported band score: {0}")]
    InvalidBand(String),
    #[error("Unknown speaking part: {0}")]
    InvalidPart(String),
}

//=========================================================================================
// Exam Parameters
//=========================================================================================

/// The three sections of the speaking exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Part {
    #[default]
    Part1,
    Part2,
    Part3,
}

impl Part {
    pub const ALL: [Part; 3] = [Part::Part1, Part::Part2, Part::Part3];

    /// The human label, e.g. "Part 2".
    pub fn label(self) -> &'static str {
        match self {
            Part::Part1 => "Part 1",
            Part::Part2 => "Part 2",
            Part::Part3 => "Part 3",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Part {
    type Err = ValidationError;

    /// Accepts "Part 1", "part1", "PART_1" or a bare "1".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        let digit = compact.strip_prefix("part").unwrap_or(&compact);
        match digit {
            "1" => Ok(Part::Part1),
            "2" => Ok(Part::Part2),
            "3" => Ok(Part::Part3),
            _ => Err(ValidationError::InvalidPart(s.to_string())),
        }
    }
}

/// A target band score from the fixed set the generator is asked to write for.
///
/// Stored as tenths of a point so equality is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Band(u8);

impl Band {
    pub const ALLOWED: [Band; 5] = [Band(60), Band(65), Band(70), Band(75), Band(80)];

    pub fn tenths(self) -> u8 {
        self.0
    }

    pub fn as_f32(self) -> f32 {
        f32::from(self.0) / 10.0
    }
}

impl Default for Band {
    fn default() -> Self {
        Band(70)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl TryFrom<f32> for Band {
    type Error = ValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        let scaled = value * 10.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-3 {
            return Err(ValidationError::InvalidBand(value.to_string()));
        }
        Band::ALLOWED
            .into_iter()
            .find(|band| f32::from(band.0) == rounded)
            .ok_or_else(|| ValidationError::InvalidBand(value.to_string()))
    }
}

impl FromStr for Band {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<f32>()
            .map_err(|_| ValidationError::InvalidBand(s.to_string()))?;
        Band::try_from(value).map_err(|_| ValidationError::InvalidBand(s.to_string()))
    }
}

//=========================================================================================
// Generation
//=========================================================================================

/// A reusable high-scoring phrase picked out of a generated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub phrase: String,
    pub cn_meaning: String,
    pub reusability_note: String,
}

/// The input of one generation call. Constructed per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub part: Part,
    pub band: Band,
    pub topic: String,
    pub idea: String,
}

impl GenerationRequest {
    /// Builds a request, rejecting a blank topic or idea.
    pub fn new(
        part: Part,
        band: Band,
        topic: impl Into<String>,
        idea: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let topic = topic.into();
        let idea = idea.into();
        if topic.trim().is_empty() {
            return Err(ValidationError::MissingTopic);
        }
        if idea.trim().is_empty() {
            return Err(ValidationError::MissingIdea);
        }
        Ok(Self {
            part,
            band,
            topic,
            idea,
        })
    }
}

/// The generator's answer. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub content: String,
    pub highlights: Vec<Highlight>,
}

//=========================================================================================
// Records & Identity
//=========================================================================================

/// Opaque, stable identifier of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Mints a fresh id for a record that has never been stored.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The opaque identity handed to us by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which records a store operation may see.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every record on this device; records carry no owner.
    Local,
    /// Only the records owned by this identity.
    Owner(UserId),
}

impl Scope {
    pub fn owner(&self) -> Option<&UserId> {
        match self {
            Scope::Local => None,
            Scope::Owner(user_id) => Some(user_id),
        }
    }
}

/// The persisted unit: one practised topic with its scripts and phrases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub owner: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub part: Part,
    pub topic: String,
    pub band: Band,
    pub ai_script: String,
    pub personal_script: String,
    pub highlights: Vec<Highlight>,
}

/// Groups records by part for the sidebar, keeping the incoming order inside
/// each group. Parts with no records are left out.
pub fn group_by_part(records: &[Record]) -> Vec<(Part, Vec<Record>)> {
    Part::ALL
        .into_iter()
        .filter_map(|part| {
            let in_part: Vec<Record> = records.iter().filter(|r| r.part == part).cloned().collect();
            (!in_part.is_empty()).then_some((part, in_part))
        })
        .collect()
}
