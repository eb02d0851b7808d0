//! services/api/src/adapters/local_store.rs
//!
//! The device-local `RecordStore`: one JSON slot file holding the whole
//! collection, read whole and written whole on every change.
//!
//! The slot keeps the field names the browser build of this tool wrote to
//! local storage, so an exported `ielts_records` value can be dropped in as is.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use speaking_coach_core::{
    domain::{Band, Highlight, Part, Record, RecordId, Scope},
    ports::{PortError, PortResult, RecordStore},
};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

//=========================================================================================
// Slot Format
//=========================================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    id: String,
    /// Last update, epoch milliseconds.
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<i64>,
    part: String,
    topic: String,
    band: String,
    ai_script: String,
    personal_script: String,
    #[serde(default)]
    highlights: Vec<StoredHighlight>,
}

#[derive(Serialize, Deserialize)]
struct StoredHighlight {
    phrase: String,
    cn_meaning: String,
    #[serde(default)]
    reusability: String,
}

/// Old slots used `Date.now()` strings as ids; those map onto a stable UUID.
fn parse_slot_id(raw: &str) -> Option<RecordId> {
    raw.parse::<RecordId>()
        .ok()
        .or_else(|| raw.parse::<u128>().ok().map(|n| RecordId::from_uuid(Uuid::from_u128(n))))
}

fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

impl StoredRecord {
    fn from_domain(record: &Record) -> Self {
        Self {
            id: record.id.to_string(),
            timestamp: record.updated_at.timestamp_millis(),
            created_at: Some(record.created_at.timestamp_millis()),
            part: record.part.label().to_string(),
            topic: record.topic.clone(),
            band: record.band.to_string(),
            ai_script: record.ai_script.clone(),
            personal_script: record.personal_script.clone(),
            highlights: record
                .highlights
                .iter()
                .map(|h| StoredHighlight {
                    phrase: h.phrase.clone(),
                    cn_meaning: h.cn_meaning.clone(),
                    reusability: h.reusability_note.clone(),
                })
                .collect(),
        }
    }

    fn to_domain(&self) -> Result<Record, String> {
        let id = parse_slot_id(&self.id).ok_or_else(|| format!("bad id '{}'", self.id))?;
        let updated_at = millis_to_utc(self.timestamp)
            .ok_or_else(|| format!("bad timestamp {}", self.timestamp))?;
        let created_at = match self.created_at {
            Some(millis) => {
                millis_to_utc(millis).ok_or_else(|| format!("bad createdAt {}", millis))?
            }
            None => updated_at,
        };
        Ok(Record {
            id,
            owner: None,
            created_at,
            updated_at,
            part: self.part.parse::<Part>().map_err(|e| e.to_string())?,
            topic: self.topic.clone(),
            band: self.band.parse::<Band>().map_err(|e| e.to_string())?,
            ai_script: self.ai_script.clone(),
            personal_script: self.personal_script.clone(),
            highlights: self
                .highlights
                .iter()
                .map(|h| Highlight {
                    phrase: h.phrase.clone(),
                    cn_meaning: h.cn_meaning.clone(),
                    reusability_note: h.reusability.clone(),
                })
                .collect(),
        })
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct LocalFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the one slot.
    write_lock: Mutex<()>,
}

impl LocalFileStore {
    /// Opens (creating the directory if needed) the slot `<dir>/<key>.json`.
    pub async fn open(dir: &Path, key: &str) -> PortResult<Self> {
        fs::create_dir_all(dir).await.map_err(|e| {
            PortError::Store(format!(
                "Failed to create store directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        let path = dir.join(format!("{}.json", key));
        info!(path = %path.display(), "Local record store initialized");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_slot(&self) -> PortResult<Vec<StoredRecord>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PortError::Store(e.to_string())),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            PortError::Store(format!("Slot '{}' is corrupt: {}", self.path.display(), e))
        })
    }

    async fn write_slot(&self, records: &[StoredRecord]) -> PortResult<()> {
        let bytes = serde_json::to_vec(records).map_err(|e| PortError::Store(e.to_string()))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| PortError::Store(e.to_string()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| PortError::Store(e.to_string()))?;
        debug!(records = records.len(), "Slot rewritten.");
        Ok(())
    }
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for LocalFileStore {
    fn requires_identity(&self) -> bool {
        false
    }

    async fn list(&self, _scope: &Scope) -> PortResult<Vec<Record>> {
        let slot = self.read_slot().await?;
        let mut records: Vec<Record> = slot
            .iter()
            .filter_map(|stored| match stored.to_domain() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(id = %stored.id, "Skipping unreadable slot entry: {}", e);
                    None
                }
            })
            .collect();
        // Stable, so entries with equal timestamps keep their slot order.
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    async fn upsert(&self, _scope: &Scope, record: Record) -> PortResult<Record> {
        let _guard = self.write_lock.lock().await;
        let mut slot = self.read_slot().await?;

        let mut stored = StoredRecord::from_domain(&record);
        let existing = slot
            .iter()
            .position(|entry| parse_slot_id(&entry.id) == Some(record.id));
        match existing {
            Some(index) => {
                stored.created_at = slot[index]
                    .created_at
                    .or(Some(slot[index].timestamp))
                    .or(stored.created_at);
                slot[index] = stored;
                self.write_slot(&slot).await?;
                slot[index].to_domain().map_err(PortError::Store)
            }
            None => {
                slot.insert(0, stored);
                self.write_slot(&slot).await?;
                slot[0].to_domain().map_err(PortError::Store)
            }
        }
    }

    async fn remove(&self, _scope: &Scope, id: RecordId) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut slot = self.read_slot().await?;
        let before = slot.len();
        slot.retain(|entry| parse_slot_id(&entry.id) != Some(id));
        if slot.len() == before {
            debug!(record_id = %id, "Nothing to remove.");
        }
        self.write_slot(&slot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn record(topic: &str, minutes_ago: i64) -> Record {
        let at = Utc.timestamp_millis_opt(1_735_000_000_000).unwrap() - Duration::minutes(minutes_ago);
        Record {
            id: RecordId::new(),
            owner: None,
            created_at: at,
            updated_at: at,
            part: Part::Part2,
            topic: topic.to_string(),
            band: "7.5".parse().unwrap(),
            ai_script: "AI answer".to_string(),
            personal_script: "My answer".to_string(),
            highlights: vec![Highlight {
                phrase: "a blessing in disguise".to_string(),
                cn_meaning: "因祸得福".to_string(),
                reusability_note: "经历类话题".to_string(),
            }],
        }
    }

    async fn store(dir: &TempDir) -> LocalFileStore {
        LocalFileStore::open(dir.path(), "ielts_records").await.unwrap()
    }

    #[tokio::test]
    async fn empty_slot_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        assert!(store.list(&Scope::Local).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_most_recently_updated_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.upsert(&Scope::Local, record("older", 30)).await.unwrap();
        store.upsert(&Scope::Local, record("newer", 5)).await.unwrap();
        store.upsert(&Scope::Local, record("oldest", 60)).await.unwrap();

        let topics: Vec<String> = store
            .list(&Scope::Local)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.topic)
            .collect();
        assert_eq!(topics, vec!["newer", "older", "oldest"]);
    }

    #[tokio::test]
    async fn upsert_replaces_in_place_and_keeps_creation_time() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let original = store.upsert(&Scope::Local, record("topic", 60)).await.unwrap();

        let mut edited = original.clone();
        edited.personal_script = "Edited".to_string();
        edited.created_at = Utc::now();
        edited.updated_at = Utc::now();
        let stored = store.upsert(&Scope::Local, edited).await.unwrap();

        let all = store.list(&Scope::Local).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(stored.id, original.id);
        assert_eq!(stored.created_at, original.created_at);
        assert_eq!(all[0].personal_script, "Edited");
        assert_eq!(all[0].highlights, original.highlights);
    }

    #[tokio::test]
    async fn removing_an_unknown_id_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let kept = store.upsert(&Scope::Local, record("kept", 1)).await.unwrap();

        store.remove(&Scope::Local, RecordId::new()).await.unwrap();
        let gone = store.upsert(&Scope::Local, record("gone", 2)).await.unwrap();
        store.remove(&Scope::Local, gone.id).await.unwrap();

        let all = store.list(&Scope::Local).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, kept.id);
    }

    #[tokio::test]
    async fn reads_slots_written_by_the_browser_build() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let legacy = r#"[{
            "id": "1735000000000",
            "timestamp": 1735000000000,
            "part": "Part 1",
            "topic": "Hometown",
            "band": "7.0",
            "aiScript": "I grew up in a coastal city.",
            "highlights": [{"phrase": "off the beaten track", "cn_meaning": "人迹罕至", "reusability": "旅行"}],
            "personalScript": "I grew up by the sea."
        }]"#;
        std::fs::write(store.path(), legacy).unwrap();

        let all = store.list(&Scope::Local).await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].part, Part::Part1);
        assert_eq!(all[0].band.to_string(), "7.0");
        assert_eq!(all[0].created_at, all[0].updated_at);
        assert_eq!(all[0].highlights[0].reusability_note, "旅行");

        store.remove(&Scope::Local, all[0].id).await.unwrap();
        assert!(store.list(&Scope::Local).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_browser_compatible_field_names() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.upsert(&Scope::Local, record("topic", 0)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        let entry = &raw[0];

        assert_eq!(entry["part"], "Part 2");
        assert_eq!(entry["band"], "7.5");
        assert!(entry["aiScript"].is_string());
        assert!(entry["personalScript"].is_string());
        assert!(entry["timestamp"].is_i64());
        assert!(entry["createdAt"].is_i64());
        assert_eq!(entry["highlights"][0]["reusability"], "经历类话题");
    }

    #[tokio::test]
    async fn corrupt_slot_is_a_store_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.list(&Scope::Local).await, Err(PortError::Store(_))));
    }

    #[tokio::test]
    async fn concurrent_upserts_both_land() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let first = record("Hometown", 2);
        let second = record("A gift", 1);

        let (a, b) = tokio::join!(
            store.upsert(&Scope::Local, first.clone()),
            store.upsert(&Scope::Local, second.clone())
        );
        a.unwrap();
        b.unwrap();

        let listed = store.list(&Scope::Local).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|r| r.id == first.id));
        assert!(listed.iter().any(|r| r.id == second.id));
    }
}
