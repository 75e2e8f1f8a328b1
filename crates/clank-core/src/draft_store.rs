//! Durable per-chat drafts and named presets.
//!
//! Everything lives in one JSON document:
//!
//! ```json
//! { "version": 1, "users": { "<chat id>": { "updatedAt": "...", "draft": {...},
//!   "presets": { "<name>": { "token": {...}, "updatedAt": "..." } } } } }
//! ```
//!
//! Writes go to a temp file in the same directory and are renamed over the
//! store, so readers never see a partial document. A save whose normalized
//! draft equals the stored one does not touch the disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clank_proto::TokenDraft;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Schema version written to new documents.
pub const STORE_VERSION: u32 = 1;

/// Presets kept per chat.
pub const MAX_PRESETS: usize = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("draft store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode draft store: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("preset limit reached ({0} per chat)")]
    TooManyPresets(usize),
}

/// The on-disk document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    pub version: u32,
    pub users: BTreeMap<String, UserRecord>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            users: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserRecord {
    pub updated_at: Option<DateTime<Utc>>,
    pub draft: Option<TokenDraft>,
    pub presets: BTreeMap<String, PresetRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetRecord {
    pub token: TokenDraft,
    pub updated_at: DateTime<Utc>,
}

/// A preset as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetSummary {
    pub name: String,
    pub symbol: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// File-backed draft and preset storage.
#[derive(Debug)]
pub struct DraftStore {
    path: PathBuf,
    doc: StoreDocument,
    /// Bytes last read from or written to `path`.
    persisted: Option<Vec<u8>>,
    disk_writes: usize,
}

impl DraftStore {
    /// Opens the store at `path`. A missing file starts an empty store.
    ///
    /// An unreadable document is moved aside (`<name>.corrupt-<timestamp>`)
    /// rather than silently overwritten on the next save.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (doc, persisted) = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<StoreDocument>(&bytes) {
                Ok(doc) => (doc, Some(bytes)),
                Err(e) => {
                    let aside = corrupt_path(&path);
                    warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "Draft store unreadable, starting empty"
                    );
                    fs::rename(&path, &aside).map_err(|source| StoreError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    (StoreDocument::default(), None)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => (StoreDocument::default(), None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            doc,
            persisted,
            disk_writes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times this store has written to disk.
    pub fn disk_writes(&self) -> usize {
        self.disk_writes
    }

    /// Chat ids with a stored record.
    pub fn chat_ids(&self) -> Vec<i64> {
        self.doc
            .users
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect()
    }

    /// The stored draft for `chat_id`, normalized.
    pub fn get_draft(&self, chat_id: i64) -> Option<TokenDraft> {
        self.user(chat_id)
            .and_then(|u| u.draft.as_ref())
            .map(TokenDraft::normalized)
    }

    /// When the chat's record last changed.
    pub fn updated_at(&self, chat_id: i64) -> Option<DateTime<Utc>> {
        self.user(chat_id).and_then(|u| u.updated_at)
    }

    /// Stores `draft` for `chat_id`. Returns `false` when nothing changed.
    pub fn save_draft(&mut self, chat_id: i64, draft: &TokenDraft) -> Result<bool, StoreError> {
        let normalized = draft.normalized();
        if self.user(chat_id).and_then(|u| u.draft.as_ref()) == Some(&normalized) {
            debug!(chat_id, "Draft unchanged, skipping write");
            return Ok(false);
        }

        let mut doc = self.doc.clone();
        let user = user_entry(&mut doc, chat_id);
        user.draft = Some(normalized);
        user.updated_at = Some(Utc::now());
        self.commit(doc)
    }

    /// Drops the stored draft, keeping presets. Returns `false` if there was none.
    pub fn clear_draft(&mut self, chat_id: i64) -> Result<bool, StoreError> {
        if self.user(chat_id).and_then(|u| u.draft.as_ref()).is_none() {
            return Ok(false);
        }

        let mut doc = self.doc.clone();
        let key = chat_id.to_string();
        if let Some(user) = doc.users.get_mut(&key) {
            user.draft = None;
            if user.presets.is_empty() {
                doc.users.remove(&key);
            } else {
                user.updated_at = Some(Utc::now());
            }
        }
        self.commit(doc)
    }

    /// Saves `draft` as preset `name`, replacing any preset with the same
    /// name regardless of case.
    pub fn save_preset(
        &mut self,
        chat_id: i64,
        name: &str,
        draft: &TokenDraft,
    ) -> Result<(), StoreError> {
        let mut doc = self.doc.clone();
        let user = user_entry(&mut doc, chat_id);
        let existing = find_key(&user.presets, name);
        if existing.is_none() && user.presets.len() >= MAX_PRESETS {
            return Err(StoreError::TooManyPresets(MAX_PRESETS));
        }
        if let Some(key) = existing {
            user.presets.remove(&key);
        }

        let now = Utc::now();
        user.presets.insert(
            name.to_string(),
            PresetRecord {
                token: draft.normalized(),
                updated_at: now,
            },
        );
        user.updated_at = Some(now);
        self.commit(doc).map(|_| ())
    }

    /// Looks up a preset case-insensitively, returning its stored name and draft.
    pub fn load_preset(&self, chat_id: i64, name: &str) -> Option<(String, TokenDraft)> {
        let user = self.user(chat_id)?;
        let key = find_key(&user.presets, name)?;
        let record = user.presets.get(&key)?;
        Some((key, record.token.normalized()))
    }

    /// Deletes a preset case-insensitively. Returns the stored name if it existed.
    pub fn delete_preset(&mut self, chat_id: i64, name: &str) -> Result<Option<String>, StoreError> {
        let Some(key) = self.user(chat_id).and_then(|u| find_key(&u.presets, name)) else {
            return Ok(None);
        };

        let mut doc = self.doc.clone();
        let chat_key = chat_id.to_string();
        if let Some(user) = doc.users.get_mut(&chat_key) {
            user.presets.remove(&key);
            if user.presets.is_empty() && user.draft.is_none() {
                doc.users.remove(&chat_key);
            } else {
                user.updated_at = Some(Utc::now());
            }
        }
        self.commit(doc)?;
        Ok(Some(key))
    }

    /// Presets for `chat_id`, most recently updated first.
    pub fn list_presets(&self, chat_id: i64) -> Vec<PresetSummary> {
        let mut presets: Vec<PresetSummary> = self
            .user(chat_id)
            .map(|u| {
                u.presets
                    .iter()
                    .map(|(name, record)| PresetSummary {
                        name: name.clone(),
                        symbol: record.token.symbol.clone(),
                        updated_at: record.updated_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        presets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.name.cmp(&b.name)));
        presets
    }

    fn user(&self, chat_id: i64) -> Option<&UserRecord> {
        self.doc.users.get(&chat_id.to_string())
    }

    /// Writes `doc` and adopts it. On failure the store keeps the last
    /// document that reached disk, so the same change is retried in full.
    fn commit(&mut self, mut doc: StoreDocument) -> Result<bool, StoreError> {
        doc.version = STORE_VERSION;
        let mut bytes = serde_json::to_vec_pretty(&doc)?;
        bytes.push(b'\n');
        if self.persisted.as_deref() == Some(bytes.as_slice()) {
            self.doc = doc;
            return Ok(false);
        }

        self.write(&bytes)?;
        self.doc = doc;
        self.persisted = Some(bytes);
        self.disk_writes += 1;
        debug!(path = %self.path.display(), "Draft store written");
        Ok(true)
    }

    /// Atomically replaces the file with `bytes`.
    fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

fn user_entry(doc: &mut StoreDocument, chat_id: i64) -> &mut UserRecord {
    doc.users.entry(chat_id.to_string()).or_default()
}

fn find_key<V>(map: &BTreeMap<String, V>, name: &str) -> Option<String> {
    let wanted = name.trim().to_lowercase();
    map.keys().find(|k| k.to_lowercase() == wanted).cloned()
}

fn corrupt_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "drafts.json".to_string());
    path.with_file_name(format!("{name}.corrupt-{stamp}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clank_proto::{DraftContext, Fees};
    use tempfile::TempDir;

    fn sample_draft() -> TokenDraft {
        let mut draft = TokenDraft {
            name: Some(" Moon Cat ".to_string()),
            symbol: Some("MCAT".to_string()),
            image: Some("ipfs://bafkreiabc".to_string()),
            fees: Fees::new(100, 50),
            context: DraftContext::new("twitter", "1790000000000000000"),
            ..TokenDraft::default()
        };
        draft
            .socials
            .insert("x".to_string(), "https://x.com/mooncat".to_string());
        draft
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = DraftStore::open(dir.path().join("drafts.json")).unwrap();
        assert!(store.get_draft(1).is_none());
        assert_eq!(store.disk_writes(), 0);
    }

    #[test]
    fn test_draft_round_trip_is_normalized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drafts.json");
        let draft = sample_draft();

        let mut store = DraftStore::open(&path).unwrap();
        assert!(store.save_draft(42, &draft).unwrap());
        assert_eq!(store.get_draft(42), Some(draft.normalized()));

        let reopened = DraftStore::open(&path).unwrap();
        assert_eq!(reopened.get_draft(42), Some(draft.normalized()));
        assert!(reopened.updated_at(42).is_some());
    }

    #[test]
    fn test_identical_save_writes_once() {
        let dir = TempDir::new().unwrap();
        let mut store = DraftStore::open(dir.path().join("drafts.json")).unwrap();
        let draft = sample_draft();

        assert!(store.save_draft(7, &draft).unwrap());
        assert!(!store.save_draft(7, &draft).unwrap());
        // Differs only in whitespace, so normalizes to the same draft.
        let mut padded = draft.clone();
        padded.symbol = Some("  MCAT ".to_string());
        assert!(!store.save_draft(7, &padded).unwrap());

        assert_eq!(store.disk_writes(), 1);
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drafts.json");
        let mut store = DraftStore::open(&path).unwrap();
        store.save_draft(1, &sample_draft()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["version"], STORE_VERSION);
        assert_eq!(doc["users"]["1"]["draft"]["symbol"], "MCAT");
    }

    #[test]
    fn test_failed_write_is_retried_on_next_save() {
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("sub");
        let path = parent.join("drafts.json");
        let mut store = DraftStore::open(&path).unwrap();
        let draft = sample_draft();

        // A regular file where the directory should be makes the write fail.
        fs::write(&parent, "blocker").unwrap();
        assert!(matches!(
            store.save_draft(3, &draft),
            Err(StoreError::Io { .. })
        ));
        assert!(store.get_draft(3).is_none());
        assert_eq!(store.disk_writes(), 0);

        fs::remove_file(&parent).unwrap();
        assert!(store.save_draft(3, &draft).unwrap());
        assert_eq!(store.disk_writes(), 1);
        let reopened = DraftStore::open(&path).unwrap();
        assert_eq!(reopened.get_draft(3), Some(draft.normalized()));
    }

    #[test]
    fn test_failed_clear_keeps_the_draft() {
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("sub");
        let path = parent.join("drafts.json");
        let mut store = DraftStore::open(&path).unwrap();
        store.save_draft(3, &sample_draft()).unwrap();

        fs::remove_dir_all(&parent).unwrap();
        fs::write(&parent, "blocker").unwrap();
        assert!(store.clear_draft(3).is_err());
        assert!(store.get_draft(3).is_some());

        fs::remove_file(&parent).unwrap();
        assert!(store.clear_draft(3).unwrap());
        assert!(store.get_draft(3).is_none());
    }

    #[test]
    fn test_clear_draft_keeps_presets() {
        let dir = TempDir::new().unwrap();
        let mut store = DraftStore::open(dir.path().join("drafts.json")).unwrap();
        store.save_draft(5, &sample_draft()).unwrap();
        store.save_preset(5, "Cats", &sample_draft()).unwrap();

        assert!(store.clear_draft(5).unwrap());
        assert!(store.get_draft(5).is_none());
        assert!(store.load_preset(5, "cats").is_some());
        assert!(!store.clear_draft(5).unwrap());
    }

    #[test]
    fn test_clear_draft_drops_empty_record() {
        let dir = TempDir::new().unwrap();
        let mut store = DraftStore::open(dir.path().join("drafts.json")).unwrap();
        store.save_draft(5, &sample_draft()).unwrap();
        store.clear_draft(5).unwrap();
        assert!(store.chat_ids().is_empty());
    }

    #[test]
    fn test_presets_match_case_insensitively_and_keep_casing() {
        let dir = TempDir::new().unwrap();
        let mut store = DraftStore::open(dir.path().join("drafts.json")).unwrap();
        store.save_preset(9, "MoonCats", &sample_draft()).unwrap();

        let (name, draft) = store.load_preset(9, "mooncats").unwrap();
        assert_eq!(name, "MoonCats");
        assert_eq!(draft.symbol.as_deref(), Some("MCAT"));

        // Re-saving under another casing replaces rather than duplicates.
        store.save_preset(9, "MOONCATS", &TokenDraft::default()).unwrap();
        let presets = store.list_presets(9);
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].name, "MOONCATS");

        assert_eq!(
            store.delete_preset(9, "mooncats").unwrap().as_deref(),
            Some("MOONCATS")
        );
        assert!(store.list_presets(9).is_empty());
        assert!(store.delete_preset(9, "mooncats").unwrap().is_none());
    }

    #[test]
    fn test_preset_limit() {
        let dir = TempDir::new().unwrap();
        let mut store = DraftStore::open(dir.path().join("drafts.json")).unwrap();
        for i in 0..MAX_PRESETS {
            store
                .save_preset(1, &format!("p{i}"), &TokenDraft::default())
                .unwrap();
        }
        assert!(matches!(
            store.save_preset(1, "one-more", &TokenDraft::default()),
            Err(StoreError::TooManyPresets(MAX_PRESETS))
        ));
        // Overwriting an existing name is still allowed.
        assert!(store.save_preset(1, "P0", &TokenDraft::default()).is_ok());
    }

    #[test]
    fn test_presets_are_scoped_per_chat() {
        let dir = TempDir::new().unwrap();
        let mut store = DraftStore::open(dir.path().join("drafts.json")).unwrap();
        store.save_preset(1, "shared", &sample_draft()).unwrap();
        assert!(store.load_preset(2, "shared").is_none());
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drafts.json");
        fs::write(&path, "{ not json").unwrap();

        let store = DraftStore::open(&path).unwrap();
        assert!(store.chat_ids().is_empty());
        assert!(!path.exists());
        let moved = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(moved);
    }

    #[test]
    fn test_invalid_fees_on_disk_are_defaulted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drafts.json");
        fs::write(
            &path,
            r#"{"version":1,"users":{"3":{"draft":{"symbol":"X","fees":{"clankerFee":-1,"pairedFee":"nope"}},"presets":{}}}}"#,
        )
        .unwrap();

        let store = DraftStore::open(&path).unwrap();
        assert_eq!(store.get_draft(3).unwrap().fees, Fees::default());
    }
}
