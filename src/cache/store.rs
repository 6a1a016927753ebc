//! Disk-backed generation stores
//!
//! Each generation lives in its own directory under `<root>/stores/`, named by
//! the hex encoding of its id. Entries are keyed by the SHA-256 of their
//! locator and kept as a JSON metadata file next to the raw body bytes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::lifecycle::GenerationId;
use crate::network::Response;

const STORES_DIR: &str = "stores";
const ENTRIES_DIR: &str = "entries";
const RECORD_FILE: &str = "generation.json";
const ACTIVE_FILE: &str = "active.json";

/// Errors raised by the on-disk store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt metadata at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Generation store not found: {0}")]
    MissingGeneration(GenerationId),
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Whether a generation finished installing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    /// Install in progress, or abandoned partway
    Building,
    /// Every manifest entry is stored
    Complete,
}

/// Metadata describing one generation store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: GenerationId,
    pub manifest: Vec<String>,
    pub state: GenerationState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A response replayed from a generation store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub locator: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// When the entry was first written
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    pub fn into_response(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Entry metadata as written to disk; the body lives in a sibling file
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    locator: String,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: DateTime<Utc>,
}

/// Pointer to the generation that was last activated
#[derive(Debug, Serialize, Deserialize)]
struct ActivePointer {
    generation: GenerationId,
    activated_at: DateTime<Utc>,
}

/// Reads and writes generation stores below a root directory
///
/// The default root is XDG-compliant (`~/.cache/carimbo/` on Linux).
#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    /// Creates storage in the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "carimbo")?;
        Some(Self {
            root: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates storage rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stores_dir(&self) -> PathBuf {
        self.root.join(STORES_DIR)
    }

    fn store_dir(&self, generation: &GenerationId) -> PathBuf {
        self.stores_dir().join(hex::encode(generation.as_str()))
    }

    fn record_path(&self, generation: &GenerationId) -> PathBuf {
        self.store_dir(generation).join(RECORD_FILE)
    }

    /// Returns the (metadata, body) paths for an entry
    fn entry_paths(&self, generation: &GenerationId, locator: &str) -> (PathBuf, PathBuf) {
        let key = hex::encode(Sha256::digest(locator.as_bytes()));
        let dir = self.store_dir(generation).join(ENTRIES_DIR);
        (
            dir.join(format!("{}.json", key)),
            dir.join(format!("{}.body", key)),
        )
    }

    /// Opens the store for `generation`, creating it if absent
    ///
    /// A store that already completed keeps its `Complete` record; anything else
    /// is (re)marked `Building` with the given manifest.
    pub fn create_generation(
        &self,
        generation: &GenerationId,
        manifest: &[String],
    ) -> Result<(), StorageError> {
        let entries_dir = self.store_dir(generation).join(ENTRIES_DIR);
        fs::create_dir_all(&entries_dir).map_err(|e| StorageError::io(&entries_dir, e))?;

        let existing = self.record(generation)?;
        if let Some(record) = &existing {
            if record.state == GenerationState::Complete {
                debug!(generation = %generation, "store already complete, record left untouched");
                return Ok(());
            }
        }

        let record = GenerationRecord {
            id: generation.clone(),
            manifest: manifest.to_vec(),
            state: GenerationState::Building,
            created_at: existing.map(|r| r.created_at).unwrap_or_else(Utc::now),
            completed_at: None,
        };
        write_json(&self.record_path(generation), &record)
    }

    /// Marks a generation as fully installed
    pub fn mark_complete(&self, generation: &GenerationId) -> Result<(), StorageError> {
        let mut record = self
            .record(generation)?
            .ok_or_else(|| StorageError::MissingGeneration(generation.clone()))?;
        if record.state == GenerationState::Complete {
            return Ok(());
        }
        record.state = GenerationState::Complete;
        record.completed_at = Some(Utc::now());
        write_json(&self.record_path(generation), &record)
    }

    /// Reads a generation's record, `None` if the store does not exist
    pub fn record(&self, generation: &GenerationId) -> Result<Option<GenerationRecord>, StorageError> {
        read_json(&self.record_path(generation))
    }

    pub fn is_complete(&self, generation: &GenerationId) -> bool {
        matches!(
            self.record(generation),
            Ok(Some(GenerationRecord {
                state: GenerationState::Complete,
                ..
            }))
        )
    }

    /// Stores a response under `locator`
    ///
    /// Writing the same status, headers and body again leaves the existing
    /// entry untouched, so repeated installs are byte-identical.
    pub fn put(
        &self,
        generation: &GenerationId,
        locator: &str,
        response: &Response,
    ) -> Result<(), StorageError> {
        if !self.store_dir(generation).exists() {
            return Err(StorageError::MissingGeneration(generation.clone()));
        }

        let existing = self.get(generation, locator)?;
        if let Some(existing) = &existing {
            if existing.status == response.status
                && existing.headers == response.headers
                && existing.body == response.body
            {
                return Ok(());
            }
        }

        // The metadata file is what makes an entry visible, so it goes last.
        let (meta_path, body_path) = self.entry_paths(generation, locator);
        write_atomic(&body_path, &response.body)?;
        let meta = EntryMeta {
            locator: locator.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            stored_at: Utc::now(),
        };
        if let Err(err) = write_json(&meta_path, &meta) {
            let rollback = match &existing {
                Some(previous) => write_atomic(&body_path, &previous.body),
                None => fs::remove_file(&body_path).map_err(|e| StorageError::io(&body_path, e)),
            };
            if let Err(rollback_err) = rollback {
                warn!(locator, error = %rollback_err, "could not roll back entry body");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Reads the entry stored under exactly `locator`
    pub fn get(
        &self,
        generation: &GenerationId,
        locator: &str,
    ) -> Result<Option<StoredResponse>, StorageError> {
        let (meta_path, body_path) = self.entry_paths(generation, locator);
        let meta: EntryMeta = match read_json(&meta_path)? {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let body = match fs::read(&body_path) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&body_path, e)),
        };

        Ok(Some(StoredResponse {
            locator: meta.locator,
            status: meta.status,
            headers: meta.headers,
            body,
            stored_at: meta.stored_at,
        }))
    }

    /// Number of entries currently held by a generation store
    pub fn entry_count(&self, generation: &GenerationId) -> usize {
        let dir = self.store_dir(generation).join(ENTRIES_DIR);
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Lists every generation that has a store on disk, sorted by id
    pub fn generations(&self) -> Result<Vec<GenerationId>, StorageError> {
        let dir = self.stores_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&dir, e)),
        };

        let mut generations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&dir, e))?;
            let name = entry.file_name();
            let decoded = name
                .to_str()
                .and_then(|name| hex::decode(name).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            match decoded {
                Some(id) => generations.push(GenerationId::new(id)),
                None => debug!(entry = ?name, "ignoring foreign entry in stores directory"),
            }
        }
        generations.sort();
        Ok(generations)
    }

    /// Removes a whole generation store; a missing store is not an error
    pub fn delete_generation(&self, generation: &GenerationId) -> Result<(), StorageError> {
        let dir = self.store_dir(generation);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&dir, e)),
        }
    }

    /// Reads the last activated generation
    pub fn read_active(&self) -> Result<Option<GenerationId>, StorageError> {
        let pointer: Option<ActivePointer> = read_json(&self.root.join(ACTIVE_FILE))?;
        Ok(pointer.map(|p| p.generation))
    }

    /// Persists `generation` as the active one
    pub fn write_active(&self, generation: &GenerationId) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        let pointer = ActivePointer {
            generation: generation.clone(),
            activated_at: Utc::now(),
        };
        write_json(&self.root.join(ACTIVE_FILE), &pointer)
    }
}

/// Writes via a temp file + rename so readers never see a torn file
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| StorageError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &json)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}
