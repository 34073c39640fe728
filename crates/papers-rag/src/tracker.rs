use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A single paper (a markdown file or one listing row).
    Paper,
    /// A listing file whose rows were all ingested.
    Listing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub source_path: String,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEntry {
    pub fn paper(title: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Paper,
            title: Some(title.into()),
            source_path: source_path.into(),
            processed_at: Utc::now(),
        }
    }

    pub fn listing(source_path: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Listing,
            title: None,
            source_path: source_path.into(),
            processed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackerFile {
    version: u32,
    processed: BTreeMap<String, ProcessedEntry>,
}

/// Persistent record of ids that have already been ingested.
///
/// Every mutation is written through to disk before returning, so an
/// interrupted ingestion run loses at most the document in flight.
#[derive(Debug)]
pub struct PaperTracker {
    path: PathBuf,
    processed: BTreeMap<String, ProcessedEntry>,
}

impl PaperTracker {
    /// Load the tracker at `path`. A missing file is an empty tracker. A file
    /// that is not valid tracker JSON is moved aside to `<name>.corrupt` and the
    /// tracker starts empty; other I/O errors are returned.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let processed = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<TrackerFile>(&text) {
                Ok(file) => file.processed,
                Err(e) => {
                    let backup = corrupt_path(&path);
                    tracing::warn!(
                        path = %path.display(),
                        backup = %backup.display(),
                        error = %e,
                        "tracker file is corrupt; starting with an empty set"
                    );
                    std::fs::rename(&path, &backup)?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, processed })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.processed.contains_key(id)
    }

    /// Record `id` and persist immediately. Re-marking an id keeps the first entry.
    pub fn mark_processed(&mut self, id: &str, entry: ProcessedEntry) -> Result<()> {
        if self.processed.contains_key(id) {
            return Ok(());
        }
        self.processed.insert(id.to_string(), entry);
        self.save()
    }

    pub fn get(&self, id: &str) -> Option<&ProcessedEntry> {
        self.processed.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ProcessedEntry)> {
        self.processed.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Ids recorded for `source_path` other than `current`: what an earlier
    /// version of that file left behind.
    pub fn superseded(&self, source_path: &str, current: &str) -> Vec<(String, EntryKind)> {
        self.processed
            .iter()
            .filter(|(id, e)| e.source_path == source_path && id.as_str() != current)
            .map(|(id, e)| (id.clone(), e.kind))
            .collect()
    }

    /// Drop one id and persist. Returns whether it was present.
    pub fn forget(&mut self, id: &str) -> Result<bool> {
        if self.processed.remove(id).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Forget every id and persist the empty set.
    pub fn reset(&mut self) -> Result<()> {
        self.processed.clear();
        self.save()
    }

    /// Write the whole set atomically: temp file, fsync, rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = TrackerFile {
            version: FORMAT_VERSION,
            processed: self.processed.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        atomic_write(&self.path, &json)?;
        Ok(())
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(content.as_bytes())?;
        f.flush()?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
