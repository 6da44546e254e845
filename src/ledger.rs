//! Ledger of mirrored folder names
//!
//! A flat JSON array of `"{owner}@{repo}"` strings kept in the mirror root.
//! The file is re-read before every membership check and rewritten in full on
//! every append. Entries are never removed.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SyncError;

/// Default ledger file name inside the mirror root
pub const DEFAULT_LEDGER_FILE: &str = "cloned_repos.json";

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger stored as `file_name` inside `root`
    pub fn in_root(root: &Path, file_name: &str) -> Self {
        Self::new(root.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries, replacing a missing or corrupt file with `[]`
    pub fn load(&self) -> Result<Vec<String>, SyncError> {
        if !self.path.exists() {
            debug!("Creating empty ledger at {}", self.path.display());
            self.write(&[])?;
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(entries) => Ok(entries),
            Err(source) => {
                let corrupt = SyncError::LedgerCorrupt {
                    path: self.path.clone(),
                    source,
                };
                warn!("{}", corrupt);
                self.write(&[])?;
                Ok(Vec::new())
            }
        }
    }

    pub fn contains(&self, folder_name: &str) -> Result<bool, SyncError> {
        Ok(self.load()?.iter().any(|entry| entry == folder_name))
    }

    /// Append `folder_name` and rewrite the file
    pub fn append(&self, folder_name: &str) -> Result<(), SyncError> {
        let mut entries = self.load()?;
        entries.push(folder_name.to_string());
        self.write(&entries)
    }

    /// Append only when the entry is not there yet. Returns whether it was added.
    pub fn ensure(&self, folder_name: &str) -> Result<bool, SyncError> {
        if self.contains(folder_name)? {
            return Ok(false);
        }
        self.append(folder_name)?;
        Ok(true)
    }

    /// Find the language directory under `root` holding a `.git`-marked
    /// mirror named `folder_name`
    pub fn locate(root: &Path, folder_name: &str) -> Option<PathBuf> {
        fs::read_dir(root)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path().join(folder_name))
            .find(|candidate| candidate.join(".git").exists())
    }

    fn write(&self, entries: &[String]) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| SyncError::Io(std::io::Error::other(e)))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
