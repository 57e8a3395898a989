//! Persistence layer.
//!
//! Each sport/market family owns one JSON ledger document. Saves are
//! atomic: the new document is written to a temp file in the same
//! directory, fsynced, the previous committed version is copied to a
//! timestamped backup, and the temp file is renamed over the committed
//! path. A process killed mid-save leaves either the fully-previous or
//! fully-new document on disk, never a partial one.
//!
//! Callers must treat `load → mutate → save` as a single critical section
//! per ledger file; overlapping runs against the same family are excluded
//! by the external scheduler, not by this module.

use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{Ledger, LedgerError};

/// Subdirectory (under the data dir) receiving pre-promotion backups.
const BACKUPS_DIR: &str = "backups";

/// One family's ledger file plus its backup chain.
pub struct LedgerStore {
    family: String,
    path: PathBuf,
    backups_dir: PathBuf,
}

impl LedgerStore {
    /// A store for `family` under `data_dir` (created on first save).
    pub fn new(data_dir: impl AsRef<Path>, family: &str) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            family: family.to_string(),
            path: data_dir.join(format!("{family}.json")),
            backups_dir: data_dir.join(BACKUPS_DIR),
        }
    }

    /// Path of the committed ledger document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, or an empty one if no file exists yet.
    ///
    /// A file that exists but cannot be read or parsed is `Corruption` —
    /// never substituted with an empty ledger, which would silently discard
    /// the full pick history. Recover with [`Self::restore_latest_backup`].
    pub fn load(&self) -> Result<Ledger, LedgerError> {
        if !self.path.exists() {
            info!(family = %self.family, path = %self.path.display(), "No ledger on disk, starting empty");
            return Ok(Ledger::new(&self.family));
        }

        let raw = fs::read_to_string(&self.path).map_err(|e| LedgerError::Corruption {
            path: self.path.display().to_string(),
            reason: format!("unreadable: {e}"),
        })?;

        let ledger: Ledger = serde_json::from_str(&raw).map_err(|e| LedgerError::Corruption {
            path: self.path.display().to_string(),
            reason: format!("malformed document: {e}"),
        })?;

        info!(
            family = %self.family,
            picks = ledger.len(),
            pending = ledger.pending().count(),
            "Ledger loaded"
        );
        Ok(ledger)
    }

    /// Persist the ledger atomically, backing up the previous version.
    pub fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(ledger).map_err(|e| {
            LedgerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        // Stage the new version. The temp file lives in the target
        // directory so the final rename stays on one filesystem.
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        // Back up the committed version before promoting.
        if self.path.exists() {
            fs::create_dir_all(&self.backups_dir)?;
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
            let backup = self.backups_dir.join(format!("{}.{stamp}.json", self.family));
            fs::copy(&self.path, &backup)?;
            debug!(backup = %backup.display(), "Previous ledger backed up");
        }

        fs::rename(&tmp, &self.path)?;

        info!(
            family = %self.family,
            picks = ledger.len(),
            path = %self.path.display(),
            "Ledger saved"
        );
        Ok(())
    }

    /// Backups for this family, newest first. The timestamp format sorts
    /// lexicographically.
    pub fn backups(&self) -> Result<Vec<PathBuf>, LedgerError> {
        if !self.backups_dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}.", self.family);
        let mut found: Vec<PathBuf> = fs::read_dir(&self.backups_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        found.sort();
        found.reverse();
        Ok(found)
    }

    /// Promote the most recent backup over the committed path. The corrupt
    /// document (if any) is kept aside with a `.corrupt` suffix for
    /// inspection.
    pub fn restore_latest_backup(&self) -> Result<PathBuf, LedgerError> {
        let backup = self.backups()?.into_iter().next().ok_or_else(|| {
            LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no backups for family {}", self.family),
            ))
        })?;

        if self.path.exists() {
            let quarantine = self.path.with_extension("json.corrupt");
            fs::rename(&self.path, &quarantine)?;
            warn!(quarantined = %quarantine.display(), "Corrupt ledger set aside");
        }

        fs::copy(&backup, &self.path)?;
        info!(
            family = %self.family,
            restored_from = %backup.display(),
            "Ledger restored from backup"
        );
        Ok(backup)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
