//! Outcome providers.
//!
//! The settlement engine reads real-world results through the
//! [`OutcomeProvider`] seam. Providers are synchronous and queried
//! per entity and event date; a missing outcome is routine (`Ok(None)`),
//! not an error. The stats-fetching scripts that populate outcome files
//! live outside this crate.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::types::{Entity, OutcomeData};

/// Source of settled event outcomes.
///
/// Entities arrive already canonicalised (the upsert engine resolved them
/// at ingestion), so implementations match on exact keys — never by
/// substring.
#[cfg_attr(test, mockall::automock)]
pub trait OutcomeProvider {
    /// Look up the outcome for an entity on an event date.
    /// `Ok(None)` means not yet available; retried on a later run.
    fn lookup(&self, entity: &Entity, date: NaiveDate) -> Result<Option<OutcomeData>>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// File-backed provider
// ---------------------------------------------------------------------------

/// Outcomes from a JSON document keyed by date, then canonical entity key:
///
/// ```json
/// {
///   "2026-03-14": {
///     "knicks@celtics": { "home": 112, "away": 98 },
///     "jayson_tatum": 27
///   }
/// }
/// ```
pub struct FileOutcomeProvider {
    outcomes: HashMap<NaiveDate, HashMap<String, OutcomeData>>,
}

impl FileOutcomeProvider {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read outcomes file: {}", path.display()))?;
        let outcomes: HashMap<NaiveDate, HashMap<String, OutcomeData>> =
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse outcomes file: {}", path.display()))?;

        let entries: usize = outcomes.values().map(|m| m.len()).sum();
        info!(path = %path.display(), dates = outcomes.len(), entries, "Outcomes loaded");
        Ok(Self { outcomes })
    }

    #[cfg(test)]
    pub fn from_map(outcomes: HashMap<NaiveDate, HashMap<String, OutcomeData>>) -> Self {
        Self { outcomes }
    }
}

impl OutcomeProvider for FileOutcomeProvider {
    fn lookup(&self, entity: &Entity, date: NaiveDate) -> Result<Option<OutcomeData>> {
        Ok(self
            .outcomes
            .get(&date)
            .and_then(|by_entity| by_entity.get(&entity.key()))
            .cloned())
    }

    fn name(&self) -> &str {
        "outcomes-file"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
