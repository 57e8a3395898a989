//! Upsert engine.
//!
//! Merges freshly generated candidates into the ledger: insert-if-new,
//! refresh the latest line/odds while a pick is still live, and otherwise
//! leave the record untouched. Running the same candidate set through any
//! number of times leaves exactly one pick per logical bet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::identity::{self, EntityTable};
use crate::types::{Candidate, Ledger, LedgerError, Pick, PickStatus};

// ---------------------------------------------------------------------------
// Tracking policy
// ---------------------------------------------------------------------------

/// The caller-supplied tracking threshold.
///
/// Candidates carry an opaque `edge` score from the recommendation
/// generator; only candidates at or above `min_edge` enter the ledger. A
/// candidate without a score is admitted only when the threshold is zero or
/// negative (track-everything mode).
#[derive(Debug, Clone)]
pub struct TrackingPolicy {
    pub min_edge: Decimal,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self {
            min_edge: Decimal::new(5, 2), // 0.05
        }
    }
}

impl TrackingPolicy {
    pub fn admits(&self, candidate: &Candidate) -> bool {
        match candidate.edge {
            Some(edge) => edge >= self.min_edge,
            None => self.min_edge <= Decimal::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Upsert report
// ---------------------------------------------------------------------------

/// Explicit per-reason counts for one upsert batch. Silent data loss is a
/// reporting defect: every candidate lands in exactly one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    /// Pick exists but its event has already started; line frozen.
    pub skipped_started: usize,
    /// Pick exists and is already settled.
    pub skipped_terminal: usize,
    /// New candidate below the tracking threshold.
    pub skipped_below_threshold: usize,
}

impl UpsertReport {
    pub fn skipped(&self) -> usize {
        self.skipped_started + self.skipped_terminal + self.skipped_below_threshold
    }
}

impl std::fmt::Display for UpsertReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inserted={} updated={} skipped={} (started={} terminal={} below_threshold={})",
            self.inserted,
            self.updated,
            self.skipped(),
            self.skipped_started,
            self.skipped_terminal,
            self.skipped_below_threshold,
        )
    }
}

// ---------------------------------------------------------------------------
// Upsert engine
// ---------------------------------------------------------------------------

pub struct UpsertEngine {
    family: String,
    entities: EntityTable,
    policy: TrackingPolicy,
}

impl UpsertEngine {
    pub fn new(family: &str, entities: EntityTable, policy: TrackingPolicy) -> Self {
        Self {
            family: family.to_string(),
            entities,
            policy,
        }
    }

    /// Merge a candidate batch into the ledger.
    ///
    /// Idempotent: re-running the same batch is a no-op beyond the first
    /// application. An identity collision (same pick id, different bet
    /// attributes) means the entity table is mapping two bets onto one
    /// record; the whole batch aborts before anything is persisted.
    pub fn upsert(
        &self,
        ledger: &mut Ledger,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> Result<UpsertReport, LedgerError> {
        let mut report = UpsertReport::default();

        for raw in candidates {
            let entity = self.entities.canonical_entity(&raw.entity);
            let pick_id = identity::resolve_parts(
                &self.family,
                &entity,
                raw.market.key(),
                raw.selection.key(),
                raw.event_start.date_naive(),
            );

            if let Some(existing) = ledger.get_mut(&pick_id) {
                // Same id must mean the same logical bet.
                if existing.entity != entity
                    || existing.market != raw.market
                    || existing.selection != raw.selection
                {
                    return Err(LedgerError::IdentityCollision {
                        pick_id,
                        existing: existing.to_string(),
                        candidate: format!("{} {} {}", entity, raw.market, raw.selection),
                    });
                }

                if existing.line_is_live(now) {
                    if existing.latest_line == raw.line && existing.latest_odds == raw.odds {
                        debug!(pick_id = %existing.pick_id, "Line unchanged");
                    } else {
                        debug!(
                            pick_id = %existing.pick_id,
                            line = %raw.line,
                            odds = raw.odds,
                            prev_line = %existing.latest_line,
                            prev_odds = existing.latest_odds,
                            "Line refreshed"
                        );
                    }
                    existing.latest_line = raw.line;
                    existing.latest_odds = raw.odds;
                    report.updated += 1;
                } else if existing.is_terminal() {
                    report.skipped_terminal += 1;
                } else {
                    report.skipped_started += 1;
                }
                continue;
            }

            if !self.policy.admits(raw) {
                debug!(
                    candidate = %raw,
                    edge = ?raw.edge,
                    min_edge = %self.policy.min_edge,
                    "Below tracking threshold"
                );
                report.skipped_below_threshold += 1;
                continue;
            }

            let pick = Pick {
                pick_id: pick_id.clone(),
                entity,
                market: raw.market,
                selection: raw.selection.clone(),
                opening_line: raw.line,
                latest_line: raw.line,
                opening_odds: raw.odds,
                latest_odds: raw.odds,
                status: PickStatus::Pending,
                result: None,
                actual_value: None,
                profit_loss: None,
                tracked_at: now,
                graded_at: None,
                event_start: raw.event_start,
                metadata: raw.metadata.clone(),
            };
            info!(pick_id = %pick.pick_id, pick = %pick, "Pick tracked");
            ledger.insert(pick)?;
            report.inserted += 1;
        }

        if report.inserted > 0 || report.updated > 0 {
            ledger.updated_at = now;
        }

        info!(
            family = %self.family,
            candidates = candidates.len(),
            %report,
            "Upsert complete"
        );
        if report.skipped_started > 0 {
            warn!(
                count = report.skipped_started,
                "Candidates arrived for events already under way"
            );
        }

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
