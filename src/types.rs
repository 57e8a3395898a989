//! Shared types for the TALLY ledger.
//!
//! These types form the data model used across all modules and define the
//! persisted wire contract: the field names of [`Pick`] and the shape of the
//! ledger document are stable surfaces read by the presentation layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Bet market type. Each market grades with its own settlement rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Spread,
    Total,
    PlayerProp,
}

impl Market {
    /// All known markets (useful for iteration).
    pub const ALL: &'static [Market] = &[Market::Spread, Market::Total, Market::PlayerProp];

    /// Stable lowercase key used in summaries and identity hashing.
    pub fn key(&self) -> &'static str {
        match self {
            Market::Spread => "spread",
            Market::Total => "total",
            Market::PlayerProp => "player_prop",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for Market {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spread" | "spreads" => Ok(Market::Spread),
            "total" | "totals" | "over_under" => Ok(Market::Total),
            "player_prop" | "prop" | "props" => Ok(Market::PlayerProp),
            _ => Err(anyhow::anyhow!("Unknown market: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// What the pick is on: a side of a total/prop, or a team for spreads.
///
/// Serialised as a plain string (`"over"`, `"under"`, or the canonical team
/// identifier) so the persisted document stays flat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Selection {
    Over,
    Under,
    Team(String),
}

impl Selection {
    /// Stable string form used in identity hashing and summaries.
    pub fn key(&self) -> &str {
        match self {
            Selection::Over => "over",
            Selection::Under => "under",
            Selection::Team(t) => t.as_str(),
        }
    }

    pub fn is_over(&self) -> bool {
        matches!(self, Selection::Over)
    }

    pub fn is_under(&self) -> bool {
        matches!(self, Selection::Under)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl From<Selection> for String {
    fn from(s: Selection) -> String {
        s.key().to_string()
    }
}

impl TryFrom<String> for Selection {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "over" => Ok(Selection::Over),
            "under" => Ok(Selection::Under),
            "" => Err("empty selection".to_string()),
            _ => Ok(Selection::Team(s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// The subject of a pick: a player (props) or a game (spreads, totals).
///
/// Serialised untagged: a bare string for players, a `{home, away}` object
/// for games.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entity {
    Game { home: String, away: String },
    Player(String),
}

impl Entity {
    /// Stable string form used in identity hashing and outcome lookup keys.
    pub fn key(&self) -> String {
        match self {
            Entity::Player(id) => id.clone(),
            Entity::Game { home, away } => format!("{away}@{home}"),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Player(id) => f.write_str(id),
            Entity::Game { home, away } => write!(f, "{away} @ {home}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pick status
// ---------------------------------------------------------------------------

/// Pick lifecycle status. Terminal once non-pending; never reverts.
///
/// A closed enum, deliberately: the scripts this replaces stored free-form
/// status strings and accumulated multiple casings of the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickStatus {
    Pending,
    Win,
    Loss,
    Push,
}

impl PickStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PickStatus::Pending)
    }
}

impl fmt::Display for PickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickStatus::Pending => write!(f, "PENDING"),
            PickStatus::Win => write!(f, "WIN"),
            PickStatus::Loss => write!(f, "LOSS"),
            PickStatus::Push => write!(f, "PUSH"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pick
// ---------------------------------------------------------------------------

/// Stake per pick, in minor units. Profit figures are multiples of this.
pub const UNIT_STAKE: i64 = 100;

/// One tracked recommendation.
///
/// Field names are a stable contract with the presentation layer; do not
/// rename without versioning the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    /// Derived identity key (see `identity::resolve`). Unique per ledger.
    pub pick_id: String,
    pub entity: Entity,
    pub market: Market,
    pub selection: Selection,
    /// Line at first tracking. Settlement grades against this.
    pub opening_line: Decimal,
    /// Most recently observed line while the pick was still live.
    pub latest_line: Decimal,
    /// American odds at first tracking. Profit is computed from these.
    pub opening_odds: i32,
    /// Most recently observed odds; approximates the closing line.
    pub latest_odds: i32,
    pub status: PickStatus,
    /// Human-readable grading note, set at settlement.
    pub result: Option<String>,
    /// Observed outcome value (margin, game total, or stat total).
    pub actual_value: Option<Decimal>,
    /// Minor units of one betting unit. Set iff status is terminal.
    pub profit_loss: Option<i64>,
    pub tracked_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
    pub event_start: DateTime<Utc>,
    /// Opaque scoring payload from the recommendation generator, copied
    /// through unexamined.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Pick {
    pub fn is_pending(&self) -> bool {
        self.status == PickStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the line/odds may still be refreshed: pending and pre-start.
    pub fn line_is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.event_start > now
    }

    /// Net line movement since tracking.
    pub fn line_movement(&self) -> Decimal {
        self.latest_line - self.opening_line
    }

    /// Closing line value: whether the odds captured at tracking time pay
    /// better than the last odds observed before the event started.
    pub fn beat_closing_odds(&self) -> bool {
        let (on, od) = payout_fraction(self.opening_odds);
        let (ln, ld) = payout_fraction(self.latest_odds);
        // Cross-multiply; both denominators are positive.
        on * ld > ln * od
    }

    /// Helper to build a test pick with sensible defaults.
    #[cfg(test)]
    pub fn sample(pick_id: &str) -> Self {
        use rust_decimal_macros::dec;
        Pick {
            pick_id: pick_id.to_string(),
            entity: Entity::Player("jayson_tatum".to_string()),
            market: Market::PlayerProp,
            selection: Selection::Over,
            opening_line: dec!(23.5),
            latest_line: dec!(23.5),
            opening_odds: -110,
            latest_odds: -110,
            status: PickStatus::Pending,
            result: None,
            actual_value: None,
            profit_loss: None,
            tracked_at: Utc::now(),
            graded_at: None,
            event_start: Utc::now() + chrono::Duration::hours(6),
            metadata: serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} {} ({})",
            self.status, self.entity, self.market, self.selection, self.opening_line, self.opening_odds,
        )
    }
}

/// Payout per unit staked at the given American odds, as an exact fraction
/// `(numerator, denominator)` for sign-safe comparison.
fn payout_fraction(odds: i32) -> (i64, i64) {
    if odds >= 0 {
        (odds as i64, 100)
    } else {
        (100, -(odds as i64))
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A recommendation produced upstream, not yet in the ledger.
///
/// `edge` is an opaque score: the ledger compares it to the tracking
/// threshold and otherwise passes it through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub entity: Entity,
    pub market: Market,
    pub selection: Selection,
    pub line: Decimal,
    pub odds: i32,
    pub event_start: DateTime<Utc>,
    #[serde(default)]
    pub edge: Option<Decimal>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ({})",
            self.entity, self.market, self.selection, self.line, self.odds,
        )
    }
}

// ---------------------------------------------------------------------------
// Outcome data
// ---------------------------------------------------------------------------

/// What the outcome provider reports for a finished event.
///
/// Scores are optional per side: a partially reported game is real-world
/// input and grades as ambiguous, not as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutcomeData {
    GameScore {
        home: Option<i64>,
        away: Option<i64>,
    },
    StatValue(Decimal),
}

impl fmt::Display for OutcomeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeData::GameScore { home, away } => {
                let side = |s: &Option<i64>| s.map_or("?".to_string(), |v| v.to_string());
                write!(f, "{}-{}", side(home), side(away))
            }
            OutcomeData::StatValue(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary (derived cache)
// ---------------------------------------------------------------------------

/// Win/loss/profit metrics over some set of terminal picks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBlock {
    pub wins: u64,
    pub losses: u64,
    pub pushes: u64,
    /// `wins / (wins + losses)`; pushes excluded from the denominator.
    pub win_rate: f64,
    /// Total profit in whole units.
    pub profit_units: f64,
    /// `profit / (terminal_count * unit_stake)`.
    pub roi: f64,
}

impl MetricBlock {
    pub fn terminal_count(&self) -> u64 {
        self.wins + self.losses + self.pushes
    }
}

impl fmt::Display for MetricBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "W{}/L{}/P{} | win_rate={:.1}% | profit={:+.2}u | roi={:+.1}%",
            self.wins,
            self.losses,
            self.pushes,
            self.win_rate * 100.0,
            self.profit_units,
            self.roi * 100.0,
        )
    }
}

/// Aggregate performance statistics, recomputed wholesale from terminal
/// picks on every read. Persisted in the ledger document as a convenience
/// cache only; no reader may treat it as authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub generated_at: Option<DateTime<Utc>>,
    pub pending: u64,
    pub overall: MetricBlock,
    /// Metrics partitioned by market.
    pub by_market: BTreeMap<String, MetricBlock>,
    /// Metrics partitioned by over/under selection (totals and props).
    pub by_selection: BTreeMap<String, MetricBlock>,
    /// Metrics over the most recent N terminal picks, keyed by N.
    pub rolling: BTreeMap<u64, MetricBlock>,
    /// Terminal picks whose tracked odds beat the closing odds.
    pub clv_beats: u64,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The full persisted collection of picks for one sport/market family.
///
/// Append-only by identity: picks are inserted once, mutated in place by the
/// upsert and settlement engines, and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    /// Which sport/market family this ledger covers (one file per family).
    pub family: String,
    pub picks: Vec<Pick>,
    /// Derived cache; regenerated before each save, ignored on load.
    pub summary: Option<Summary>,
    pub updated_at: DateTime<Utc>,
}

impl Ledger {
    pub fn new(family: &str) -> Self {
        Ledger {
            family: family.to_string(),
            picks: Vec::new(),
            summary: None,
            updated_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }

    pub fn get(&self, pick_id: &str) -> Option<&Pick> {
        self.picks.iter().find(|p| p.pick_id == pick_id)
    }

    pub fn get_mut(&mut self, pick_id: &str) -> Option<&mut Pick> {
        self.picks.iter_mut().find(|p| p.pick_id == pick_id)
    }

    pub fn contains(&self, pick_id: &str) -> bool {
        self.get(pick_id).is_some()
    }

    /// Append a new pick. Rejects duplicate identities: the unique-`pick_id`
    /// invariant is enforced here, not trusted to callers.
    pub fn insert(&mut self, pick: Pick) -> Result<(), LedgerError> {
        if let Some(existing) = self.get(&pick.pick_id) {
            return Err(LedgerError::IdentityCollision {
                pick_id: pick.pick_id.clone(),
                existing: existing.to_string(),
                candidate: pick.to_string(),
            });
        }
        self.picks.push(pick);
        Ok(())
    }

    pub fn pending(&self) -> impl Iterator<Item = &Pick> {
        self.picks.iter().filter(|p| p.is_pending())
    }

    pub fn terminal(&self) -> impl Iterator<Item = &Pick> {
        self.picks.iter().filter(|p| p.is_terminal())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Two distinct logical bets resolved to the same pick id. Fatal: the
    /// batch aborts rather than silently merging records.
    #[error("Identity collision on {pick_id}: existing [{existing}] vs candidate [{candidate}]")]
    IdentityCollision {
        pick_id: String,
        existing: String,
        candidate: String,
    },

    /// A ledger file exists but cannot be read or parsed. Recoverable by
    /// restoring a backup; never silently replaced with an empty ledger.
    #[error("Ledger file corrupt ({path}): {reason}")]
    Corruption { path: String, reason: String },

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
