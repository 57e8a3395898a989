//! Identity resolution.
//!
//! Derives a stable, collision-resistant key for a logical bet and owns the
//! canonical entity table. Identity is computed once, at ingestion; nothing
//! downstream ever re-matches entities by substring.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::types::{Candidate, Entity};

/// Hex characters of the SHA-256 digest kept as the pick id. 64 bits of
/// identity is far beyond what a per-family ledger of daily picks needs.
const PICK_ID_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Entity table
// ---------------------------------------------------------------------------

/// Canonical entity identifiers.
///
/// Feed names arrive in whatever form the upstream odds source uses
/// ("LA Lakers", "Los Angeles Lakers", "lakers"). The table maps known
/// aliases to one canonical id; unknown names fall back to a deterministic
/// normalised form. Applied exactly once, when a candidate enters the
/// ledger.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    aliases: HashMap<String, String>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from an alias → canonical-id map (typically the
    /// `[entities]` section of the config file). Alias keys are matched
    /// after normalisation, so config entries are casing-insensitive.
    pub fn from_aliases(aliases: &HashMap<String, String>) -> Self {
        let aliases = aliases
            .iter()
            .map(|(alias, canonical)| (normalize(alias), canonical.clone()))
            .collect();
        Self { aliases }
    }

    /// Register a single alias.
    pub fn register(&mut self, alias: &str, canonical: &str) {
        self.aliases.insert(normalize(alias), canonical.to_string());
    }

    /// Resolve a raw name to its canonical identifier.
    pub fn canonical(&self, raw: &str) -> String {
        let normalized = normalize(raw);
        match self.aliases.get(&normalized) {
            Some(canonical) => canonical.clone(),
            None => normalized,
        }
    }

    /// Canonicalise every identifier inside an entity.
    pub fn canonical_entity(&self, entity: &Entity) -> Entity {
        match entity {
            Entity::Player(id) => Entity::Player(self.canonical(id)),
            Entity::Game { home, away } => Entity::Game {
                home: self.canonical(home),
                away: self.canonical(away),
            },
        }
    }
}

/// Deterministic fallback normalisation: lowercase alphanumeric tokens
/// joined by `_`. "LA Lakers " and "la  lakers" normalise identically.
fn normalize(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

// ---------------------------------------------------------------------------
// Pick identity
// ---------------------------------------------------------------------------

/// Derive the pick id for a candidate whose entity has already been
/// canonicalised.
///
/// Pure and deterministic over the bet's invariant attributes: family,
/// entity, market, selection, and the event's calendar date. The line
/// value, the odds, and the wall clock are deliberately excluded — a spread
/// drifting from -6 to -6.5 before tip-off is still the same logical bet,
/// and keying on any per-run value tracks it once per run instead of once.
pub fn resolve(family: &str, candidate: &Candidate) -> String {
    resolve_parts(
        family,
        &candidate.entity,
        candidate.market.key(),
        candidate.selection.key(),
        candidate.event_start.date_naive(),
    )
}

/// Identity from raw parts; exposed so settlement-side tooling can recompute
/// ids without constructing a full candidate.
pub fn resolve_parts(
    family: &str,
    entity: &Entity,
    market: &str,
    selection: &str,
    event_date: NaiveDate,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(family.as_bytes());
    hasher.update(b"|");
    hasher.update(entity.key().as_bytes());
    hasher.update(b"|");
    hasher.update(market.as_bytes());
    hasher.update(b"|");
    hasher.update(selection.as_bytes());
    hasher.update(b"|");
    hasher.update(event_date.to_string().as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..PICK_ID_LEN].to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Market, Selection};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn make_candidate() -> Candidate {
        Candidate {
            entity: Entity::Player("jayson_tatum".to_string()),
            market: Market::PlayerProp,
            selection: Selection::Over,
            line: dec!(23.5),
            odds: -110,
            event_start: Utc.with_ymd_and_hms(2026, 3, 14, 19, 0, 0).unwrap(),
            edge: Some(dec!(0.07)),
            metadata: serde_json::Value::Null,
        }
    }

    // -- Normalisation tests --

    #[test]
    fn test_normalize_collapses_punctuation_and_case() {
        assert_eq!(normalize("LA Lakers"), "la_lakers");
        assert_eq!(normalize("  la   LAKERS "), "la_lakers");
        assert_eq!(normalize("O'Neal, Shaq"), "o_neal_shaq");
    }

    #[test]
    fn test_entity_table_alias_lookup() {
        let mut table = EntityTable::new();
        table.register("Los Angeles Lakers", "lakers");
        assert_eq!(table.canonical("los angeles lakers"), "lakers");
        assert_eq!(table.canonical("Los Angeles  Lakers"), "lakers");
        // Unknown name falls back to normalisation.
        assert_eq!(table.canonical("Boston Celtics"), "boston_celtics");
    }

    #[test]
    fn test_entity_table_canonicalises_both_game_sides() {
        let mut table = EntityTable::new();
        table.register("NY Knicks", "knicks");
        let game = Entity::Game {
            home: "Boston Celtics".to_string(),
            away: "NY Knicks".to_string(),
        };
        let canonical = table.canonical_entity(&game);
        assert_eq!(canonical.key(), "knicks@boston_celtics");
    }

    // -- Identity tests --

    #[test]
    fn test_resolve_is_deterministic() {
        let c = make_candidate();
        assert_eq!(resolve("nba_props", &c), resolve("nba_props", &c));
        assert_eq!(resolve("nba_props", &c).len(), PICK_ID_LEN);
    }

    #[test]
    fn test_resolve_ignores_line_odds_and_metadata() {
        let base = make_candidate();
        let mut moved = make_candidate();
        moved.line = dec!(24.5);
        moved.odds = -125;
        moved.edge = None;
        moved.metadata = serde_json::json!({"run": 7});
        // Same logical bet re-observed at a different number: same id.
        assert_eq!(resolve("nba_props", &base), resolve("nba_props", &moved));
    }

    #[test]
    fn test_resolve_ignores_time_of_day() {
        let morning = make_candidate();
        let mut evening = make_candidate();
        evening.event_start = evening.event_start + Duration::hours(3);
        assert_eq!(resolve("nba_props", &morning), resolve("nba_props", &evening));
    }

    #[test]
    fn test_resolve_distinguishes_date() {
        let today = make_candidate();
        let mut tomorrow = make_candidate();
        tomorrow.event_start = tomorrow.event_start + Duration::days(1);
        assert_ne!(resolve("nba_props", &today), resolve("nba_props", &tomorrow));
    }

    #[test]
    fn test_resolve_distinguishes_entity_market_selection_family() {
        let base = make_candidate();

        let mut other_entity = make_candidate();
        other_entity.entity = Entity::Player("jaylen_brown".to_string());
        assert_ne!(resolve("nba_props", &base), resolve("nba_props", &other_entity));

        let mut other_selection = make_candidate();
        other_selection.selection = Selection::Under;
        assert_ne!(
            resolve("nba_props", &base),
            resolve("nba_props", &other_selection)
        );

        assert_ne!(resolve("nba_props", &base), resolve("wnba_props", &base));
    }

    #[test]
    fn test_resolve_parts_matches_resolve() {
        let c = make_candidate();
        let via_parts = resolve_parts(
            "nba_props",
            &c.entity,
            c.market.key(),
            c.selection.key(),
            c.event_start.date_naive(),
        );
        assert_eq!(via_parts, resolve("nba_props", &c));
    }
}
