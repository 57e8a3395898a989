//! Full-lifecycle simulation.
//!
//! Replays a tracking day end to end through the real store: a candidate is
//! tracked, re-observed at a moved line, settled against outcomes the next
//! day, and re-settled as a no-op — with the ledger persisted and reloaded
//! between every step, the way scheduled runs actually hit it.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::PathBuf;

use tally::engine::analytics::{self, AnalyticsConfig};
use tally::engine::settlement::{SettlementConfig, SettlementEngine};
use tally::engine::upsert::{TrackingPolicy, UpsertEngine};
use tally::identity::EntityTable;
use tally::providers::{FileOutcomeProvider, OutcomeProvider};
use tally::storage::LedgerStore;
use tally::types::{Candidate, Entity, Market, OutcomeData, PickStatus, Selection};

// ---- helpers ---------------------------------------------------------------

fn temp_data_dir() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("tally_simulation_{}", uuid::Uuid::new_v4()));
    p
}

fn day1(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 13, hour, 0, 0).unwrap()
}

fn day2(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap()
}

fn tatum_over(line: rust_decimal::Decimal, odds: i32) -> Candidate {
    Candidate {
        entity: Entity::Player("Jayson Tatum".to_string()),
        market: Market::PlayerProp,
        selection: Selection::Over,
        line,
        odds,
        event_start: day2(19),
        edge: Some(dec!(0.08)),
        metadata: serde_json::json!({"model": "heuristic-v3", "confidence": 0.71}),
    }
}

fn upsert_engine() -> UpsertEngine {
    UpsertEngine::new(
        "nba_props",
        EntityTable::new(),
        TrackingPolicy { min_edge: dec!(0.05) },
    )
}

fn settlement_engine() -> SettlementEngine {
    SettlementEngine::new(SettlementConfig {
        cooldown: Duration::hours(3),
        unit_stake: 100,
    })
}

fn write_outcomes(dir: &PathBuf, body: &str) -> PathBuf {
    let path = dir.join("outcomes.json");
    std::fs::write(&path, body).unwrap();
    path
}

// ---- scenario --------------------------------------------------------------

#[test]
fn test_track_move_settle_lifecycle() {
    let dir = temp_data_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let store = LedgerStore::new(&dir, "nba_props");

    // Day 1, 10:00 — the morning run tracks a fresh recommendation.
    let mut ledger = store.load().unwrap();
    let report = upsert_engine()
        .upsert(&mut ledger, &[tatum_over(dec!(23.5), -110)], day1(10))
        .unwrap();
    assert_eq!(report.inserted, 1);
    store.save(&ledger).unwrap();

    // Day 1, 15:00 — the afternoon run re-observes the same logical bet
    // at steamed odds. Still one pick; opening values untouched.
    let mut ledger = store.load().unwrap();
    let report = upsert_engine()
        .upsert(&mut ledger, &[tatum_over(dec!(23.5), -120)], day1(15))
        .unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 1);
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.picks[0].opening_odds, -110);
    assert_eq!(ledger.picks[0].latest_odds, -120);
    store.save(&ledger).unwrap();

    // Day 2, 23:00 — box scores are in; the settlement run grades the pick
    // from the odds available at tracking time, not the closing number.
    let outcomes = write_outcomes(&dir, r#"{"2026-03-14": {"jayson_tatum": 27.0}}"#);
    let provider = FileOutcomeProvider::from_path(&outcomes).unwrap();

    let mut ledger = store.load().unwrap();
    let report = settlement_engine().settle(&mut ledger, &provider, day2(23));
    assert_eq!(report.graded, 1);
    assert_eq!(report.wins, 1);
    let pick = &ledger.picks[0];
    assert_eq!(pick.status, PickStatus::Win);
    assert_eq!(pick.profit_loss, Some(91)); // from -110, not -120
    assert_eq!(pick.actual_value, Some(dec!(27)));
    store.save(&ledger).unwrap();

    // A repeat settlement run the same night is a no-op.
    let mut ledger = store.load().unwrap();
    let report = settlement_engine().settle(&mut ledger, &provider, day2(23) + Duration::minutes(30));
    assert_eq!(report.graded, 0);
    assert_eq!(ledger.picks[0].profit_loss, Some(91));

    // The summary reflects exactly one settled win however often it is
    // recomputed.
    let config = AnalyticsConfig::default();
    let summary_a = analytics::summarize(&ledger, &config);
    let summary_b = analytics::summarize(&ledger, &config);
    assert_eq!(summary_a, summary_b);
    assert_eq!(summary_a.overall.wins, 1);
    assert!((summary_a.overall.profit_units - 0.91).abs() < 1e-12);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_repeated_tracking_runs_never_duplicate() {
    let dir = temp_data_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let store = LedgerStore::new(&dir, "nba_props");
    let engine = upsert_engine();

    // A cron job hitting every hour with the same recommendation set.
    for hour in 9..15 {
        let mut ledger = store.load().unwrap();
        engine
            .upsert(&mut ledger, &[tatum_over(dec!(23.5), -110)], day1(hour))
            .unwrap();
        store.save(&ledger).unwrap();
    }

    let ledger = store.load().unwrap();
    assert_eq!(ledger.len(), 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_mixed_markets_settle_and_summarise() {
    let dir = temp_data_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let store = LedgerStore::new(&dir, "nba_all");
    let engine = UpsertEngine::new(
        "nba_all",
        EntityTable::new(),
        TrackingPolicy { min_edge: dec!(0.0) },
    );

    let game = Entity::Game {
        home: "celtics".to_string(),
        away: "knicks".to_string(),
    };
    let candidates = vec![
        Candidate {
            entity: game.clone(),
            market: Market::Spread,
            selection: Selection::Team("celtics".to_string()),
            line: dec!(-6.0),
            odds: -108,
            event_start: day2(19),
            edge: Some(dec!(0.06)),
            metadata: serde_json::Value::Null,
        },
        Candidate {
            entity: game.clone(),
            market: Market::Total,
            selection: Selection::Under,
            line: dec!(220.5),
            odds: -112,
            event_start: day2(19),
            edge: Some(dec!(0.05)),
            metadata: serde_json::Value::Null,
        },
        tatum_over(dec!(23.5), 150),
    ];

    let mut ledger = store.load().unwrap();
    let report = engine.upsert(&mut ledger, &candidates, day1(10)).unwrap();
    assert_eq!(report.inserted, 3);
    store.save(&ledger).unwrap();

    // Celtics win 112-98 (cover), total 210 (under wins), Tatum 21 (over
    // loses at +150).
    let outcomes = write_outcomes(
        &dir,
        r#"{"2026-03-14": {"knicks@celtics": {"home": 112, "away": 98}, "jayson_tatum": 21.0}}"#,
    );
    let provider = FileOutcomeProvider::from_path(&outcomes).unwrap();

    let mut ledger = store.load().unwrap();
    let report = settlement_engine().settle(&mut ledger, &provider, day2(23));
    assert_eq!(report.graded, 3);
    assert_eq!(report.wins, 2);
    assert_eq!(report.losses, 1);
    store.save(&ledger).unwrap();

    let summary = analytics::summarize(&store.load().unwrap(), &AnalyticsConfig::default());
    assert_eq!(summary.by_market["spread"].wins, 1);
    assert_eq!(summary.by_market["total"].wins, 1);
    assert_eq!(summary.by_market["player_prop"].losses, 1);
    assert_eq!(summary.by_selection["under"].wins, 1);
    assert_eq!(summary.by_selection["over"].losses, 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_outcomes_arriving_piecemeal() {
    let dir = temp_data_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let store = LedgerStore::new(&dir, "nba_props");

    let mut jokic = tatum_over(dec!(23.5), -110);
    jokic.entity = Entity::Player("Nikola Jokic".to_string());
    jokic.line = dec!(11.5);
    jokic.selection = Selection::Under;

    let mut ledger = store.load().unwrap();
    upsert_engine()
        .upsert(
            &mut ledger,
            &[tatum_over(dec!(23.5), -110), jokic],
            day1(10),
        )
        .unwrap();
    store.save(&ledger).unwrap();

    // First settlement pass: only one box score has landed.
    let outcomes = write_outcomes(&dir, r#"{"2026-03-14": {"jayson_tatum": 27.0}}"#);
    let provider = FileOutcomeProvider::from_path(&outcomes).unwrap();
    let mut ledger = store.load().unwrap();
    let report = settlement_engine().settle(&mut ledger, &provider, day2(23));
    assert_eq!(report.graded, 1);
    assert_eq!(report.skipped_missing_outcome, 1);
    store.save(&ledger).unwrap();

    // The late box score arrives; the next run grades only the remainder.
    let outcomes = write_outcomes(
        &dir,
        r#"{"2026-03-14": {"jayson_tatum": 27.0, "nikola_jokic": 10.0}}"#,
    );
    let provider = FileOutcomeProvider::from_path(&outcomes).unwrap();
    let mut ledger = store.load().unwrap();
    let report = settlement_engine().settle(&mut ledger, &provider, day2(23) + Duration::hours(2));
    assert_eq!(report.graded, 1);
    assert_eq!(report.skipped_missing_outcome, 0);
    assert_eq!(ledger.pending().count(), 0);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_crash_between_runs_loses_nothing() {
    let dir = temp_data_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let store = LedgerStore::new(&dir, "nba_props");

    let mut ledger = store.load().unwrap();
    upsert_engine()
        .upsert(&mut ledger, &[tatum_over(dec!(23.5), -110)], day1(10))
        .unwrap();
    store.save(&ledger).unwrap();

    // A later run dies mid-save, leaving a truncated temp file behind.
    let tmp = store.path().with_extension("json.tmp");
    std::fs::write(&tmp, "{\"family\": \"nba_props\", \"picks\": [{").unwrap();

    // The committed document is untouched; the next run proceeds normally.
    let ledger = store.load().unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(ledger.picks[0].is_pending());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_provider_lookup_uses_canonical_keys() {
    // The upsert engine canonicalises "Jayson Tatum" at ingestion, so the
    // outcome file keys on "jayson_tatum" — no fuzzy matching at grading.
    let dir = temp_data_dir();
    std::fs::create_dir_all(&dir).unwrap();

    let outcomes = write_outcomes(&dir, r#"{"2026-03-14": {"jayson_tatum": 27.0}}"#);
    let provider = FileOutcomeProvider::from_path(&outcomes).unwrap();

    let canonical = Entity::Player("jayson_tatum".to_string());
    let raw = Entity::Player("Jayson Tatum".to_string());
    let date = day2(19).date_naive();

    assert!(provider.lookup(&canonical, date).unwrap().is_some());
    // The raw form deliberately misses: canonicalisation happens once, at
    // the ledger boundary.
    assert!(provider.lookup(&raw, date).unwrap().is_none());

    match provider.lookup(&canonical, date).unwrap().unwrap() {
        OutcomeData::StatValue(v) => assert_eq!(v, dec!(27)),
        other => panic!("unexpected outcome {other:?}"),
    }

    std::fs::remove_dir_all(&dir).unwrap();
}
