//! TALLY — Pick Ledger & Settlement Engine
//!
//! Run-once entry point, invoked by an external scheduler. Each invocation
//! performs one `load → mutate → save` cycle against a single family's
//! ledger; overlapping runs against the same family must be excluded by the
//! scheduler. Candidate generation and outcome fetching live in the
//! surrounding scripts; this binary only keeps the books.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{error, info};

use tally::config::AppConfig;
use tally::engine::analytics;
use tally::engine::settlement::SettlementEngine;
use tally::engine::upsert::UpsertEngine;
use tally::providers::FileOutcomeProvider;
use tally::storage::LedgerStore;
use tally::types::{Candidate, Ledger, LedgerError};

const BANNER: &str = r#"
 _____  _    _     _  __   __
|_   _|/ \  | |   | | \ \ / /
  | | / _ \ | |   | |  \ V /
  | |/ ___ \| |___| |___| |
  |_/_/   \_\_____|_____|_|

  Pick Ledger & Settlement Engine
  v0.1.0 — one run per scheduler tick
"#;

const USAGE: &str = "\
Usage:
  tally track  <family> <candidates.json>   merge fresh candidates into the ledger
  tally settle <family> <outcomes.json>     grade pending picks against outcomes
  tally report <family>                     recompute and print the summary
  tally restore <family>                    recover the ledger from its latest backup
";

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let (command, family) = match (args.get(1), args.get(2)) {
        (Some(c), Some(f)) => (c.as_str(), f.as_str()),
        _ => {
            eprint!("{USAGE}");
            bail!("missing command or family");
        }
    };

    let config_path = std::env::var("TALLY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    println!("{BANNER}");
    info!(
        tracker = %cfg.tracker.name,
        command,
        family,
        config = %config_path,
        "TALLY starting"
    );

    let store = LedgerStore::new(&cfg.tracker.data_dir, family);

    match command {
        "track" => {
            let path = args.get(3).map(String::as_str);
            let Some(path) = path else {
                eprint!("{USAGE}");
                bail!("track requires a candidates file");
            };
            run_track(&cfg, &store, family, path)
        }
        "settle" => {
            let path = args.get(3).map(String::as_str);
            let Some(path) = path else {
                eprint!("{USAGE}");
                bail!("settle requires an outcomes file");
            };
            run_settle(&cfg, &store, path)
        }
        "report" => run_report(&cfg, &store),
        "restore" => run_restore(&store),
        other => {
            eprint!("{USAGE}");
            bail!("unknown command: {other}");
        }
    }
}

/// Merge a candidates file into the family ledger.
fn run_track(cfg: &AppConfig, store: &LedgerStore, family: &str, candidates_path: &str) -> Result<()> {
    let candidates = read_candidates(candidates_path)?;
    let mut ledger = load_or_advise(store)?;

    let engine = UpsertEngine::new(family, cfg.entity_table(), cfg.tracking_policy());
    let report = engine.upsert(&mut ledger, &candidates, Utc::now())?;

    refresh_summary(cfg, &mut ledger);
    store.save(&ledger)?;

    info!(
        %report,
        picks_total = ledger.len(),
        pending = ledger.pending().count(),
        "Track run complete"
    );
    Ok(())
}

/// Grade pending picks against an outcomes file.
fn run_settle(cfg: &AppConfig, store: &LedgerStore, outcomes_path: &str) -> Result<()> {
    let provider = FileOutcomeProvider::from_path(outcomes_path)?;
    let mut ledger = load_or_advise(store)?;

    let engine = SettlementEngine::new(cfg.settlement_config());
    let report = engine.settle(&mut ledger, &provider, Utc::now());

    refresh_summary(cfg, &mut ledger);
    store.save(&ledger)?;

    info!(
        %report,
        pending = ledger.pending().count(),
        "Settle run complete"
    );
    Ok(())
}

/// Recompute the summary and print it. Read-only: the analytics engine
/// never persists its own state.
fn run_report(cfg: &AppConfig, store: &LedgerStore) -> Result<()> {
    let ledger = load_or_advise(store)?;
    let summary = analytics::summarize(&ledger, &cfg.analytics_config());

    info!(
        family = %ledger.family,
        pending = summary.pending,
        overall = %summary.overall,
        clv_beats = summary.clv_beats,
        "Summary recomputed"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to render summary")?
    );
    Ok(())
}

/// Recover a corrupt ledger from its most recent backup.
fn run_restore(store: &LedgerStore) -> Result<()> {
    let backup = store.restore_latest_backup()?;
    let ledger = store.load()?;
    info!(
        restored_from = %backup.display(),
        picks = ledger.len(),
        "Ledger restored"
    );
    Ok(())
}

fn read_candidates(path: &str) -> Result<Vec<Candidate>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidates file: {path}"))?;
    let candidates: Vec<Candidate> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse candidates file: {path}"))?;
    info!(path, count = candidates.len(), "Candidates loaded");
    Ok(candidates)
}

/// Load the ledger, pointing the operator at the recovery path when the
/// document is corrupt. Never substitutes an empty ledger.
fn load_or_advise(store: &LedgerStore) -> Result<Ledger> {
    match store.load() {
        Ok(ledger) => Ok(ledger),
        Err(e @ LedgerError::Corruption { .. }) => {
            error!(error = %e, "Ledger is corrupt; run `tally restore <family>` to recover");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Refresh the persisted summary cache from the analytics engine. The
/// cache is a convenience for readers; `summarize` remains the authority.
fn refresh_summary(cfg: &AppConfig, ledger: &mut Ledger) {
    ledger.summary = Some(analytics::summarize(ledger, &cfg.analytics_config()));
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tally=info"));

    let json_logging = std::env::var("TALLY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
