//! Analytics engine.
//!
//! Recomputes aggregate and rolling-window performance statistics from the
//! ledger's terminal picks. Recomputation is total: no counter survives
//! between calls, so repeated reads over an unchanged ledger are
//! byte-identical. This replaces the legacy scripts' incremented summary
//! counters, which drifted whenever a run was repeated.

use std::collections::BTreeMap;

use crate::types::{Ledger, MetricBlock, Pick, PickStatus, Selection, Summary, UNIT_STAKE};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Analytics configuration, passed in explicitly by the caller.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Stake per pick in minor units; the ROI denominator.
    pub unit_stake: i64,
    /// Rolling window sizes (most recent N terminal picks).
    pub windows: Vec<u64>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            unit_stake: UNIT_STAKE,
            windows: vec![10, 20, 50],
        }
    }
}

// ---------------------------------------------------------------------------
// Summarise
// ---------------------------------------------------------------------------

/// Compute the full summary for a ledger. Pure: reads the ledger, writes
/// nothing.
pub fn summarize(ledger: &Ledger, config: &AnalyticsConfig) -> Summary {
    // Terminal picks, most recently graded first. Ties break on pick id so
    // the ordering (and therefore the serialised summary) is stable.
    let mut terminal: Vec<&Pick> = ledger.terminal().collect();
    terminal.sort_by(|a, b| {
        let at = a.graded_at.unwrap_or(a.tracked_at);
        let bt = b.graded_at.unwrap_or(b.tracked_at);
        bt.cmp(&at).then_with(|| a.pick_id.cmp(&b.pick_id))
    });

    let mut by_market: BTreeMap<String, Vec<&Pick>> = BTreeMap::new();
    let mut by_selection: BTreeMap<String, Vec<&Pick>> = BTreeMap::new();
    for &pick in &terminal {
        by_market
            .entry(pick.market.key().to_string())
            .or_default()
            .push(pick);
        if matches!(pick.selection, Selection::Over | Selection::Under) {
            by_selection
                .entry(pick.selection.key().to_string())
                .or_default()
                .push(pick);
        }
    }

    let rolling = config
        .windows
        .iter()
        .map(|&n| {
            let window = &terminal[..terminal.len().min(n as usize)];
            (n, metric_block(window, config.unit_stake))
        })
        .collect();

    Summary {
        // Stamped from the ledger, not the wall clock, so an unchanged
        // ledger summarises identically.
        generated_at: Some(ledger.updated_at),
        pending: ledger.pending().count() as u64,
        overall: metric_block(&terminal, config.unit_stake),
        by_market: by_market
            .into_iter()
            .map(|(k, picks)| (k, metric_block(&picks, config.unit_stake)))
            .collect(),
        by_selection: by_selection
            .into_iter()
            .map(|(k, picks)| (k, metric_block(&picks, config.unit_stake)))
            .collect(),
        rolling,
        clv_beats: terminal.iter().filter(|p| p.beat_closing_odds()).count() as u64,
    }
}

/// Metrics over a set of terminal picks.
fn metric_block(picks: &[&Pick], unit_stake: i64) -> MetricBlock {
    let mut block = MetricBlock::default();
    let mut profit_minor: i64 = 0;

    for pick in picks {
        match pick.status {
            PickStatus::Win => block.wins += 1,
            PickStatus::Loss => block.losses += 1,
            PickStatus::Push => block.pushes += 1,
            PickStatus::Pending => continue,
        }
        profit_minor += pick.profit_loss.unwrap_or(0);
    }

    let decided = block.wins + block.losses;
    block.win_rate = if decided == 0 {
        0.0
    } else {
        block.wins as f64 / decided as f64
    };

    block.profit_units = profit_minor as f64 / unit_stake as f64;

    let staked = block.terminal_count() as i64 * unit_stake;
    block.roi = if staked == 0 {
        0.0
    } else {
        profit_minor as f64 / staked as f64
    };

    block
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
