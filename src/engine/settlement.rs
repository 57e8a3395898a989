//! Settlement engine.
//!
//! Transitions pending picks to a terminal result using outcomes from an
//! [`OutcomeProvider`] and per-market grading rules. A pick is settled at
//! most once; profit is computed from the odds captured at tracking time
//! (`opening_odds`), never from later line movement.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::providers::OutcomeProvider;
use crate::types::{Entity, Ledger, Market, OutcomeData, Pick, PickStatus, Selection, UNIT_STAKE};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settlement configuration, passed in explicitly by the caller.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// How long after `event_start` a pick becomes eligible for grading.
    /// Games need time to finalise; box scores trickle in late.
    pub cooldown: Duration,
    /// Stake per pick in minor units.
    pub unit_stake: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::hours(3),
            unit_stake: UNIT_STAKE,
        }
    }
}

// ---------------------------------------------------------------------------
// Grading
// ---------------------------------------------------------------------------

/// Terminal result of grading one pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Win,
    Loss,
    Push,
}

impl Grade {
    pub fn status(&self) -> PickStatus {
        match self {
            Grade::Win => PickStatus::Win,
            Grade::Loss => PickStatus::Loss,
            Grade::Push => PickStatus::Push,
        }
    }
}

/// A fully graded outcome ready to apply to a pick.
#[derive(Debug, Clone)]
pub struct Graded {
    pub grade: Grade,
    /// The observed value the pick was graded on (margin, total, or stat).
    pub actual_value: Decimal,
    /// Human-readable grading note stored in `result`.
    pub note: String,
}

/// Outcome data was present but insufficient or contradictory; the pick
/// stays pending and is retried on a later run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguous(pub String);

impl std::fmt::Display for Ambiguous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grade a pick against reported outcome data using its market's rule.
///
/// Grades against `opening_line` — the number the recommendation was made
/// at — mirroring the profit contract on `opening_odds`.
pub fn grade_pick(pick: &Pick, outcome: &OutcomeData) -> Result<Graded, Ambiguous> {
    match pick.market {
        Market::Spread => grade_spread(pick, outcome),
        Market::Total => grade_total(pick, outcome),
        Market::PlayerProp => grade_prop(pick, outcome),
    }
}

/// Spread: signed margin from the selected team's perspective, offset by
/// the line. `margin + line > 0` wins, `== 0` pushes, `< 0` loses.
fn grade_spread(pick: &Pick, outcome: &OutcomeData) -> Result<Graded, Ambiguous> {
    let (home, away) = match &pick.entity {
        Entity::Game { home, away } => (home, away),
        Entity::Player(_) => return Err(Ambiguous("spread pick bound to a player".into())),
    };
    let team = match &pick.selection {
        Selection::Team(t) => t,
        _ => return Err(Ambiguous("spread pick without a team selection".into())),
    };
    let (home_score, away_score) = both_scores(outcome)?;

    let margin = if team == home {
        home_score - away_score
    } else if team == away {
        away_score - home_score
    } else {
        // Canonical id matches neither side of the game key; refuse
        // rather than guess a perspective.
        return Err(Ambiguous(format!("selection {team} is not {away}@{home}")));
    };

    let margin = Decimal::from(margin);
    let covered = margin + pick.opening_line;
    let grade = if covered > Decimal::ZERO {
        Grade::Win
    } else if covered == Decimal::ZERO {
        Grade::Push
    } else {
        Grade::Loss
    };

    let sign = if margin >= Decimal::ZERO { "+" } else { "" };
    Ok(Graded {
        grade,
        actual_value: margin,
        note: format!(
            "{home_score}-{away_score}, {team} margin {sign}{margin} vs line {}",
            pick.opening_line
        ),
    })
}

/// Total: combined score against the line in the bet's direction; equality
/// is a push.
fn grade_total(pick: &Pick, outcome: &OutcomeData) -> Result<Graded, Ambiguous> {
    let (home_score, away_score) = both_scores(outcome)?;
    let total = Decimal::from(home_score + away_score);
    let grade = grade_direction(&pick.selection, total, pick.opening_line, true)?;

    Ok(Graded {
        grade,
        actual_value: total,
        note: format!(
            "total {total} vs {} {}",
            pick.selection, pick.opening_line
        ),
    })
}

/// Player prop: actual stat against the line in the bet's direction.
/// Equality pushes only on whole-number lines — half-point lines cannot
/// push, so a fractional-line tie means the reported stat is malformed.
fn grade_prop(pick: &Pick, outcome: &OutcomeData) -> Result<Graded, Ambiguous> {
    let actual = match outcome {
        OutcomeData::StatValue(v) => *v,
        OutcomeData::GameScore { .. } => {
            return Err(Ambiguous("game score reported for a player prop".into()))
        }
    };
    let grade = grade_direction(&pick.selection, actual, pick.opening_line, false)?;

    Ok(Graded {
        grade,
        actual_value: actual,
        note: format!(
            "actual {actual} vs {} {}",
            pick.selection, pick.opening_line
        ),
    })
}

/// Shared over/under comparison. `push_on_any_tie` distinguishes totals
/// (tie always pushes) from props (tie pushes only on whole lines).
fn grade_direction(
    selection: &Selection,
    actual: Decimal,
    line: Decimal,
    push_on_any_tie: bool,
) -> Result<Grade, Ambiguous> {
    if actual == line {
        if push_on_any_tie || line.is_integer() {
            return Ok(Grade::Push);
        }
        return Err(Ambiguous(format!(
            "actual {actual} ties fractional line {line}"
        )));
    }
    let over_won = actual > line;
    match selection {
        Selection::Over => Ok(if over_won { Grade::Win } else { Grade::Loss }),
        Selection::Under => Ok(if over_won { Grade::Loss } else { Grade::Win }),
        Selection::Team(t) => Err(Ambiguous(format!(
            "team selection {t} on an over/under market"
        ))),
    }
}

fn both_scores(outcome: &OutcomeData) -> Result<(i64, i64), Ambiguous> {
    match outcome {
        OutcomeData::GameScore {
            home: Some(h),
            away: Some(a),
        } => Ok((*h, *a)),
        OutcomeData::GameScore { home, away } => Err(Ambiguous(format!(
            "incomplete score {}-{}",
            home.map_or("?".to_string(), |v| v.to_string()),
            away.map_or("?".to_string(), |v| v.to_string()),
        ))),
        OutcomeData::StatValue(_) => Err(Ambiguous("stat value reported for a game market".into())),
    }
}

// ---------------------------------------------------------------------------
// Profit
// ---------------------------------------------------------------------------

/// Profit in minor units for a winning pick at the given American odds,
/// rounded to the nearest minor unit. Always fed `opening_odds`: the odds
/// actually available when the pick was tracked.
pub fn profit_on_win(opening_odds: i32, stake: i64) -> i64 {
    if opening_odds < 0 {
        let risk = -(opening_odds as i64);
        (stake * 100 + risk / 2) / risk
    } else {
        (stake * opening_odds as i64 + 50) / 100
    }
}

fn profit_for(grade: Grade, opening_odds: i32, stake: i64) -> i64 {
    match grade {
        Grade::Win => profit_on_win(opening_odds, stake),
        Grade::Loss => -stake,
        Grade::Push => 0,
    }
}

// ---------------------------------------------------------------------------
// Settlement report
// ---------------------------------------------------------------------------

/// Explicit per-reason counts for one settlement batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub graded: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    /// Eligible but the provider has no outcome yet; retried next run.
    pub skipped_missing_outcome: usize,
    /// Outcome present but insufficient to grade; retried next run.
    pub skipped_ambiguous: usize,
    /// Still inside the post-start cooldown window.
    pub skipped_not_due: usize,
    /// Provider errors; isolated per pick, retried next run.
    pub lookup_failures: usize,
}

impl std::fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "graded={} (W{}/L{}/P{}) missing={} ambiguous={} not_due={} lookup_failures={}",
            self.graded,
            self.wins,
            self.losses,
            self.pushes,
            self.skipped_missing_outcome,
            self.skipped_ambiguous,
            self.skipped_not_due,
            self.lookup_failures,
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine {
    config: SettlementConfig,
}

impl SettlementEngine {
    pub fn new(config: SettlementConfig) -> Self {
        Self { config }
    }

    /// Settle every eligible pending pick.
    ///
    /// Eligibility: `status == pending` and `event_start + cooldown` in the
    /// past. Terminal picks are never touched, so repeat runs are no-ops.
    /// A provider failure for one pick is logged and counted; the rest of
    /// the batch still settles.
    pub fn settle(
        &self,
        ledger: &mut Ledger,
        provider: &dyn OutcomeProvider,
        now: DateTime<Utc>,
    ) -> SettlementReport {
        let mut report = SettlementReport::default();

        for pick in ledger.picks.iter_mut() {
            if !pick.is_pending() {
                continue;
            }
            if pick.event_start + self.config.cooldown > now {
                report.skipped_not_due += 1;
                continue;
            }

            let date = pick.event_start.date_naive();
            let outcome = match provider.lookup(&pick.entity, date) {
                Ok(Some(outcome)) => outcome,
                Ok(None) => {
                    debug!(pick_id = %pick.pick_id, %date, "Outcome not yet available");
                    report.skipped_missing_outcome += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        pick_id = %pick.pick_id,
                        provider = provider.name(),
                        error = %e,
                        "Outcome lookup failed; pick stays pending"
                    );
                    report.lookup_failures += 1;
                    continue;
                }
            };

            match grade_pick(pick, &outcome) {
                Ok(graded) => {
                    let profit =
                        profit_for(graded.grade, pick.opening_odds, self.config.unit_stake);
                    pick.status = graded.grade.status();
                    pick.actual_value = Some(graded.actual_value);
                    pick.result = Some(graded.note);
                    pick.profit_loss = Some(profit);
                    pick.graded_at = Some(now);

                    info!(
                        pick_id = %pick.pick_id,
                        status = %pick.status,
                        profit_loss = profit,
                        result = pick.result.as_deref().unwrap_or(""),
                        "Pick settled"
                    );

                    report.graded += 1;
                    match graded.grade {
                        Grade::Win => report.wins += 1,
                        Grade::Loss => report.losses += 1,
                        Grade::Push => report.pushes += 1,
                    }
                }
                Err(ambiguous) => {
                    warn!(
                        pick_id = %pick.pick_id,
                        reason = %ambiguous,
                        "Outcome ambiguous; pick stays pending"
                    );
                    report.skipped_ambiguous += 1;
                }
            }
        }

        if report.graded > 0 {
            ledger.updated_at = now;
        }

        info!(family = %ledger.family, %report, "Settlement complete");
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
