//! Configuration loading from TOML.
//!
//! Reads `config.toml` into strongly-typed structs. Nothing in the engines
//! reads ambient globals: thresholds, stakes, and windows travel from here
//! into explicit engine configuration at startup.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::engine::analytics::AnalyticsConfig;
use crate::engine::settlement::SettlementConfig;
use crate::engine::upsert::TrackingPolicy;
use crate::identity::EntityTable;
use crate::types::UNIT_STAKE;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub tracking: TrackingSection,
    #[serde(default)]
    pub settlement: SettlementSection,
    #[serde(default)]
    pub analytics: AnalyticsSection,
    /// Alias → canonical entity id map, applied at ingestion.
    #[serde(default)]
    pub entities: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    pub name: String,
    /// Directory holding one `<family>.json` ledger per family.
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingSection {
    /// Minimum opaque edge score a candidate needs to be tracked.
    pub min_edge: Decimal,
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            min_edge: Decimal::new(5, 2), // 0.05
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementSection {
    /// Hours after `event_start` before a pick becomes gradeable.
    pub cooldown_hours: i64,
    /// Stake per pick in minor units.
    pub unit_stake: i64,
}

impl Default for SettlementSection {
    fn default() -> Self {
        Self {
            cooldown_hours: 3,
            unit_stake: UNIT_STAKE,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsSection {
    /// Rolling window sizes for the summary.
    pub windows: Vec<u64>,
}

impl Default for AnalyticsSection {
    fn default() -> Self {
        Self {
            windows: vec![10, 20, 50],
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    pub fn tracking_policy(&self) -> TrackingPolicy {
        TrackingPolicy {
            min_edge: self.tracking.min_edge,
        }
    }

    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            cooldown: chrono::Duration::hours(self.settlement.cooldown_hours),
            unit_stake: self.settlement.unit_stake,
        }
    }

    pub fn analytics_config(&self) -> AnalyticsConfig {
        AnalyticsConfig {
            unit_stake: self.settlement.unit_stake,
            windows: self.analytics.windows.clone(),
        }
    }

    pub fn entity_table(&self) -> EntityTable {
        EntityTable::from_aliases(&self.entities)
    }
}
