//! Core engine — upsert, settlement, and analytics over one ledger.

pub mod analytics;
pub mod settlement;
pub mod upsert;
