//! Per-request token accounting
//!
//! One `UsageLedger` belongs to one analysis request and is passed by `&mut`
//! to every stage. Nothing here is process-wide.

use serde::Serialize;
use tracing::debug;

use super::TokenUsage;

/// Usage recorded under one stage label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEntry {
    pub stage: String,
    pub calls: u32,
    pub usage: TokenUsage,
}

/// Accumulates provider-reported usage per stage
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageLedger {
    entries: Vec<UsageEntry>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one provider call under `stage`
    pub fn record(&mut self, stage: &str, usage: &TokenUsage) {
        debug!(%stage, input = usage.input_tokens, output = usage.output_tokens, "UsageLedger::record: called");
        match self.entries.iter_mut().find(|e| e.stage == stage) {
            Some(entry) => {
                entry.calls += 1;
                entry.usage.add(usage);
            }
            None => self.entries.push(UsageEntry {
                stage: stage.to_string(),
                calls: 1,
                usage: *usage,
            }),
        }
    }

    /// Usage recorded for one stage, if any
    pub fn stage(&self, stage: &str) -> Option<&UsageEntry> {
        self.entries.iter().find(|e| e.stage == stage)
    }

    /// Entries in first-recorded order
    pub fn entries(&self) -> &[UsageEntry] {
        &self.entries
    }

    /// Sum across all stages
    pub fn total(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for entry in &self.entries {
            total.add(&entry.usage);
        }
        total
    }

    /// Number of provider calls across all stages
    pub fn calls(&self) -> u32 {
        self.entries.iter().map(|e| e.calls).sum()
    }
}
