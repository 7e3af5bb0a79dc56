//! Per-caller call and token counters for one pipeline run.
//!
//! Token counts are whitespace word counts of prompt + reply, a coarse
//! estimate. Not synchronized: each run owns its own ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counters for one caller identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub num_api_calls: u64,
    pub total_tokens: u64,
}

/// Externalized form: caller id → counters, ordered by caller id.
pub type UsageSnapshot = BTreeMap<String, UsageRecord>;

#[derive(Debug, Default)]
pub struct UsageLedger {
    entries: BTreeMap<String, UsageRecord>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call and `tokens` against `caller_id`.
    pub fn record(&mut self, caller_id: &str, tokens: u64) {
        let entry = self.entries.entry(caller_id.to_string()).or_insert_with(|| {
            tracing::debug!(caller = caller_id, "first call, creating usage entry");
            UsageRecord::default()
        });
        entry.num_api_calls += 1;
        entry.total_tokens += tokens;
        tracing::debug!(
            caller = caller_id,
            calls = entry.num_api_calls,
            tokens = entry.total_tokens,
            "usage recorded"
        );
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.entries.clone()
    }

    pub fn reset(&mut self) {
        tracing::debug!(tracked = self.entries.len(), "resetting usage ledger");
        self.entries.clear();
    }
}

/// Word-count estimate used for usage accounting.
pub fn estimate_tokens(prompt: &str, reply: &str) -> u64 {
    (prompt.split_whitespace().count() + reply.split_whitespace().count()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_caller() {
        let mut ledger = UsageLedger::new();
        ledger.record("coder_agent", 10);
        ledger.record("coder_agent", 5);
        ledger.record("planner_agent", 7);

        let snap = ledger.snapshot();
        assert_eq!(
            snap["coder_agent"],
            UsageRecord {
                num_api_calls: 2,
                total_tokens: 15
            }
        );
        assert_eq!(snap["planner_agent"].num_api_calls, 1);
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn reset_clears_everything() {
        let mut ledger = UsageLedger::new();
        ledger.record("tester_agent", 3);
        ledger.reset();
        assert!(ledger.snapshot().is_empty());
    }

    #[test]
    fn snapshot_json_shape() {
        let mut ledger = UsageLedger::new();
        ledger.record("planner_agent", 42);
        let json = serde_json::to_value(ledger.snapshot()).unwrap();
        assert_eq!(json["planner_agent"]["numApiCalls"], 1);
        assert_eq!(json["planner_agent"]["totalTokens"], 42);
    }

    #[test]
    fn token_estimate_counts_words() {
        assert_eq!(estimate_tokens("one two  three", "four\nfive"), 5);
        assert_eq!(estimate_tokens("", "   "), 0);
    }
}
