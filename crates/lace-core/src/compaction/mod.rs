//! Compaction engine (spec.md §4.4): a strategy registry keyed by
//! identifier. Each strategy is pure at its boundary — given an event list
//! and a parameter bag, it returns a candidate COMPACTION payload; the
//! engine never deletes events itself.

pub mod summarize;
pub mod trim;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CompactionResult;
use crate::model::Event;

pub use summarize::SummarizeStrategy;
pub use trim::TrimToolResultsStrategy;

/// Candidate payload a strategy hands back to the thread store, which
/// appends it as the single new COMPACTION event.
pub struct CompactionCandidate {
    pub strategy_id: String,
    pub original_event_count: usize,
    pub compacted_events: Vec<Event>,
}

#[async_trait]
pub trait CompactionStrategy: Send + Sync {
    fn id(&self) -> &'static str;

    async fn compact(
        &self,
        events: &[Event],
        params: &Value,
    ) -> CompactionResult<CompactionCandidate>;
}

/// Registry of compaction strategies keyed by identifier, mirroring the
/// shape of `tools::ToolRegistry`'s `HashMap<String, Arc<dyn Tool>>`.
#[derive(Default)]
pub struct CompactionRegistry {
    strategies: HashMap<String, Arc<dyn CompactionStrategy>>,
}

impl CompactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the two built-in strategies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TrimToolResultsStrategy::default()));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn CompactionStrategy>) {
        self.strategies.insert(strategy.id().to_string(), strategy);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn CompactionStrategy>> {
        self.strategies.get(id).cloned()
    }

    pub async fn compact(
        &self,
        strategy_id: &str,
        events: &[Event],
        params: &Value,
    ) -> CompactionResult<CompactionCandidate> {
        let strategy = self
            .get(strategy_id)
            .ok_or_else(|| crate::error::CompactionError::UnknownStrategy(strategy_id.to_string()))?;
        strategy.compact(events, params).await
    }
}

/// Estimates token count for a conversation when a provider-reported count
/// is unavailable: roughly 1 token per 4 characters (spec.md §4.4).
pub fn estimate_tokens(events: &[Event]) -> usize {
    events
        .iter()
        .map(|e| serde_json::to_string(&e.payload).map(|s| s.len()).unwrap_or(0))
        .sum::<usize>()
        / 4
}

/// Whether compaction should run before the next provider call: compares
/// estimated or actual token usage against the context window minus a
/// safety margin.
pub fn should_compact(used_tokens: usize, context_window: usize, safety_margin: f64) -> bool {
    let budget = (context_window as f64 * (1.0 - safety_margin)) as usize;
    used_tokens >= budget
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compaction_trigger_respects_safety_margin() {
        assert!(!should_compact(1000, 10_000, 0.2));
        assert!(should_compact(8500, 10_000, 0.2));
    }
}
