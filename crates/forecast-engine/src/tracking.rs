use dashmap::DashSet;
use std::collections::BTreeSet;

/// Symbols subscribed for live updates. Membership changes are idempotent
/// and never contend with model locks.
#[derive(Debug, Default)]
pub struct TrackingSet {
    symbols: DashSet<String>,
}

impl TrackingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the symbol was newly added.
    pub fn track(&self, symbol: &str) -> bool {
        self.symbols.insert(symbol.to_string())
    }

    /// Returns true if the symbol was present.
    pub fn untrack(&self, symbol: &str) -> bool {
        self.symbols.remove(symbol).is_some()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Point-in-time copy, sorted for stable iteration.
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.symbols.iter().map(|s| s.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Trimmed, upper-cased ticker; `None` for blank input.
pub fn normalize_symbol(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}
