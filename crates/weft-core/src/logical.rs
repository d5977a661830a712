//! Logical dependencies: truth maintenance for derived facts.
//!
//! A fact asserted under logical support records the partial match (the
//! terminal token) that justified it. When a support token is withdrawn
//! from its terminal memory the fact loses that support; a fact whose last
//! support disappears is retracted, cascading through anything it
//! supported in turn.

use std::collections::{HashMap, HashSet};

use crate::beta::TokenId;
use crate::fact::FactId;

#[derive(Debug, Default)]
pub struct LogicalIndex {
    /// fact → the tokens currently supporting it.
    supports_of: HashMap<FactId, HashSet<TokenId>>,
    /// token → the facts it supports (the reverse index).
    supported_by: HashMap<TokenId, HashSet<FactId>>,
}

impl LogicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, fact: FactId, token: TokenId) {
        self.supports_of.entry(fact).or_default().insert(token);
        self.supported_by.entry(token).or_default().insert(fact);
    }

    /// Withdraw one support token. Returns the facts left with no support
    /// at all; the caller retracts them.
    pub fn withdraw_support(&mut self, token: TokenId) -> Vec<FactId> {
        let Some(facts) = self.supported_by.remove(&token) else {
            return Vec::new();
        };
        let mut orphaned = Vec::new();
        for fact in facts {
            if let Some(tokens) = self.supports_of.get_mut(&fact) {
                tokens.remove(&token);
                if tokens.is_empty() {
                    self.supports_of.remove(&fact);
                    orphaned.push(fact);
                }
            }
        }
        orphaned
    }

    /// Drop all support bookkeeping for an explicitly retracted fact.
    pub fn remove_fact(&mut self, fact: FactId) {
        if let Some(tokens) = self.supports_of.remove(&fact) {
            for token in tokens {
                if let Some(facts) = self.supported_by.get_mut(&token) {
                    facts.remove(&fact);
                    if facts.is_empty() {
                        self.supported_by.remove(&token);
                    }
                }
            }
        }
    }

    pub fn is_supported(&self, fact: FactId) -> bool {
        self.supports_of.contains_key(&fact)
    }

    pub fn support_count(&self, fact: FactId) -> usize {
        self.supports_of.get(&fact).map_or(0, HashSet::len)
    }

    pub fn len(&self) -> usize {
        self.supports_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supports_of.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_with_two_supports_survives_one_withdrawal() {
        let mut index = LogicalIndex::new();
        index.add(10, 1);
        index.add(10, 2);
        assert!(index.withdraw_support(1).is_empty());
        assert!(index.is_supported(10));
        assert_eq!(index.withdraw_support(2), vec![10]);
        assert!(!index.is_supported(10));
    }

    #[test]
    fn explicit_retraction_clears_reverse_index() {
        let mut index = LogicalIndex::new();
        index.add(10, 1);
        index.add(11, 1);
        index.remove_fact(10);
        assert_eq!(index.withdraw_support(1), vec![11]);
    }
}
