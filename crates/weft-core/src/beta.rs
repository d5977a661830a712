//! Beta Network: joins and the partial-match engine.
//!
//! Join nodes combine a left input of partial matches (tokens) with a
//! right input of facts from an alpha memory. The first join of a chain
//! reads the dummy top (one empty tuple); each successor extends tokens by
//! one pattern position. A negated join passes its left tokens through
//! while no right fact matches them, maintaining a per-token match count.
//!
//! ```text
//! dummy top → join 0 → join 1 → … → terminal → agenda
//!                ↑         ↑
//!            alpha mem  alpha mem
//! ```
//!
//! Propagation is depth-first from the event source and strictly
//! single-threaded: a right insertion scans the left memory (probing a
//! hash sub-bucket when the memory is partitioned on a tested slot),
//! emits extended tokens to the successor, and recurses before returning.
//! Withdrawal walks the same edges in reverse, dropping descendants by
//! parent link and releasing logical supports at terminals.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use tracing::warn;
use weft_types::Value;

use crate::alpha::{AlphaMemoryId, AlphaNetwork};
use crate::fact::FactId;
use crate::fact_store::FactStore;
use crate::logical::LogicalIndex;

pub type JoinId = u32;
pub type TerminalId = u32;
pub type TokenId = u64;
pub type RuleId = u32;

/// Equality test between a slot of an earlier pattern's fact and a slot of
/// the fact entering on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTest {
    pub left_pattern: usize,
    pub left_slot: usize,
    pub right_slot: usize,
}

/// Resolved bindings handed to a join predicate.
pub struct JoinBindings<'a> {
    store: &'a FactStore,
    left: &'a [Option<FactId>],
    right: &'a [Value],
}

impl JoinBindings<'_> {
    /// Slot value of the fact bound at an earlier pattern position. `None`
    /// for negated positions and out-of-range indices.
    pub fn left_slot(&self, pattern: usize, slot: usize) -> Option<Value> {
        let fact = (*self.left.get(pattern)?)?;
        self.store.fact(fact)?.slots.get(slot).cloned()
    }

    /// Slot value of the fact entering on the right.
    pub fn right_slot(&self, slot: usize) -> Option<&Value> {
        self.right.get(slot)
    }
}

/// Arbitrary host predicate over the combined bindings of a join. The
/// declared dependencies feed the changed-slot analysis of modify, so they
/// must cover every slot the closure reads.
#[derive(Clone)]
pub struct JoinPredicate {
    pub label: String,
    pub left_deps: Vec<(usize, usize)>,
    pub right_deps: Vec<usize>,
    pub test: Rc<dyn Fn(&JoinBindings<'_>) -> bool>,
}

impl JoinPredicate {
    pub fn new<F>(label: &str, left_deps: Vec<(usize, usize)>, right_deps: Vec<usize>, test: F) -> Self
    where
        F: Fn(&JoinBindings<'_>) -> bool + 'static,
    {
        Self { label: label.to_string(), left_deps, right_deps, test: Rc::new(test) }
    }
}

impl fmt::Debug for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JoinPredicate({})", self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Successor {
    Join(JoinId),
    Terminal(TerminalId),
}

/// A partial match: one fact (or a negated-position hole) per pattern
/// position filled so far.
#[derive(Debug, Clone)]
pub struct Token {
    pub id: TokenId,
    pub facts: Vec<Option<FactId>>,
    pub parent: Option<TokenId>,
}

#[derive(Debug)]
pub struct JoinNode {
    pub id: JoinId,
    pub rule: RuleId,
    /// Pattern position this join's right input fills.
    pub position: usize,
    pub negated: bool,
    pub right_mem: AlphaMemoryId,
    pub tests: Vec<JoinTest>,
    pub predicate: Option<JoinPredicate>,
    /// Test whose right slot equals the memory's partition slot, enabling
    /// sub-bucket probing.
    pub hash_probe: Option<JoinTest>,
    pub predecessor: Option<JoinId>,
    pub successor: Option<Successor>,
    /// Output memory: tokens this join has emitted, in emission order.
    pub out: BTreeMap<TokenId, Token>,
    /// Negated joins: matching right-fact count per left token.
    pub counts: HashMap<TokenId, u32>,
    warned: bool,
    pub attempts: u64,
    pub matches: u64,
}

impl JoinNode {
    pub(crate) fn new(
        rule: RuleId,
        position: usize,
        negated: bool,
        right_mem: AlphaMemoryId,
        tests: Vec<JoinTest>,
        predicate: Option<JoinPredicate>,
        hash_probe: Option<JoinTest>,
        predecessor: Option<JoinId>,
    ) -> Self {
        Self {
            id: 0,
            rule,
            position,
            negated,
            right_mem,
            tests,
            predicate,
            hash_probe,
            predecessor,
            successor: None,
            out: BTreeMap::new(),
            counts: HashMap::new(),
            warned: false,
            attempts: 0,
            matches: 0,
        }
    }

    pub fn memory_len(&self) -> usize {
        self.out.len()
    }
}

#[derive(Debug)]
pub struct TerminalNode {
    pub id: TerminalId,
    pub rule: RuleId,
    pub rule_name: String,
    pub logical: bool,
    pub input: JoinId,
}

/// A complete match delivered to the host. Facts are listed per pattern
/// position; negated positions hold `None`.
#[derive(Debug, Clone)]
pub struct Activation {
    pub rule: RuleId,
    pub rule_name: String,
    pub token: TokenId,
    pub facts: Vec<Option<FactId>>,
    pub logical: bool,
}

/// The agenda of rule activations awaiting the host. Entries are removed
/// automatically when their token is withdrawn.
#[derive(Debug, Default)]
pub struct Agenda {
    entries: Vec<Activation>,
}

impl Agenda {
    pub fn push(&mut self, activation: Activation) {
        self.entries.push(activation);
    }

    pub fn remove_token(&mut self, token: TokenId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|a| a.token != token);
        self.entries.len() != before
    }

    pub fn take_all(&mut self) -> Vec<Activation> {
        std::mem::take(&mut self.entries)
    }

    pub fn entries(&self) -> &[Activation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
pub struct BetaNetwork {
    pub(crate) joins: Vec<JoinNode>,
    pub(crate) terminals: Vec<TerminalNode>,
    by_right: HashMap<AlphaMemoryId, Vec<JoinId>>,
    next_token: TokenId,
    warn_threshold: usize,
}

impl BetaNetwork {
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            joins: Vec::new(),
            terminals: Vec::new(),
            by_right: HashMap::new(),
            next_token: 1,
            warn_threshold,
        }
    }

    pub(crate) fn add_join(&mut self, mut join: JoinNode) -> JoinId {
        let id = self.joins.len() as JoinId;
        join.id = id;
        self.by_right.entry(join.right_mem).or_default().push(id);
        self.joins.push(join);
        id
    }

    pub(crate) fn add_terminal(
        &mut self,
        rule: RuleId,
        rule_name: String,
        logical: bool,
        input: JoinId,
    ) -> TerminalId {
        let id = self.terminals.len() as TerminalId;
        self.terminals.push(TerminalNode { id, rule, rule_name, logical, input });
        self.joins[input as usize].successor = Some(Successor::Terminal(id));
        id
    }

    pub(crate) fn joins_on(&self, memory: AlphaMemoryId) -> Vec<JoinId> {
        self.by_right.get(&memory).cloned().unwrap_or_default()
    }

    pub fn join(&self, id: JoinId) -> &JoinNode {
        &self.joins[id as usize]
    }

    pub fn joins(&self) -> impl Iterator<Item = &JoinNode> {
        self.joins.iter()
    }

    pub fn terminals(&self) -> impl Iterator<Item = &TerminalNode> {
        self.terminals.iter()
    }

    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    pub fn token_count(&self) -> usize {
        self.joins.iter().map(|j| j.out.len()).sum()
    }

    /// True while `token` sits in the output memory feeding a terminal,
    /// i.e. the partial match behind an activation is still live.
    pub fn terminal_token_live(&self, token: TokenId) -> bool {
        self.terminals
            .iter()
            .any(|t| self.joins[t.input as usize].out.contains_key(&token))
    }
}

fn join_tests_pass(
    store: &FactStore,
    tests: &[JoinTest],
    predicate: Option<&JoinPredicate>,
    left: &[Option<FactId>],
    right: &[Value],
) -> bool {
    for test in tests {
        let Some(Some(left_fact)) = left.get(test.left_pattern) else {
            return false;
        };
        let Some(left_value) =
            store.fact(*left_fact).and_then(|f| f.slots.get(test.left_slot))
        else {
            return false;
        };
        let Some(right_value) = right.get(test.right_slot) else {
            return false;
        };
        if left_value != right_value {
            return false;
        }
    }
    if let Some(pred) = predicate {
        let bindings = JoinBindings { store, left, right };
        if !(pred.test)(&bindings) {
            return false;
        }
    }
    true
}

/// Mutable view over every subsystem a propagation touches. Built by the
/// environment for the duration of one event; facts retracted by logical
/// cascade are queued on `pending_retracts` and processed by the caller
/// before the event is considered quiescent.
pub(crate) struct MatchCtx<'a> {
    pub store: &'a mut FactStore,
    pub alpha: &'a mut AlphaNetwork,
    pub beta: &'a mut BetaNetwork,
    pub logical: &'a mut LogicalIndex,
    pub agenda: &'a mut Agenda,
    pub pending_retracts: &'a mut Vec<FactId>,
}

impl MatchCtx<'_> {
    fn join_params(&self, join: JoinId) -> (bool, Vec<JoinTest>, Option<JoinPredicate>) {
        let j = &self.beta.joins[join as usize];
        (j.negated, j.tests.clone(), j.predicate.clone())
    }

    fn left_tokens(&self, join: JoinId) -> Vec<(Option<TokenId>, Vec<Option<FactId>>)> {
        match self.beta.joins[join as usize].predecessor {
            None => vec![(None, Vec::new())],
            Some(p) => self.beta.joins[p as usize]
                .out
                .values()
                .map(|t| (Some(t.id), t.facts.clone()))
                .collect(),
        }
    }

    fn left_token_live(&self, join: JoinId, left_id: Option<TokenId>) -> bool {
        match (left_id, self.beta.joins[join as usize].predecessor) {
            (None, None) => true,
            (Some(id), Some(p)) => self.beta.joins[p as usize].out.contains_key(&id),
            _ => false,
        }
    }

    /// Facts to consider on the right of a join for the given left tuple:
    /// the partition sub-bucket when the memory is hashed on a tested
    /// slot, the whole memory otherwise.
    fn right_candidates(&self, join: JoinId, left: &[Option<FactId>]) -> Vec<FactId> {
        let j = &self.beta.joins[join as usize];
        let mem = self.alpha.memory(j.right_mem);
        if let (Some(probe), Some(pslot)) = (j.hash_probe, mem.partition_slot) {
            if probe.right_slot == pslot {
                if let Some(Some(left_fact)) = left.get(probe.left_pattern) {
                    if let Some(key) =
                        self.store.fact(*left_fact).and_then(|f| f.slots.get(probe.left_slot))
                    {
                        return mem.buckets.get(key).cloned().unwrap_or_default();
                    }
                }
                return Vec::new();
            }
        }
        mem.facts.clone()
    }

    /// Insert a fact into one alpha memory and run the right activations
    /// it triggers. Insertion and activation interleave per memory so that
    /// a token built during an earlier memory's activations has not yet
    /// seen this membership — its own left activation covers it instead.
    pub(crate) fn insert_and_drive(&mut self, memory: AlphaMemoryId, fact: FactId) {
        self.alpha.insert_into_memory(self.store, memory, fact);
        self.drive_insert(memory, fact);
    }

    /// Right activation: a fact entered an alpha memory.
    fn drive_insert(&mut self, memory: AlphaMemoryId, fact: FactId) {
        let Some(right_slots) = self.store.fact(fact).map(|f| f.slots.clone()) else {
            return;
        };
        // Deeper joins are right-activated first: a token emitted by a
        // shallower join during this same activation left-activates its
        // successor against a memory already holding the fact, so running
        // the deeper join's right activation afterwards would produce the
        // same pairing twice.
        let mut joins = self.beta.joins_on(memory);
        joins.sort_by_key(|j| std::cmp::Reverse(self.beta.joins[*j as usize].position));
        for join in joins {
            let (negated, tests, predicate) = self.join_params(join);
            for (left_id, left_facts) in self.left_tokens(join) {
                self.beta.joins[join as usize].attempts += 1;
                if !join_tests_pass(self.store, &tests, predicate.as_ref(), &left_facts, &right_slots)
                {
                    continue;
                }
                if !self.left_token_live(join, left_id) {
                    continue;
                }
                if negated {
                    let Some(lid) = left_id else { continue };
                    let count = {
                        let j = &mut self.beta.joins[join as usize];
                        let c = j.counts.entry(lid).or_insert(0);
                        *c += 1;
                        *c
                    };
                    if count == 1 {
                        let victim = self.beta.joins[join as usize]
                            .out
                            .values()
                            .find(|t| t.parent == Some(lid))
                            .map(|t| t.id);
                        if let Some(v) = victim {
                            self.withdraw(join, v);
                        }
                    }
                } else {
                    let mut facts = left_facts;
                    facts.push(Some(fact));
                    self.emit(join, left_id, facts);
                }
            }
        }
    }

    /// Right removal: a fact left an alpha memory. Non-negated joins
    /// withdraw every token holding the fact at this position; negated
    /// joins decrement match counts and may emit freshly unblocked tokens.
    pub(crate) fn drive_remove(&mut self, memory: AlphaMemoryId, fact: FactId) {
        let Some(right_slots) = self.store.fact(fact).map(|f| f.slots.clone()) else {
            return;
        };
        for join in self.beta.joins_on(memory) {
            let (negated, tests, predicate) = self.join_params(join);
            if negated {
                for (left_id, left_facts) in self.left_tokens(join) {
                    let Some(lid) = left_id else { continue };
                    if !join_tests_pass(
                        self.store,
                        &tests,
                        predicate.as_ref(),
                        &left_facts,
                        &right_slots,
                    ) {
                        continue;
                    }
                    let new_count = {
                        let j = &mut self.beta.joins[join as usize];
                        j.counts.get_mut(&lid).map(|c| {
                            *c = c.saturating_sub(1);
                            *c
                        })
                    };
                    if new_count == Some(0) && self.left_token_live(join, left_id) {
                        let mut facts = left_facts;
                        facts.push(None);
                        self.emit(join, Some(lid), facts);
                    }
                }
            } else {
                let position = self.beta.joins[join as usize].position;
                let victims: Vec<TokenId> = self.beta.joins[join as usize]
                    .out
                    .values()
                    .filter(|t| t.facts.get(position) == Some(&Some(fact)))
                    .map(|t| t.id)
                    .collect();
                for v in victims {
                    self.withdraw(join, v);
                }
            }
        }
    }

    /// Left activation: a token arrived from the predecessor join.
    fn left_activate(&mut self, join: JoinId, left_id: TokenId, left_facts: Vec<Option<FactId>>) {
        let (negated, tests, predicate) = self.join_params(join);
        let candidates = self.right_candidates(join, &left_facts);
        if negated {
            let mut matching = 0u32;
            for rf in &candidates {
                self.beta.joins[join as usize].attempts += 1;
                let Some(right_slots) = self.store.fact(*rf).map(|f| f.slots.clone()) else {
                    continue;
                };
                if join_tests_pass(self.store, &tests, predicate.as_ref(), &left_facts, &right_slots)
                {
                    matching += 1;
                }
            }
            self.beta.joins[join as usize].counts.insert(left_id, matching);
            if matching == 0 {
                let mut facts = left_facts;
                facts.push(None);
                self.emit(join, Some(left_id), facts);
            }
        } else {
            for rf in candidates {
                self.beta.joins[join as usize].attempts += 1;
                let Some(right_slots) = self.store.fact(rf).map(|f| f.slots.clone()) else {
                    continue;
                };
                if join_tests_pass(self.store, &tests, predicate.as_ref(), &left_facts, &right_slots)
                {
                    let mut facts = left_facts.clone();
                    facts.push(Some(rf));
                    self.emit(join, Some(left_id), facts);
                }
            }
        }
    }

    /// Store a fresh token in the join's output memory, pin its facts, and
    /// notify the successor.
    fn emit(&mut self, join: JoinId, parent: Option<TokenId>, facts: Vec<Option<FactId>>) {
        let id = self.beta.next_token;
        self.beta.next_token += 1;
        {
            let threshold = self.beta.warn_threshold;
            let j = &mut self.beta.joins[join as usize];
            j.out.insert(id, Token { id, facts: facts.clone(), parent });
            j.matches += 1;
            if j.out.len() > threshold && !j.warned {
                j.warned = true;
                warn!(
                    join = j.id,
                    rule = j.rule,
                    tokens = j.out.len(),
                    "beta memory exceeds the configured size threshold"
                );
            }
        }
        for f in facts.iter().flatten() {
            if let Some(fact) = self.store.fact_mut(*f) {
                fact.token_pins += 1;
                if fact.basis.is_none() {
                    fact.basis = Some(Rc::from(fact.slots.clone()));
                }
            }
        }
        match self.beta.joins[join as usize].successor {
            Some(Successor::Join(next)) => self.left_activate(next, id, facts),
            Some(Successor::Terminal(t)) => {
                let (rule, rule_name, logical) = {
                    let term = &self.beta.terminals[t as usize];
                    (term.rule, term.rule_name.clone(), term.logical)
                };
                self.agenda.push(Activation { rule, rule_name, token: id, facts, logical });
            }
            None => {}
        }
    }

    /// Withdraw a token: unpin its facts, cascade through descendants, and
    /// release logical supports at the terminal.
    pub(crate) fn withdraw(&mut self, join: JoinId, token: TokenId) {
        let Some(record) = self.beta.joins[join as usize].out.remove(&token) else {
            return;
        };
        for f in record.facts.iter().flatten() {
            if let Some(fact) = self.store.fact_mut(*f) {
                fact.token_pins = fact.token_pins.saturating_sub(1);
            }
        }
        match self.beta.joins[join as usize].successor {
            Some(Successor::Join(next)) => {
                if self.beta.joins[next as usize].negated {
                    self.beta.joins[next as usize].counts.remove(&token);
                }
                let victims: Vec<TokenId> = self.beta.joins[next as usize]
                    .out
                    .values()
                    .filter(|t| t.parent == Some(token))
                    .map(|t| t.id)
                    .collect();
                for v in victims {
                    self.withdraw(next, v);
                }
            }
            Some(Successor::Terminal(_)) => {
                self.agenda.remove_token(token);
                for orphan in self.logical.withdraw_support(token) {
                    if self.store.live(orphan) {
                        self.pending_retracts.push(orphan);
                    }
                }
            }
            None => {}
        }
    }

    /// Bring a freshly compiled join chain up to date with the facts
    /// already in its alpha memories: one left activation of the dummy top
    /// cascades through the whole chain.
    pub(crate) fn init_chain(&mut self, first: JoinId) {
        let (_, tests, predicate) = self.join_params(first);
        let candidates = self.right_candidates(first, &[]);
        for rf in candidates {
            self.beta.joins[first as usize].attempts += 1;
            let Some(right_slots) = self.store.fact(rf).map(|f| f.slots.clone()) else {
                continue;
            };
            if join_tests_pass(self.store, &tests, predicate.as_ref(), &[], &right_slots) {
                self.emit(first, None, vec![Some(rf)]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activation(token: TokenId) -> Activation {
        Activation {
            rule: 0,
            rule_name: "r".to_string(),
            token,
            facts: vec![Some(1)],
            logical: false,
        }
    }

    #[test]
    fn agenda_removes_by_token() {
        let mut agenda = Agenda::default();
        agenda.push(activation(1));
        agenda.push(activation(2));
        assert!(agenda.remove_token(1));
        assert!(!agenda.remove_token(1));
        assert_eq!(agenda.len(), 1);
        assert_eq!(agenda.entries()[0].token, 2);
    }

    #[test]
    fn terminal_token_liveness() {
        let mut beta = BetaNetwork::new(10);
        let join = beta.add_join(JoinNode::new(0, 0, false, 0, Vec::new(), None, None, None));
        beta.add_terminal(0, "r".to_string(), false, join);
        assert!(!beta.terminal_token_live(7));
        beta.joins[join as usize]
            .out
            .insert(7, Token { id: 7, facts: vec![Some(1)], parent: None });
        assert!(beta.terminal_token_live(7));
    }
}
