//! Programmatic rule definitions and their compilation onto the match
//! network.
//!
//! A rule is an ordered list of patterns. Each pattern names a template,
//! carries per-slot tests (compiled into the alpha trie), equality join
//! tests against earlier patterns (compiled into the join chain), and an
//! optional host predicate over the combined bindings. Compilation shares
//! alpha paths between rules; join chains are private per rule. Textual
//! rule syntax is out of scope — hosts construct definitions directly.

use crate::alpha::{AlphaMemoryId, AlphaNetwork, AlphaTest};
use crate::beta::{BetaNetwork, JoinId, JoinNode, JoinPredicate, JoinTest, RuleId, Successor, TerminalId};
use crate::error::RuleError;
use crate::fact_store::FactStore;
use crate::module::ModuleGraph;
use crate::template::{TemplateId, TemplateRegistry};

#[derive(Debug, Clone)]
pub struct PatternDef {
    pub template: String,
    pub negated: bool,
    pub tests: Vec<(usize, AlphaTest)>,
    pub joins: Vec<JoinTest>,
    pub predicate: Option<JoinPredicate>,
    /// Selector slot for hashed alpha-memory partitioning. Defaults to the
    /// right slot of the first equality join test.
    pub partition_slot: Option<usize>,
}

impl PatternDef {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            negated: false,
            tests: Vec::new(),
            joins: Vec::new(),
            predicate: None,
            partition_slot: None,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }

    pub fn constant(mut self, slot: usize, value: weft_types::Value) -> Self {
        self.tests.push((slot, AlphaTest::Constant(value)));
        self
    }

    pub fn length(mut self, slot: usize, min: usize, max: Option<usize>) -> Self {
        self.tests.push((slot, AlphaTest::Length { min, max }));
        self
    }

    pub fn slot_test(mut self, slot: usize, test: AlphaTest) -> Self {
        self.tests.push((slot, test));
        self
    }

    /// Require `right_slot` of this pattern to equal `left_slot` of the
    /// fact bound at `left_pattern`.
    pub fn join_eq(mut self, left_pattern: usize, left_slot: usize, right_slot: usize) -> Self {
        self.joins.push(JoinTest { left_pattern, left_slot, right_slot });
        self
    }

    pub fn predicate(mut self, predicate: JoinPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn partition_on(mut self, slot: usize) -> Self {
        self.partition_slot = Some(slot);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RuleDef {
    pub name: String,
    pub patterns: Vec<PatternDef>,
    /// When set, activations of this rule may serve as logical support for
    /// facts asserted from them.
    pub logical: bool,
}

impl RuleDef {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), patterns: Vec::new(), logical: false }
    }

    pub fn pattern(mut self, pattern: PatternDef) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn logical(mut self) -> Self {
        self.logical = true;
        self
    }
}

/// Compilation result retained by the environment.
#[derive(Debug)]
pub struct CompiledRule {
    pub id: RuleId,
    pub name: String,
    pub logical: bool,
    pub first_join: JoinId,
    pub terminal_join: JoinId,
    pub terminal: TerminalId,
    pub memories: Vec<AlphaMemoryId>,
}

fn slot_bit(slot: usize) -> u64 {
    1u64 << (slot as u32 & 63)
}

fn bad(rule: &str, detail: impl Into<String>) -> RuleError {
    RuleError::BadPattern { rule: rule.to_string(), detail: detail.into() }
}

pub(crate) fn compile_rule(
    registry: &TemplateRegistry,
    modules: &ModuleGraph,
    alpha: &mut AlphaNetwork,
    beta: &mut BetaNetwork,
    store: &mut FactStore,
    id: RuleId,
    def: RuleDef,
) -> Result<CompiledRule, RuleError> {
    if def.patterns.is_empty() {
        return Err(bad(&def.name, "a rule needs at least one pattern"));
    }
    if def.patterns[0].negated {
        return Err(bad(&def.name, "the first pattern may not be negated"));
    }

    // Resolve templates and validate slot references up front.
    let mut template_ids: Vec<TemplateId> = Vec::with_capacity(def.patterns.len());
    for (i, pattern) in def.patterns.iter().enumerate() {
        let tid = registry
            .find(modules, &pattern.template)
            .ok_or_else(|| RuleError::TemplateNotFound(pattern.template.clone()))?;
        let slots = registry.get(tid).map(|t| t.num_slots()).unwrap_or(0);
        for (slot, _) in &pattern.tests {
            if *slot >= slots.max(1) {
                return Err(bad(&def.name, format!("pattern {i} tests slot {slot} out of range")));
            }
        }
        for test in &pattern.joins {
            if test.right_slot >= slots {
                return Err(bad(
                    &def.name,
                    format!("pattern {i} joins on slot {} out of range", test.right_slot),
                ));
            }
            if test.left_pattern >= i {
                return Err(bad(
                    &def.name,
                    format!("pattern {i} joins against a later pattern"),
                ));
            }
            if def.patterns[test.left_pattern].negated {
                return Err(bad(
                    &def.name,
                    format!("pattern {i} joins against a negated pattern"),
                ));
            }
        }
        template_ids.push(tid);
    }

    // Alpha paths, shared with existing rules where tests coincide.
    let mut memories: Vec<AlphaMemoryId> = Vec::with_capacity(def.patterns.len());
    for (i, pattern) in def.patterns.iter().enumerate() {
        let partition = pattern
            .partition_slot
            .or_else(|| pattern.joins.first().map(|t| t.right_slot));
        let template = registry
            .get(template_ids[i])
            .ok_or_else(|| RuleError::TemplateNotFound(pattern.template.clone()))?;
        memories.push(alpha.compile_path(store, template, &pattern.tests, partition));
    }

    // Changed-slot dependency masks: a memory must be re-entered on modify
    // when a changed slot feeds its own tests, its partition key, or any
    // join test or predicate that binds against this pattern position.
    for (i, pattern) in def.patterns.iter().enumerate() {
        let mut mask = 0u64;
        for test in &pattern.joins {
            mask |= slot_bit(test.right_slot);
        }
        if let Some(pred) = &pattern.predicate {
            for slot in &pred.right_deps {
                mask |= slot_bit(*slot);
            }
        }
        for later in def.patterns.iter().skip(i + 1) {
            for test in &later.joins {
                if test.left_pattern == i {
                    mask |= slot_bit(test.left_slot);
                }
            }
            if let Some(pred) = &later.predicate {
                for (pattern_idx, slot) in &pred.left_deps {
                    if *pattern_idx == i {
                        mask |= slot_bit(*slot);
                    }
                }
            }
        }
        alpha.add_dep_mask(memories[i], mask);
    }

    // The join chain, one node per pattern position.
    let mut join_ids: Vec<JoinId> = Vec::with_capacity(def.patterns.len());
    for (i, pattern) in def.patterns.iter().enumerate() {
        let memory = memories[i];
        let hash_probe = {
            let partition = alpha.memory(memory).partition_slot;
            pattern
                .joins
                .iter()
                .find(|t| partition == Some(t.right_slot))
                .copied()
        };
        let predecessor = join_ids.last().copied();
        let join = JoinNode::new(
            id,
            i,
            pattern.negated,
            memory,
            pattern.joins.clone(),
            pattern.predicate.clone(),
            hash_probe,
            predecessor,
        );
        join_ids.push(beta.add_join(join));
    }
    for pair in join_ids.windows(2) {
        beta.joins[pair[0] as usize].successor = Some(Successor::Join(pair[1]));
    }
    let first_join = join_ids[0];
    let terminal_join = *join_ids.last().unwrap_or(&first_join);
    let terminal = beta.add_terminal(id, def.name.clone(), def.logical, terminal_join);

    Ok(CompiledRule {
        id,
        name: def.name,
        logical: def.logical,
        first_join,
        terminal_join,
        terminal,
        memories,
    })
}
