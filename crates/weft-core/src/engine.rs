//! The environment: owner of all working-memory state.
//!
//! An `Environment` owns the atom table, module graph, template registry,
//! fact store, alpha and beta networks, logical-dependency index, and the
//! agenda. It is an owned context — strictly single-threaded, no globals,
//! no locks; every operation takes the environment explicitly.
//!
//! ## The join-operation lease
//!
//! Alpha/beta propagation must never observe a half-updated network, so
//! the environment raises a lease for the duration of any propagation.
//! While the lease is held, assertions and retractions return their guard
//! error and template/rule definitions are refused. Rule actions run after
//! the triggering event has quiesced: drain the agenda, then assert or
//! retract freely. Hosts wiring their own match callbacks can take the
//! same lease through [`Environment::with_match_lease`].

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use weft_types::{AtomTable, Multifield, Value};

use crate::alpha::{AlphaMemoryId, AlphaNetwork};
use crate::beta::{Activation, Agenda, BetaNetwork, MatchCtx, RuleId, TokenId};
use crate::build::{FactBuilder, FactModifier, finish_slots};
use crate::constraint::{Cardinality, InstanceClassifier, NumericRange, TypeMask};
use crate::error::{
    AssertError, BuildError, ModifyError, ModuleError, RetractError, RuleError, SlotError,
    TemplateError,
};
use crate::fact::FactId;
use crate::fact_store::{FactStore, FactStoreStats, INITIAL_FACT_TABLE_SIZE};
use crate::logical::LogicalIndex;
use crate::module::{ModuleGraph, ModuleId};
use crate::rule::{CompiledRule, RuleDef, compile_rule};
use crate::template::{DefaultKind, DefaultPolicy, IMPLIED_SLOT, SlotDef, TemplateId, TemplateRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Join output memories larger than this are reported by the
    /// diagnostic traversal and logged once per join.
    pub beta_memory_warn_threshold: usize,
    /// Initial (and post-reset) fact hash-table size.
    pub initial_fact_table_size: usize,
    /// Allow structurally equal facts to coexist with distinct indices.
    pub fact_duplication: bool,
    /// Release unpinned garbage after each quiesced operation.
    pub auto_cleanup: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            beta_memory_warn_threshold: 10_000,
            initial_fact_table_size: INITIAL_FACT_TABLE_SIZE,
            fact_duplication: false,
            auto_cleanup: true,
        }
    }
}

/// Filters for the `facts` listing.
#[derive(Debug, Clone, Default)]
pub struct FactsQuery {
    /// Restrict to facts whose template is visible from this module.
    pub module: Option<ModuleId>,
    pub start: Option<FactId>,
    pub end: Option<FactId>,
    pub max: Option<usize>,
}

/// Environment-wide counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentStats {
    pub fact_count: usize,
    pub garbage_count: usize,
    pub template_count: usize,
    pub rule_count: usize,
    pub alpha_node_count: usize,
    pub alpha_memory_count: usize,
    pub join_count: usize,
    pub token_count: usize,
    pub agenda_len: usize,
    pub atom_count: usize,
}

pub struct Environment {
    config: EnvironmentConfig,
    pub(crate) atoms: AtomTable,
    pub(crate) modules: ModuleGraph,
    pub(crate) templates: TemplateRegistry,
    pub(crate) store: FactStore,
    pub(crate) alpha: AlphaNetwork,
    pub(crate) beta: BetaNetwork,
    pub(crate) logical: LogicalIndex,
    pub(crate) agenda: Agenda,
    pub(crate) rules: Vec<CompiledRule>,
    join_active: bool,
    halt: bool,
    classifier: Option<Rc<dyn InstanceClassifier>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("facts", &self.store.live_count())
            .field("templates", &self.templates.len())
            .field("rules", &self.rules.len())
            .field("join_active", &self.join_active)
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::with_config(EnvironmentConfig::default())
    }

    pub fn with_config(config: EnvironmentConfig) -> Self {
        Self {
            atoms: AtomTable::new(),
            modules: ModuleGraph::new(),
            templates: TemplateRegistry::new(),
            store: FactStore::new(config.initial_fact_table_size),
            alpha: AlphaNetwork::new(),
            beta: BetaNetwork::new(config.beta_memory_warn_threshold),
            logical: LogicalIndex::new(),
            agenda: Agenda::default(),
            rules: Vec::new(),
            join_active: false,
            halt: false,
            classifier: None,
            config,
        }
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    // ---------------------------------------------------------------
    // Atoms
    // ---------------------------------------------------------------

    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut AtomTable {
        &mut self.atoms
    }

    pub fn symbol_value(&mut self, text: &str) -> Value {
        self.atoms.symbol_value(text)
    }

    pub fn string_value(&mut self, text: &str) -> Value {
        self.atoms.string_value(text)
    }

    pub fn instance_name_value(&mut self, text: &str) -> Value {
        self.atoms.instance_name_value(text)
    }

    // ---------------------------------------------------------------
    // Modules
    // ---------------------------------------------------------------

    pub fn define_module(&mut self, name: &str, imports: &[ModuleId]) -> Result<ModuleId, ModuleError> {
        self.modules.define(name, imports)
    }

    pub fn current_module(&self) -> ModuleId {
        self.modules.current()
    }

    pub fn set_current_module(&mut self, module: ModuleId) -> Result<(), ModuleError> {
        self.modules.set_current(module)
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules.find(name)
    }

    // ---------------------------------------------------------------
    // Templates
    // ---------------------------------------------------------------

    #[instrument(skip(self, slots))]
    pub fn define_template(
        &mut self,
        name: &str,
        slots: Vec<SlotDef>,
    ) -> Result<TemplateId, TemplateError> {
        if self.join_active {
            return Err(TemplateError::Guard);
        }
        let module = self.modules.current();
        self.templates.define(&mut self.atoms, module, name, slots, false)
    }

    /// Deletion is refused while builders are attached, facts exist, or
    /// the template's alpha subnetwork is non-empty.
    pub fn undefine_template(&mut self, id: TemplateId) -> Result<(), TemplateError> {
        if self.join_active {
            return Err(TemplateError::Guard);
        }
        let alpha_empty = !self.alpha.template_has_nodes(id);
        self.templates.delete(id, alpha_empty)
    }

    /// Look up (or auto-create as implied) the template behind an ordered
    /// fact head.
    pub(crate) fn implied_template(&mut self, name: &str) -> Result<TemplateId, TemplateError> {
        if let Some(existing) = self.templates.find(&self.modules, name) {
            return Ok(existing);
        }
        let module = self.modules.current();
        self.templates
            .define(&mut self.atoms, module, name, vec![SlotDef::multi(IMPLIED_SLOT)], true)
    }

    pub fn find_template(&self, name: &str) -> Option<TemplateId> {
        self.templates.find(&self.modules, name)
    }

    pub fn get_template_list(&self, module: Option<ModuleId>) -> Vec<TemplateId> {
        self.templates.list(&self.modules, module)
    }

    pub fn template_name(&self, id: TemplateId) -> Option<String> {
        self.templates.get(id).map(|t| t.name.text().to_string())
    }

    pub fn template_module(&self, id: TemplateId) -> Option<ModuleId> {
        self.templates.get(id).map(|t| t.module)
    }

    pub fn template_is_implied(&self, id: TemplateId) -> Option<bool> {
        self.templates.get(id).map(|t| t.implied)
    }

    pub fn template_slot_names(&self, id: TemplateId) -> Option<Vec<String>> {
        self.templates
            .get(id)
            .map(|t| t.slots.iter().map(|s| s.name.text().to_string()).collect())
    }

    pub fn slot_exists(&self, id: TemplateId, slot: &str) -> bool {
        self.templates.get(id).is_some_and(|t| t.slot_index(slot).is_some())
    }

    pub fn slot_is_multislot(&self, id: TemplateId, slot: &str) -> Option<bool> {
        self.templates.get(id)?.slot(slot).map(|(_, d)| d.multislot)
    }

    pub fn slot_is_single(&self, id: TemplateId, slot: &str) -> Option<bool> {
        self.slot_is_multislot(id, slot).map(|multi| !multi)
    }

    pub fn slot_default_kind(&self, id: TemplateId, slot: &str) -> Option<DefaultKind> {
        self.templates.get(id)?.slot(slot).map(|(_, d)| d.default_kind())
    }

    /// The value defaulting would install right now. Dynamic defaults are
    /// evaluated; evaluation failure yields `None`.
    pub fn slot_default_value(&mut self, id: TemplateId, slot: &str) -> Option<Value> {
        let (multislot, default, constraint) = {
            let (_, d) = self.templates.get(id)?.slot(slot)?;
            (d.multislot, d.default.clone(), d.constraint.clone())
        };
        match default {
            DefaultPolicy::NoDefault => None,
            DefaultPolicy::Static(value) => Some(value),
            DefaultPolicy::Dynamic(supplier) => supplier.supply(&mut self.atoms).ok(),
            DefaultPolicy::Derived => constraint.derive_default(multislot, &mut self.atoms),
        }
    }

    pub fn slot_cardinality(&self, id: TemplateId, slot: &str) -> Option<Cardinality> {
        self.templates.get(id)?.slot(slot).map(|(_, d)| d.constraint.cardinality)
    }

    pub fn slot_types(&self, id: TemplateId, slot: &str) -> Option<TypeMask> {
        self.templates.get(id)?.slot(slot).map(|(_, d)| d.constraint.types)
    }

    pub fn slot_range(&self, id: TemplateId, slot: &str) -> Option<NumericRange> {
        self.templates.get(id)?.slot(slot).map(|(_, d)| d.constraint.range)
    }

    pub fn slot_allowed_values(&self, id: TemplateId, slot: &str) -> Option<Option<Vec<Value>>> {
        self.templates.get(id)?.slot(slot).map(|(_, d)| d.constraint.allowed.clone())
    }

    pub fn slot_facet_value(&self, id: TemplateId, slot: &str, facet: &str) -> Option<Value> {
        self.templates.get(id)?.slot(slot)?.1.facet_value(facet).cloned()
    }

    pub fn slot_facet_exists(&self, id: TemplateId, slot: &str, facet: &str) -> bool {
        self.slot_facet_value(id, slot, facet).is_some()
    }

    // ---------------------------------------------------------------
    // Rules
    // ---------------------------------------------------------------

    pub fn define_rule(&mut self, def: RuleDef) -> Result<RuleId, RuleError> {
        if self.join_active {
            return Err(RuleError::Guard);
        }
        let id = self.rules.len() as RuleId;
        let compiled = compile_rule(
            &self.templates,
            &self.modules,
            &mut self.alpha,
            &mut self.beta,
            &mut self.store,
            id,
            def,
        )?;
        debug!(rule = compiled.name.as_str(), id, "rule compiled onto the network");
        let first = compiled.first_join;
        self.rules.push(compiled);
        self.join_active = true;
        let mut pending = Vec::new();
        {
            let mut ctx = MatchCtx {
                store: &mut self.store,
                alpha: &mut self.alpha,
                beta: &mut self.beta,
                logical: &mut self.logical,
                agenda: &mut self.agenda,
                pending_retracts: &mut pending,
            };
            ctx.init_chain(first);
        }
        self.drain_pending(&mut pending);
        self.join_active = false;
        self.maybe_cleanup();
        Ok(id)
    }

    pub fn rule(&self, id: RuleId) -> Option<&CompiledRule> {
        self.rules.get(id as usize)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    // ---------------------------------------------------------------
    // Builders and modifiers
    // ---------------------------------------------------------------

    pub fn create_fact_builder(&mut self, template: &str) -> Result<FactBuilder, BuildError> {
        let (id, num_slots) = self.bind_builder_template(template)?;
        Ok(FactBuilder::bind(id, num_slots))
    }

    pub fn create_fact_modifier(&mut self, fact: FactId) -> Result<FactModifier, BuildError> {
        let (template, num_slots) = self.bind_modifier_fact(fact)?;
        Ok(FactModifier::bind(fact, template, num_slots))
    }

    pub(crate) fn bind_builder_template(
        &mut self,
        name: &str,
    ) -> Result<(TemplateId, usize), BuildError> {
        let id = self
            .templates
            .find(&self.modules, name)
            .ok_or_else(|| BuildError::TemplateNotFound(name.to_string()))?;
        let template = self
            .templates
            .get_mut(id)
            .ok_or_else(|| BuildError::TemplateNotFound(name.to_string()))?;
        if template.implied {
            return Err(BuildError::ImpliedTemplate);
        }
        template.busy += 1;
        Ok((id, template.num_slots()))
    }

    pub(crate) fn release_template(&mut self, id: TemplateId) {
        if let Some(template) = self.templates.get_mut(id) {
            template.busy = template.busy.saturating_sub(1);
        }
    }

    pub(crate) fn bind_modifier_fact(
        &mut self,
        fact: FactId,
    ) -> Result<(TemplateId, usize), BuildError> {
        let template_id = {
            let f = self.store.fact(fact).ok_or(BuildError::NoSuchFact)?;
            if f.garbage {
                return Err(BuildError::Retracted);
            }
            f.template
        };
        let (implied, num_slots) = {
            let t = self.templates.get(template_id).ok_or(BuildError::NoSuchFact)?;
            (t.implied, t.num_slots())
        };
        if implied {
            return Err(BuildError::ImpliedTemplate);
        }
        if let Some(t) = self.templates.get_mut(template_id) {
            t.busy += 1;
        }
        if let Some(f) = self.store.fact_mut(fact) {
            f.external_pins += 1;
        }
        Ok((template_id, num_slots))
    }

    pub(crate) fn release_modifier_fact(&mut self, fact: FactId, template: TemplateId) {
        if let Some(f) = self.store.fact_mut(fact) {
            f.external_pins = f.external_pins.saturating_sub(1);
        }
        self.release_template(template);
        self.maybe_cleanup();
    }

    pub(crate) fn transfer_external_pin(&mut self, from: FactId, to: FactId) {
        if let Some(f) = self.store.fact_mut(from) {
            f.external_pins = f.external_pins.saturating_sub(1);
        }
        if let Some(f) = self.store.fact_mut(to) {
            f.external_pins += 1;
        }
    }

    // ---------------------------------------------------------------
    // Assertion, retraction, modification
    // ---------------------------------------------------------------

    /// Assert an ordered fact, auto-creating its implied template if the
    /// head has never been declared.
    pub fn assert_ordered(&mut self, name: &str, values: Vec<Value>) -> Result<FactId, AssertError> {
        if self.join_active {
            return Err(AssertError::CouldNotAssert);
        }
        let template = self.implied_template(name).map_err(|_| AssertError::CouldNotAssert)?;
        let implied = self.template_is_implied(template).unwrap_or(false);
        if !implied {
            return Err(AssertError::CouldNotAssert);
        }
        let slots = vec![Value::Multifield(Multifield::from_values(values))];
        self.assert_internal(template, slots, None)
    }

    /// Parse a textual fact literal and assert it.
    #[instrument(skip(self))]
    pub fn assert_string(&mut self, text: &str) -> Result<FactId, AssertError> {
        if self.join_active {
            return Err(AssertError::CouldNotAssert);
        }
        let parsed = crate::parse::parse_fact(self, text)?;
        let slots = finish_slots(self, parsed.template, parsed.slots)?;
        self.assert_internal(parsed.template, slots, None)
    }

    pub(crate) fn assert_internal(
        &mut self,
        template: TemplateId,
        slots: Vec<Value>,
        support: Option<TokenId>,
    ) -> Result<FactId, AssertError> {
        if self.join_active {
            return Err(AssertError::CouldNotAssert);
        }
        let name = self
            .templates
            .get(template)
            .ok_or(AssertError::CouldNotAssert)?
            .name
            .clone();
        if let Some(token) = support {
            if !self.support_usable(token) {
                debug!(token, "logical support is stale or under retraction");
                return Err(AssertError::CouldNotAssert);
            }
        }
        let hash = FactStore::hash_fact(&name, &slots);
        if !self.store.duplication {
            if let Some(existing) = self.store.find_duplicate(template, hash, &slots) {
                if let Some(token) = support {
                    self.logical.add(existing, token);
                }
                debug!(existing, "assertion deduplicated to existing fact");
                return Ok(existing);
            }
        }
        let id = self.store.install(template, slots, hash);
        if let Some(t) = self.templates.get_mut(template) {
            t.fact_count += 1;
        }
        if let Some(token) = support {
            self.logical.add(id, token);
        }
        self.join_active = true;
        let matched = self.alpha.matching_memories(&self.store, template, id, None);
        let mut pending = Vec::new();
        {
            let mut ctx = MatchCtx {
                store: &mut self.store,
                alpha: &mut self.alpha,
                beta: &mut self.beta,
                logical: &mut self.logical,
                agenda: &mut self.agenda,
                pending_retracts: &mut pending,
            };
            for memory in matched {
                ctx.insert_and_drive(memory, id);
            }
        }
        self.drain_pending(&mut pending);
        self.join_active = false;
        self.maybe_cleanup();
        Ok(id)
    }

    /// A support token is usable while its partial match is live at a
    /// terminal and none of its facts is garbage (the cycle guard).
    fn support_usable(&self, token: TokenId) -> bool {
        self.beta.terminals().any(|t| {
            self.beta
                .join(t.input)
                .out
                .get(&token)
                .is_some_and(|tok| tok.facts.iter().flatten().all(|f| self.store.live(*f)))
        })
    }

    pub fn retract(&mut self, id: FactId) -> Result<(), RetractError> {
        if self.join_active {
            return Err(RetractError::CouldNotRetract);
        }
        match self.store.fact(id) {
            None => {
                // Retracting an already-released fact is a no-op success;
                // an index never issued is an error.
                if id == 0 || id >= self.store.next_index() {
                    Err(RetractError::NoSuchFact)
                } else {
                    Ok(())
                }
            }
            Some(f) if f.garbage => Ok(()),
            Some(_) => {
                debug!(fact = id, "retracting");
                self.join_active = true;
                let mut pending = Vec::new();
                self.retract_unguarded(id, &mut pending);
                self.drain_pending(&mut pending);
                self.join_active = false;
                self.maybe_cleanup();
                Ok(())
            }
        }
    }

    /// Retract every live fact, in index order.
    pub fn retract_all(&mut self) -> Result<usize, RetractError> {
        if self.join_active {
            return Err(RetractError::CouldNotRetract);
        }
        let ids: Vec<FactId> = self.store.iter_live().collect();
        let mut retracted = 0;
        for id in ids {
            if self.store.live(id) {
                self.retract(id)?;
                retracted += 1;
            }
        }
        Ok(retracted)
    }

    fn retract_unguarded(&mut self, id: FactId, pending: &mut Vec<FactId>) {
        let template = match self.store.fact(id) {
            Some(f) if !f.garbage => f.template,
            _ => return,
        };
        let memberships = match self.store.fact_mut(id) {
            Some(f) => std::mem::take(&mut f.memberships),
            None => return,
        };
        {
            let mut ctx = MatchCtx {
                store: &mut self.store,
                alpha: &mut self.alpha,
                beta: &mut self.beta,
                logical: &mut self.logical,
                agenda: &mut self.agenda,
                pending_retracts: pending,
            };
            for memory in &memberships {
                crate::alpha::alpha_remove(ctx.alpha, ctx.store, *memory, id);
                ctx.drive_remove(*memory, id);
            }
        }
        self.logical.remove_fact(id);
        self.store.unlink(id);
        if let Some(t) = self.templates.get_mut(template) {
            t.fact_count = t.fact_count.saturating_sub(1);
        }
    }

    fn drain_pending(&mut self, pending: &mut Vec<FactId>) {
        while let Some(fact) = pending.pop() {
            self.retract_unguarded(fact, pending);
        }
    }

    pub(crate) fn modify_internal(
        &mut self,
        fact: FactId,
        new_slots: Vec<Value>,
        changed: u64,
    ) -> Result<FactId, ModifyError> {
        if self.join_active {
            return Err(ModifyError::CouldNotModify);
        }
        let template = {
            let f = self.store.fact(fact).ok_or(ModifyError::Retracted)?;
            if f.garbage {
                return Err(ModifyError::Retracted);
            }
            f.template
        };
        let name = self
            .templates
            .get(template)
            .ok_or(ModifyError::CouldNotModify)?
            .name
            .clone();
        let new_hash = FactStore::hash_fact(&name, &new_slots);
        if !self.store.duplication {
            if let Some(existing) = self.store.find_duplicate(template, new_hash, &new_slots) {
                if existing == fact {
                    return Ok(fact);
                }
                // The new tuple already exists: the old version is
                // retracted and the existing fact stands in for the result.
                debug!(fact, existing, "modification collapses into an existing fact");
                self.join_active = true;
                let mut pending = Vec::new();
                self.retract_unguarded(fact, &mut pending);
                self.drain_pending(&mut pending);
                self.join_active = false;
                self.maybe_cleanup();
                return Ok(existing);
            }
        }
        debug!(fact, changed, "modifying in place");
        self.join_active = true;
        let memberships = self
            .store
            .fact(fact)
            .map(|f| f.memberships.clone())
            .unwrap_or_default();
        let affected: Vec<AlphaMemoryId> = memberships
            .into_iter()
            .filter(|m| self.alpha.memory(*m).dep_mask & changed != 0)
            .collect();
        let mut pending = Vec::new();
        {
            let mut ctx = MatchCtx {
                store: &mut self.store,
                alpha: &mut self.alpha,
                beta: &mut self.beta,
                logical: &mut self.logical,
                agenda: &mut self.agenda,
                pending_retracts: &mut pending,
            };
            for memory in &affected {
                crate::alpha::alpha_remove(ctx.alpha, ctx.store, *memory, fact);
                ctx.drive_remove(*memory, fact);
            }
        }
        self.store.rehash(fact, new_slots, new_hash);
        let kept: HashSet<AlphaMemoryId> = self
            .store
            .fact(fact)
            .map(|f| f.memberships.iter().copied().collect())
            .unwrap_or_default();
        let matched = self.alpha.matching_memories(&self.store, template, fact, Some(&kept));
        {
            let mut ctx = MatchCtx {
                store: &mut self.store,
                alpha: &mut self.alpha,
                beta: &mut self.beta,
                logical: &mut self.logical,
                agenda: &mut self.agenda,
                pending_retracts: &mut pending,
            };
            for memory in matched {
                ctx.insert_and_drive(memory, fact);
            }
        }
        self.drain_pending(&mut pending);
        self.join_active = false;
        self.maybe_cleanup();
        Ok(fact)
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    pub fn facts(&self, query: &FactsQuery) -> Vec<FactId> {
        let mask = query.module.map(|m| self.modules.visible_mask(m));
        let mut out = Vec::new();
        for id in self.store.iter_live() {
            if self.halt {
                break;
            }
            if query.start.is_some_and(|start| id < start) {
                continue;
            }
            if query.end.is_some_and(|end| id > end) {
                break;
            }
            if let Some(mask) = mask {
                let visible = self
                    .store
                    .fact(id)
                    .and_then(|f| self.templates.get(f.template))
                    .is_some_and(|t| mask & (1u64 << t.module) != 0);
                if !visible {
                    continue;
                }
            }
            out.push(id);
            if query.max.is_some_and(|max| out.len() >= max) {
                break;
            }
        }
        out
    }

    pub fn get_number_of_facts(&self) -> usize {
        self.store.live_count()
    }

    /// The fact with this index, while it is live.
    pub fn find_indexed_fact(&self, id: FactId) -> Option<FactId> {
        self.store.live(id).then_some(id)
    }

    pub fn fact_template(&self, id: FactId) -> Option<TemplateId> {
        self.store.fact(id).map(|f| f.template)
    }

    pub fn fact_template_name(&self, id: FactId) -> Option<String> {
        self.template_name(self.fact_template(id)?)
    }

    pub fn fact_slots(&self, id: FactId) -> Option<Vec<Value>> {
        self.store.fact(id).map(|f| f.slots.clone())
    }

    /// Live facts of one template, in index order.
    pub fn store_template_facts(&self, template: TemplateId) -> Vec<FactId> {
        self.store.template_facts(template)
    }

    pub fn get_fact_slot(&self, id: FactId, slot: &str) -> Result<Value, SlotError> {
        let fact = self.store.fact(id).ok_or(SlotError::InvalidTarget)?;
        if fact.garbage {
            return Err(SlotError::InvalidTarget);
        }
        let template = self.templates.get(fact.template).ok_or(SlotError::InvalidTarget)?;
        let idx = template
            .slot_index(slot)
            .ok_or_else(|| SlotError::NotFound(slot.to_string()))?;
        Ok(fact.slots[idx].clone())
    }

    /// Slot value as frozen for partial matches: the basis snapshot if one
    /// was taken, the current tuple otherwise. Unlike
    /// [`Self::get_fact_slot`] this also serves retracted-but-held facts,
    /// which is what in-flight activations read after a modify.
    pub fn fact_basis_slot(&self, id: FactId, slot: &str) -> Result<Value, SlotError> {
        let fact = self.store.fact(id).ok_or(SlotError::InvalidTarget)?;
        let template = self.templates.get(fact.template).ok_or(SlotError::InvalidTarget)?;
        let idx = template
            .slot_index(slot)
            .ok_or_else(|| SlotError::NotFound(slot.to_string()))?;
        Ok(fact.basis_slots()[idx].clone())
    }

    pub fn format_fact(&self, id: FactId) -> Option<String> {
        crate::textio::format_fact(self, id)
    }

    // ---------------------------------------------------------------
    // Agenda
    // ---------------------------------------------------------------

    pub fn agenda(&self) -> &[Activation] {
        self.agenda.entries()
    }

    /// Take every pending activation. The facts of each drained activation
    /// are pinned until [`Self::release_activation`].
    pub fn drain_agenda(&mut self) -> Vec<Activation> {
        let activations = self.agenda.take_all();
        for activation in &activations {
            for fact in activation.facts.iter().flatten() {
                if let Some(f) = self.store.fact_mut(*fact) {
                    f.external_pins += 1;
                }
            }
        }
        activations
    }

    pub fn release_activation(&mut self, activation: &Activation) {
        for fact in activation.facts.iter().flatten() {
            if let Some(f) = self.store.fact_mut(*fact) {
                f.external_pins = f.external_pins.saturating_sub(1);
            }
        }
        self.maybe_cleanup();
    }

    // ---------------------------------------------------------------
    // Control
    // ---------------------------------------------------------------

    /// Run `f` with the join-operation lease held, exactly as the engine
    /// holds it during propagation: assertions, retractions, and
    /// definitions made inside return their guard errors.
    pub fn with_match_lease<R>(&mut self, f: impl FnOnce(&mut Environment) -> R) -> R {
        let previous = self.join_active;
        self.join_active = true;
        let result = f(self);
        self.join_active = previous;
        result
    }

    pub fn match_in_progress(&self) -> bool {
        self.join_active
    }

    /// Cooperative halt: long-running enumerations stop at their next
    /// check. Network propagation always runs to quiescence.
    pub fn set_halt(&mut self, halt: bool) {
        self.halt = halt;
    }

    pub fn halted(&self) -> bool {
        self.halt
    }

    pub fn set_fact_duplication(&mut self, duplication: bool) -> bool {
        std::mem::replace(&mut self.store.duplication, duplication)
    }

    pub fn get_fact_duplication(&self) -> bool {
        self.store.duplication
    }

    pub fn set_classifier(&mut self, classifier: Option<Rc<dyn InstanceClassifier>>) {
        self.classifier = classifier;
    }

    pub(crate) fn classifier(&self) -> Option<&dyn InstanceClassifier> {
        self.classifier.as_deref()
    }

    fn maybe_cleanup(&mut self) {
        if self.config.auto_cleanup && !self.join_active {
            self.store.release_garbage();
        }
    }

    /// Release unpinned garbage facts and purge unreferenced atoms. Never
    /// runs while the lease is held.
    pub fn periodic_cleanup(&mut self) -> usize {
        if self.join_active {
            return 0;
        }
        let freed = self.store.release_garbage();
        self.atoms.purge();
        freed
    }

    /// Retract every fact and release the garbage, keeping templates,
    /// rules, and modules.
    pub fn clear_facts(&mut self) -> Result<usize, RetractError> {
        let retracted = self.retract_all()?;
        self.periodic_cleanup();
        Ok(retracted)
    }

    /// Reset the environment to its initial state, keeping only the
    /// configuration and classifier. Outstanding builders and modifiers
    /// are invalidated.
    pub fn clear(&mut self) {
        info!("clearing environment");
        let config = self.config.clone();
        let classifier = self.classifier.clone();
        *self = Environment::with_config(config);
        self.classifier = classifier;
    }

    // ---------------------------------------------------------------
    // Persistence (textual)
    // ---------------------------------------------------------------

    pub fn save_facts(
        &self,
        path: &std::path::Path,
        scope: crate::textio::SaveScope,
        templates: Option<&[TemplateId]>,
    ) -> Result<usize, std::io::Error> {
        crate::textio::save_facts(self, path, scope, templates)
    }

    pub fn load_facts(&mut self, path: &std::path::Path) -> Result<usize, crate::error::LoadError> {
        crate::textio::load_facts(self, path)
    }

    // ---------------------------------------------------------------
    // Statistics
    // ---------------------------------------------------------------

    pub fn store_stats(&self) -> FactStoreStats {
        self.store.stats()
    }

    /// Read-only view of the discrimination network, for diagnostics.
    pub fn alpha_network(&self) -> &AlphaNetwork {
        &self.alpha
    }

    /// Read-only view of the join network, for diagnostics.
    pub fn beta_network(&self) -> &BetaNetwork {
        &self.beta
    }

    pub fn stats(&self) -> EnvironmentStats {
        EnvironmentStats {
            fact_count: self.store.live_count(),
            garbage_count: self.store.garbage_count(),
            template_count: self.templates.len(),
            rule_count: self.rules.len(),
            alpha_node_count: self.alpha.node_count(),
            alpha_memory_count: self.alpha.memory_count(),
            join_count: self.beta.join_count(),
            token_count: self.beta.token_count(),
            agenda_len: self.agenda.len(),
            atom_count: self.atoms.len(),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::SlotDef;

    #[test]
    fn assert_deduplicates_by_default() {
        let mut env = Environment::new();
        env.define_template("point", vec![SlotDef::single("x"), SlotDef::single("y")])
            .unwrap();
        let mut fb = env.create_fact_builder("point").unwrap();
        fb.put_slot(&env, "x", Value::Int(3)).unwrap();
        fb.put_slot(&env, "y", Value::Int(4)).unwrap();
        let first = fb.assert(&mut env).unwrap();
        fb.put_slot(&env, "x", Value::Int(3)).unwrap();
        fb.put_slot(&env, "y", Value::Int(4)).unwrap();
        let second = fb.assert(&mut env).unwrap();
        fb.dispose(&mut env);
        assert_eq!(first, 1);
        assert_eq!(second, first);
        assert_eq!(env.get_number_of_facts(), 1);
    }

    #[test]
    fn duplication_flag_allows_distinct_twins() {
        let mut env = Environment::new();
        env.define_template("t", vec![SlotDef::single("x")]).unwrap();
        env.set_fact_duplication(true);
        let mut fb = env.create_fact_builder("t").unwrap();
        fb.put_slot(&env, "x", Value::Int(1)).unwrap();
        let first = fb.assert(&mut env).unwrap();
        fb.put_slot(&env, "x", Value::Int(1)).unwrap();
        let second = fb.assert(&mut env).unwrap();
        fb.dispose(&mut env);
        assert_ne!(first, second);
        assert_eq!(env.get_number_of_facts(), 2);
    }

    #[test]
    fn lease_blocks_mutation() {
        let mut env = Environment::new();
        env.define_template("t", vec![SlotDef::single("x")]).unwrap();
        env.with_match_lease(|env| {
            assert_eq!(
                env.assert_ordered("o", vec![Value::Int(1)]),
                Err(AssertError::CouldNotAssert)
            );
            assert_eq!(env.retract(1), Err(RetractError::CouldNotRetract));
            assert_eq!(
                env.define_template("u", vec![SlotDef::single("x")]),
                Err(TemplateError::Guard)
            );
        });
        assert_eq!(env.get_number_of_facts(), 0);
    }

    #[test]
    fn retract_is_idempotent() {
        let mut env = Environment::new();
        let id = env.assert_ordered("f", vec![Value::Int(1)]).unwrap();
        env.retract(id).unwrap();
        env.retract(id).unwrap();
        env.retract(id).unwrap();
        assert_eq!(env.retract(99), Err(RetractError::NoSuchFact));
    }

    #[test]
    fn facts_listing_respects_filters() {
        let mut env = Environment::new();
        for i in 0..5 {
            env.assert_ordered("n", vec![Value::Int(i)]).unwrap();
        }
        let all = env.facts(&FactsQuery::default());
        assert_eq!(all.len(), 5);
        let limited = env.facts(&FactsQuery { max: Some(2), ..Default::default() });
        assert_eq!(limited, vec![1, 2]);
        let ranged = env.facts(&FactsQuery {
            start: Some(3),
            end: Some(4),
            ..Default::default()
        });
        assert_eq!(ranged, vec![3, 4]);
    }
}
