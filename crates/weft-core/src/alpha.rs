//! Alpha Network: the per-template discrimination tree.
//!
//! Each template roots a trie of per-slot tests. Following a child edge
//! commits to one test outcome at the next slot; sibling edges enumerate
//! the alternatives at the same depth, and equal tests are shared between
//! patterns. A node at the final slot carries an alpha memory: the set of
//! facts currently passing every test on the path from the root.
//!
//! ```text
//! Template root → slot 0 tests → slot 1 tests → … → alpha memories
//!                     ↓              ↓                    ↓
//!                  shared         shared             join network
//!                  siblings       subtrees           right inputs
//! ```
//!
//! A memory may be partitioned by the value of a selector slot (the
//! right-hash of the discrimination network); joins that know the selector
//! value probe one sub-bucket instead of scanning the whole memory.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::debug;
use weft_types::Value;

use crate::fact::FactId;
use crate::fact_store::FactStore;
use crate::template::{Template, TemplateId};

pub type AlphaNodeId = u32;
pub type AlphaMemoryId = u32;

/// Predicate over a single slot value.
pub type SlotPredicateFn = dyn Fn(&Value) -> bool;

/// A field-level test attached to one trie node.
#[derive(Clone)]
pub enum AlphaTest {
    /// Passes any value.
    Any,
    /// Passes exactly one value.
    Constant(Value),
    /// Passes multifields whose length is within bounds.
    Length { min: usize, max: Option<usize> },
    /// Passes values satisfying a host predicate. Sharing is by predicate
    /// identity, so reuse the same `Rc` to share subtrees.
    Predicate { label: String, test: Rc<SlotPredicateFn> },
}

impl AlphaTest {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            AlphaTest::Any => true,
            AlphaTest::Constant(expected) => value == expected,
            AlphaTest::Length { min, max } => match value {
                Value::Multifield(mf) => {
                    mf.len() >= *min && max.is_none_or(|max| mf.len() <= max)
                }
                _ => false,
            },
            AlphaTest::Predicate { test, .. } => test(value),
        }
    }

    fn same(&self, other: &AlphaTest) -> bool {
        match (self, other) {
            (AlphaTest::Any, AlphaTest::Any) => true,
            (AlphaTest::Constant(a), AlphaTest::Constant(b)) => a == b,
            (
                AlphaTest::Length { min: a_min, max: a_max },
                AlphaTest::Length { min: b_min, max: b_max },
            ) => a_min == b_min && a_max == b_max,
            (AlphaTest::Predicate { test: a, .. }, AlphaTest::Predicate { test: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            _ => false,
        }
    }

    fn is_any(&self) -> bool {
        matches!(self, AlphaTest::Any)
    }
}

impl fmt::Debug for AlphaTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlphaTest::Any => write!(f, "Any"),
            AlphaTest::Constant(v) => write!(f, "Constant({v})"),
            AlphaTest::Length { min, max } => write!(f, "Length({min}..{max:?})"),
            AlphaTest::Predicate { label, .. } => write!(f, "Predicate({label})"),
        }
    }
}

#[derive(Debug)]
pub struct AlphaNode {
    pub id: AlphaNodeId,
    pub template: TemplateId,
    /// Slot index tested at this node (== depth in the trie).
    pub depth: usize,
    pub test: AlphaTest,
    pub parent: Option<AlphaNodeId>,
    pub children: Vec<AlphaNodeId>,
    pub memory: Option<AlphaMemoryId>,
}

#[derive(Debug)]
pub struct AlphaMemory {
    pub id: AlphaMemoryId,
    pub template: TemplateId,
    pub node: AlphaNodeId,
    /// Non-Any tests on the path, kept for seeding and integrity checks.
    pub path_tests: Vec<(usize, AlphaTest)>,
    /// Slots whose value the path (plus the partition selector) depends on.
    pub path_mask: u64,
    /// `path_mask` plus every join dependency registered by rules reading
    /// this memory. A modify re-enters this memory only when a changed
    /// slot intersects this mask.
    pub dep_mask: u64,
    pub partition_slot: Option<usize>,
    /// Insertion-ordered member list.
    pub facts: Vec<FactId>,
    /// Sub-buckets keyed by the partition slot's value.
    pub buckets: HashMap<Value, Vec<FactId>>,
    pub inserts: u64,
    pub removes: u64,
}

impl AlphaMemory {
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn contains(&self, id: FactId) -> bool {
        self.facts.contains(&id)
    }

    fn passes(&self, slots: &[Value]) -> bool {
        self.path_tests.iter().all(|(slot, test)| {
            slots.get(*slot).is_some_and(|value| test.matches(value))
        })
    }
}

#[derive(Debug, Default)]
pub struct AlphaNetwork {
    nodes: Vec<AlphaNode>,
    memories: Vec<AlphaMemory>,
    roots: HashMap<TemplateId, Vec<AlphaNodeId>>,
}

fn slot_bit(slot: usize) -> u64 {
    1u64 << (slot as u32 & 63)
}

impl AlphaNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: AlphaNodeId) -> &AlphaNode {
        &self.nodes[id as usize]
    }

    pub fn memory(&self, id: AlphaMemoryId) -> &AlphaMemory {
        &self.memories[id as usize]
    }

    pub fn memory_mut(&mut self, id: AlphaMemoryId) -> &mut AlphaMemory {
        &mut self.memories[id as usize]
    }

    pub fn memories(&self) -> impl Iterator<Item = &AlphaMemory> {
        self.memories.iter()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AlphaNode> {
        self.nodes.iter()
    }

    pub fn root_templates(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.roots.keys().copied()
    }

    pub fn roots_of(&self, template: TemplateId) -> &[AlphaNodeId] {
        self.roots.get(&template).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn template_has_nodes(&self, template: TemplateId) -> bool {
        !self.roots_of(template).is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn memory_count(&self) -> usize {
        self.memories.len()
    }

    /// Extend a memory's dependency mask with join-test dependencies.
    pub(crate) fn add_dep_mask(&mut self, memory: AlphaMemoryId, mask: u64) {
        self.memories[memory as usize].dep_mask |= mask;
    }

    /// Build (or share) the trie path for a pattern over `template` and
    /// return its terminal memory. `tests` is sparse over slot indices;
    /// untested slots get wildcard nodes. A new memory is seeded from the
    /// template's existing facts; join activation is the caller's job.
    pub(crate) fn compile_path(
        &mut self,
        store: &mut FactStore,
        template: &Template,
        tests: &[(usize, AlphaTest)],
        partition: Option<usize>,
    ) -> AlphaMemoryId {
        let depths = template.num_slots().max(1);
        let mut parent: Option<AlphaNodeId> = None;
        for depth in 0..depths {
            let test = tests
                .iter()
                .find(|(slot, _)| *slot == depth)
                .map(|(_, t)| t.clone())
                .unwrap_or(AlphaTest::Any);
            let siblings: Vec<AlphaNodeId> = match parent {
                None => self.roots.get(&template.id).cloned().unwrap_or_default(),
                Some(p) => self.nodes[p as usize].children.clone(),
            };
            let shared = siblings
                .iter()
                .copied()
                .find(|&sibling| self.nodes[sibling as usize].test.same(&test));
            let node = match shared {
                Some(existing) => existing,
                None => {
                    let id = self.nodes.len() as AlphaNodeId;
                    self.nodes.push(AlphaNode {
                        id,
                        template: template.id,
                        depth,
                        test,
                        parent,
                        children: Vec::new(),
                        memory: None,
                    });
                    match parent {
                        None => self.roots.entry(template.id).or_default().push(id),
                        Some(p) => self.nodes[p as usize].children.push(id),
                    }
                    id
                }
            };
            parent = Some(node);
        }
        let terminal = parent.expect("templates always produce at least one trie level");
        if let Some(existing) = self.nodes[terminal as usize].memory {
            if partition.is_some() && self.memories[existing as usize].partition_slot.is_none() {
                self.repartition(store, existing, partition);
            }
            return existing;
        }
        let path_tests: Vec<(usize, AlphaTest)> = {
            let mut collected = Vec::new();
            let mut cursor = Some(terminal);
            while let Some(id) = cursor {
                let node = &self.nodes[id as usize];
                if !node.test.is_any() {
                    collected.push((node.depth, node.test.clone()));
                }
                cursor = node.parent;
            }
            collected.reverse();
            collected
        };
        let mut path_mask = path_tests.iter().fold(0u64, |m, (slot, _)| m | slot_bit(*slot));
        if let Some(pslot) = partition {
            path_mask |= slot_bit(pslot);
        }
        let id = self.memories.len() as AlphaMemoryId;
        debug!(template = template.name.text(), memory = id, "creating alpha memory");
        self.memories.push(AlphaMemory {
            id,
            template: template.id,
            node: terminal,
            path_tests,
            path_mask,
            dep_mask: path_mask,
            partition_slot: partition,
            facts: Vec::new(),
            buckets: HashMap::new(),
            inserts: 0,
            removes: 0,
        });
        self.nodes[terminal as usize].memory = Some(id);
        self.seed_memory(store, id);
        id
    }

    fn repartition(&mut self, store: &FactStore, memory: AlphaMemoryId, partition: Option<usize>) {
        let mem = &mut self.memories[memory as usize];
        mem.partition_slot = partition;
        mem.buckets.clear();
        if let Some(pslot) = partition {
            mem.path_mask |= slot_bit(pslot);
            mem.dep_mask |= slot_bit(pslot);
            let members = mem.facts.clone();
            for id in members {
                if let Some(key) =
                    store.fact(id).and_then(|f| f.slots.get(pslot)).cloned()
                {
                    self.memories[memory as usize]
                        .buckets
                        .entry(key)
                        .or_default()
                        .push(id);
                }
            }
        }
    }

    fn seed_memory(&mut self, store: &mut FactStore, memory: AlphaMemoryId) {
        let template = self.memories[memory as usize].template;
        for id in store.template_facts(template) {
            let passes = store
                .fact(id)
                .is_some_and(|f| self.memories[memory as usize].passes(&f.slots));
            if passes {
                self.insert_into_memory(store, memory, id);
            }
        }
    }

    pub(crate) fn insert_into_memory(
        &mut self,
        store: &mut FactStore,
        memory: AlphaMemoryId,
        id: FactId,
    ) {
        let Some(fact) = store.fact_mut(id) else { return };
        if fact.memberships.contains(&memory) {
            return;
        }
        fact.memberships.push(memory);
        let partition_key = {
            let mem = &self.memories[memory as usize];
            mem.partition_slot.and_then(|slot| fact.slots.get(slot)).cloned()
        };
        let mem = &mut self.memories[memory as usize];
        mem.facts.push(id);
        mem.inserts += 1;
        if let Some(key) = partition_key {
            mem.buckets.entry(key).or_default().push(id);
        }
    }

    /// Drive a fact through the template's trie and report every terminal
    /// memory whose path it passes, in trie order. Memories in `skip` (a
    /// modify's unaffected memberships) are not reported. Insertion is the
    /// caller's job, interleaved with join activation per memory.
    pub(crate) fn matching_memories(
        &self,
        store: &FactStore,
        template: TemplateId,
        id: FactId,
        skip: Option<&HashSet<AlphaMemoryId>>,
    ) -> Vec<AlphaMemoryId> {
        let Some(fact) = store.fact(id) else {
            return Vec::new();
        };
        let slots = &fact.slots;
        let mut matched = Vec::new();
        let mut stack: Vec<AlphaNodeId> = {
            let mut roots = self.roots.get(&template).cloned().unwrap_or_default();
            roots.reverse();
            roots
        };
        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            let passes = match slots.get(node.depth) {
                Some(value) => node.test.matches(value),
                None => node.test.is_any(),
            };
            if !passes {
                continue;
            }
            if let Some(memory) = node.memory {
                if skip.is_none_or(|s| !s.contains(&memory)) {
                    matched.push(memory);
                }
            }
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        matched
    }
}

/// Remove a fact from one alpha memory, maintaining the partition buckets
/// and the fact's pattern-match list.
pub(crate) fn alpha_remove(
    alpha: &mut AlphaNetwork,
    store: &mut FactStore,
    memory: AlphaMemoryId,
    id: FactId,
) {
    let partition_key = {
        let mem = alpha.memory(memory);
        mem.partition_slot
            .and_then(|slot| store.fact(id).and_then(|f| f.slots.get(slot)).cloned())
    };
    let mem = alpha.memory_mut(memory);
    let before = mem.facts.len();
    mem.facts.retain(|entry| *entry != id);
    if mem.facts.len() != before {
        mem.removes += 1;
    }
    if let Some(key) = partition_key {
        if let Some(bucket) = mem.buckets.get_mut(&key) {
            bucket.retain(|entry| *entry != id);
            if bucket.is_empty() {
                mem.buckets.remove(&key);
            }
        }
    }
    if let Some(fact) = store.fact_mut(id) {
        fact.memberships.retain(|entry| *entry != memory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact_store::FactStore;
    use crate::template::{SlotDef, TemplateRegistry};
    use weft_types::AtomTable;

    fn setup() -> (AtomTable, TemplateRegistry, FactStore, AlphaNetwork) {
        (
            AtomTable::new(),
            TemplateRegistry::new(),
            FactStore::new(31),
            AlphaNetwork::new(),
        )
    }

    #[test]
    fn shared_prefixes_share_nodes() {
        let (mut atoms, mut registry, mut store, mut alpha) = setup();
        let tid = registry
            .define(
                &mut atoms,
                0,
                "point",
                vec![SlotDef::single("x"), SlotDef::single("y")],
                false,
            )
            .unwrap();
        let one = Value::Int(1);
        let two = Value::Int(2);
        {
            let template = registry.get(tid).unwrap();
            alpha.compile_path(
                &mut store,
                template,
                &[(0, AlphaTest::Constant(one.clone()))],
                None,
            );
            alpha.compile_path(
                &mut store,
                template,
                &[
                    (0, AlphaTest::Constant(one.clone())),
                    (1, AlphaTest::Constant(two.clone())),
                ],
                None,
            );
        }
        // Depth-0 constant node is shared; only the depth-1 level forks.
        assert_eq!(alpha.roots_of(tid).len(), 1);
        assert_eq!(alpha.memory_count(), 2);
    }

    #[test]
    fn route_enters_matching_memories_only() {
        let (mut atoms, mut registry, mut store, mut alpha) = setup();
        let tid = registry
            .define(
                &mut atoms,
                0,
                "point",
                vec![SlotDef::single("x"), SlotDef::single("y")],
                false,
            )
            .unwrap();
        let m_one = {
            let template = registry.get(tid).unwrap();
            alpha.compile_path(
                &mut store,
                template,
                &[(0, AlphaTest::Constant(Value::Int(1)))],
                None,
            )
        };
        let m_any = {
            let template = registry.get(tid).unwrap();
            alpha.compile_path(&mut store, template, &[], None)
        };
        let name = registry.get(tid).unwrap().name.clone();
        let slots = vec![Value::Int(1), Value::Int(9)];
        let hash = FactStore::hash_fact(&name, &slots);
        let id = store.install(tid, slots, hash);
        let matched = alpha.matching_memories(&store, tid, id, None);
        assert_eq!(matched, vec![m_one, m_any]);
        for &memory in &matched {
            alpha.insert_into_memory(&mut store, memory, id);
        }
        assert_eq!(store.fact(id).unwrap().memberships, matched);

        let slots = vec![Value::Int(5), Value::Int(9)];
        let hash = FactStore::hash_fact(&name, &slots);
        let other = store.install(tid, slots, hash);
        assert_eq!(alpha.matching_memories(&store, tid, other, None), vec![m_any]);
    }

    #[test]
    fn new_memory_is_seeded_from_existing_facts() {
        let (mut atoms, mut registry, mut store, mut alpha) = setup();
        let tid = registry
            .define(&mut atoms, 0, "t", vec![SlotDef::single("x")], false)
            .unwrap();
        let name = registry.get(tid).unwrap().name.clone();
        let slots = vec![Value::Int(7)];
        let hash = FactStore::hash_fact(&name, &slots);
        let id = store.install(tid, slots, hash);
        let memory = {
            let template = registry.get(tid).unwrap();
            alpha.compile_path(
                &mut store,
                template,
                &[(0, AlphaTest::Constant(Value::Int(7)))],
                None,
            )
        };
        assert!(alpha.memory(memory).contains(id));
        assert_eq!(store.fact(id).unwrap().memberships, vec![memory]);
    }

    #[test]
    fn partitioned_memory_maintains_buckets() {
        let (mut atoms, mut registry, mut store, mut alpha) = setup();
        let tid = registry
            .define(
                &mut atoms,
                0,
                "edge",
                vec![SlotDef::single("from"), SlotDef::single("to")],
                false,
            )
            .unwrap();
        let memory = {
            let template = registry.get(tid).unwrap();
            alpha.compile_path(&mut store, template, &[], Some(0))
        };
        let name = registry.get(tid).unwrap().name.clone();
        let a = atoms.symbol_value("a");
        let slots = vec![a.clone(), atoms.symbol_value("b")];
        let hash = FactStore::hash_fact(&name, &slots);
        let id = store.install(tid, slots, hash);
        for memory in alpha.matching_memories(&store, tid, id, None) {
            alpha.insert_into_memory(&mut store, memory, id);
        }
        assert_eq!(alpha.memory(memory).buckets.get(&a).map(Vec::len), Some(1));
        alpha_remove(&mut alpha, &mut store, memory, id);
        assert!(alpha.memory(memory).buckets.is_empty());
        assert!(alpha.memory(memory).is_empty());
    }
}
