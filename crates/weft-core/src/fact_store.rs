//! The fact store: hash-deduplicated working memory.
//!
//! Facts are indexed three ways: a global id-ordered live list, a live
//! list per template, and an open-chained hash table over the canonical
//! fact hash used for duplicate detection. The hash table starts at a
//! fixed size, grows to `2n + 1` buckets whenever the entry count exceeds
//! the bucket count, and falls back to its original size when the store
//! empties. Retracted facts move to a garbage list and their storage is
//! released only once nothing pins them.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use weft_types::{Lexeme, Value};

use crate::fact::{Fact, FactId};
use crate::template::TemplateId;

/// Initial (and post-reset) bucket count of the fact hash table.
pub const INITIAL_FACT_TABLE_SIZE: usize = 16231;

/// Multiplier combining the template-name hash with the slot-tuple hash.
const TEMPLATE_HASH_MULTIPLIER: u64 = 73981;

#[derive(Debug)]
pub struct FactStore {
    facts: HashMap<FactId, Fact>,
    global: BTreeSet<FactId>,
    by_template: HashMap<TemplateId, BTreeSet<FactId>>,
    buckets: Vec<Vec<FactId>>,
    initial_buckets: usize,
    entry_count: usize,
    next_id: FactId,
    garbage: Vec<FactId>,
    /// When false (the default), structurally equal assertions return the
    /// existing fact instead of creating a new one.
    pub duplication: bool,
}

/// Occupancy counters for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactStoreStats {
    pub live: usize,
    pub garbage: usize,
    pub buckets: usize,
    pub highest_index: FactId,
}

impl FactStore {
    pub fn new(initial_buckets: usize) -> Self {
        let initial_buckets = initial_buckets.max(1);
        Self {
            facts: HashMap::new(),
            global: BTreeSet::new(),
            by_template: HashMap::new(),
            buckets: vec![Vec::new(); initial_buckets],
            initial_buckets,
            entry_count: 0,
            next_id: 1,
            garbage: Vec::new(),
            duplication: false,
        }
    }

    /// Canonical fact hash: the template-name hash scaled by a fixed
    /// multiplier plus the combined slot-tuple hash. Float slots hash by
    /// their raw bit pattern.
    pub fn hash_fact(template_name: &Lexeme, slots: &[Value]) -> u64 {
        let mut name_hasher = DefaultHasher::new();
        template_name.text().hash(&mut name_hasher);
        let mut tuple_hasher = DefaultHasher::new();
        for value in slots {
            value.hash(&mut tuple_hasher);
        }
        name_hasher
            .finish()
            .wrapping_mul(TEMPLATE_HASH_MULTIPLIER)
            .wrapping_add(tuple_hasher.finish())
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// A live fact structurally equal to (template, slots), if any.
    /// Template identity is tested first, then element-wise slot equality.
    pub fn find_duplicate(
        &self,
        template: TemplateId,
        hash: u64,
        slots: &[Value],
    ) -> Option<FactId> {
        let bucket = self.bucket_of(hash);
        self.buckets[bucket]
            .iter()
            .copied()
            .find(|id| {
                self.facts
                    .get(id)
                    .is_some_and(|f| f.template == template && f.slots == slots)
            })
    }

    /// Install a new fact: issue the next index, link every list, and
    /// place it in its hash bucket. Growth runs before placement so the
    /// bucket invariant holds immediately.
    pub fn install(&mut self, template: TemplateId, slots: Vec<Value>, hash: u64) -> FactId {
        let id = self.next_id;
        self.next_id += 1;
        self.facts.insert(
            id,
            Fact {
                id,
                template,
                slots,
                hash,
                garbage: false,
                token_pins: 0,
                external_pins: 0,
                memberships: Vec::new(),
                basis: None,
            },
        );
        self.global.insert(id);
        self.by_template.entry(template).or_default().insert(id);
        self.entry_count += 1;
        if self.entry_count > self.buckets.len() {
            self.grow();
        }
        let bucket = self.bucket_of(hash);
        self.buckets[bucket].push(id);
        id
    }

    fn grow(&mut self) {
        let new_len = self.buckets.len() * 2 + 1;
        self.redistribute(new_len);
    }

    fn redistribute(&mut self, new_len: usize) {
        let mut fresh: Vec<Vec<FactId>> = vec![Vec::new(); new_len];
        for bucket in self.buckets.drain(..) {
            for id in bucket {
                if let Some(fact) = self.facts.get(&id) {
                    fresh[(fact.hash % new_len as u64) as usize].push(id);
                }
            }
        }
        self.buckets = fresh;
    }

    /// Unlink a fact from every structural index and flag it garbage. The
    /// record itself is kept until [`Self::release_garbage`] frees it.
    pub fn unlink(&mut self, id: FactId) {
        let Some(fact) = self.facts.get_mut(&id) else { return };
        if fact.garbage {
            return;
        }
        fact.garbage = true;
        let hash = fact.hash;
        let template = fact.template;
        self.global.remove(&id);
        if let Some(set) = self.by_template.get_mut(&template) {
            set.remove(&id);
        }
        let bucket = self.bucket_of(hash);
        self.buckets[bucket].retain(|entry| *entry != id);
        self.entry_count -= 1;
        self.garbage.push(id);
        if self.entry_count == 0 && self.buckets.len() != self.initial_buckets {
            self.redistribute(self.initial_buckets);
        }
    }

    /// Replace a live fact's slot tuple in place (modification), moving it
    /// to the bucket of its new hash. The id, index positions, and basis
    /// snapshot are untouched.
    pub fn rehash(&mut self, id: FactId, new_slots: Vec<Value>, new_hash: u64) {
        let old_bucket = match self.facts.get(&id) {
            Some(fact) if !fact.garbage => self.bucket_of(fact.hash),
            _ => return,
        };
        self.buckets[old_bucket].retain(|entry| *entry != id);
        if let Some(fact) = self.facts.get_mut(&id) {
            fact.slots = new_slots;
            fact.hash = new_hash;
        }
        let new_bucket = self.bucket_of(new_hash);
        self.buckets[new_bucket].push(id);
    }

    pub fn fact(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(&id)
    }

    pub fn fact_mut(&mut self, id: FactId) -> Option<&mut Fact> {
        self.facts.get_mut(&id)
    }

    pub fn live(&self, id: FactId) -> bool {
        self.facts.get(&id).is_some_and(|f| !f.garbage)
    }

    /// Live facts in id (= assertion) order.
    pub fn iter_live(&self) -> impl Iterator<Item = FactId> + '_ {
        self.global.iter().copied()
    }

    /// Live facts of one template in id order.
    pub fn template_facts(&self, template: TemplateId) -> Vec<FactId> {
        self.by_template
            .get(&template)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn live_count(&self) -> usize {
        self.global.len()
    }

    pub fn garbage_count(&self) -> usize {
        self.garbage.len()
    }

    pub fn next_index(&self) -> FactId {
        self.next_id
    }

    pub fn highest_index(&self) -> FactId {
        self.next_id - 1
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_lens(&self) -> Vec<usize> {
        self.buckets.iter().map(Vec::len).collect()
    }

    /// True when `id` sits in the bucket identified by `hash`.
    pub fn bucket_contains(&self, hash: u64, id: FactId) -> bool {
        self.buckets[self.bucket_of(hash)].contains(&id)
    }

    /// Every record still held, live and garbage alike.
    pub fn iter_all(&self) -> impl Iterator<Item = &Fact> {
        self.facts.values()
    }

    /// Release every garbage fact nothing pins any longer. Returns the
    /// number of records freed.
    pub fn release_garbage(&mut self) -> usize {
        let mut kept = Vec::new();
        let mut freed = 0;
        for id in std::mem::take(&mut self.garbage) {
            let releasable = self.facts.get(&id).is_some_and(|f| f.busy() == 0);
            if releasable {
                self.facts.remove(&id);
                freed += 1;
            } else {
                kept.push(id);
            }
        }
        self.garbage = kept;
        freed
    }

    pub fn stats(&self) -> FactStoreStats {
        FactStoreStats {
            live: self.global.len(),
            garbage: self.garbage.len(),
            buckets: self.buckets.len(),
            highest_index: self.highest_index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::AtomTable;

    fn slots(atoms: &mut AtomTable, text: &str, n: i64) -> Vec<Value> {
        vec![atoms.symbol_value(text), Value::Int(n)]
    }

    #[test]
    fn install_issues_monotonic_indices() {
        let mut atoms = AtomTable::new();
        let name = atoms.symbol("t");
        let mut store = FactStore::new(7);
        let s1 = slots(&mut atoms, "a", 1);
        let h1 = FactStore::hash_fact(&name, &s1);
        let s2 = slots(&mut atoms, "b", 2);
        let h2 = FactStore::hash_fact(&name, &s2);
        let id1 = store.install(0, s1, h1);
        let id2 = store.install(0, s2, h2);
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(store.iter_live().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn duplicate_lookup_compares_template_then_slots() {
        let mut atoms = AtomTable::new();
        let name = atoms.symbol("t");
        let mut store = FactStore::new(7);
        let s = slots(&mut atoms, "a", 1);
        let h = FactStore::hash_fact(&name, &s);
        let id = store.install(0, s.clone(), h);
        assert_eq!(store.find_duplicate(0, h, &s), Some(id));
        // Same tuple under a different template is not a duplicate.
        assert_eq!(store.find_duplicate(1, h, &s), None);
    }

    #[test]
    fn growth_and_reset_preserve_bucket_invariants() {
        let mut atoms = AtomTable::new();
        let name = atoms.symbol("t");
        let mut store = FactStore::new(3);
        let mut ids = Vec::new();
        for i in 0..20 {
            let s = slots(&mut atoms, "x", i);
            let h = FactStore::hash_fact(&name, &s);
            ids.push(store.install(0, s, h));
        }
        assert!(store.bucket_count() > 3);
        for &id in &ids {
            let fact = store.fact(id).unwrap();
            let bucket = (fact.hash % store.bucket_count() as u64) as usize;
            assert!(store.bucket_lens()[bucket] > 0);
        }
        for &id in &ids {
            store.unlink(id);
        }
        assert_eq!(store.bucket_count(), 3);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn garbage_held_while_pinned() {
        let mut atoms = AtomTable::new();
        let name = atoms.symbol("t");
        let mut store = FactStore::new(7);
        let s = slots(&mut atoms, "a", 1);
        let h = FactStore::hash_fact(&name, &s);
        let id = store.install(0, s, h);
        store.fact_mut(id).unwrap().token_pins = 1;
        store.unlink(id);
        assert_eq!(store.release_garbage(), 0);
        assert!(store.fact(id).is_some());
        store.fact_mut(id).unwrap().token_pins = 0;
        assert_eq!(store.release_garbage(), 1);
        assert!(store.fact(id).is_none());
    }
}
