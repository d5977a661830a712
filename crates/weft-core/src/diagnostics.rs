//! Developer diagnostics.
//!
//! Library-level renditions of the developer commands: the per-template
//! alpha tree dump, the fact-hash-table occupancy report, the oversize
//! beta-memory traversal, and the integrity validator that checks the
//! store and network invariants end to end. These are observability
//! hooks; none of them mutates the environment.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::Environment;
use crate::error::IntegrityError;
use crate::fact::FactId;
use crate::fact_store::FactStore;
use crate::beta::{JoinId, RuleId};
use crate::template::TemplateId;

fn fail(check: &'static str, detail: String) -> IntegrityError {
    IntegrityError { check, detail }
}

/// Render the discrimination tree of one template, one node per line,
/// children indented under their parent, terminal memories annotated.
pub fn show_alpha_tree(env: &Environment, template: TemplateId) -> Option<String> {
    let name = env.template_name(template)?;
    let mut out = format!("({name})\n");
    let mut stack: Vec<(u32, usize)> = env
        .alpha
        .roots_of(template)
        .iter()
        .rev()
        .map(|&n| (n, 1))
        .collect();
    while let Some((node_id, indent)) = stack.pop() {
        let node = env.alpha.node(node_id);
        for _ in 0..indent {
            out.push_str("  ");
        }
        out.push_str(&format!("slot {} {:?}", node.depth, node.test));
        if let Some(memory) = node.memory {
            let mem = env.alpha.memory(memory);
            out.push_str(&format!(" => memory #{memory} [{} facts", mem.len()));
            if let Some(slot) = mem.partition_slot {
                out.push_str(&format!(", partitioned on slot {slot}"));
            }
            out.push(']');
        }
        out.push('\n');
        for &child in node.children.iter().rev() {
            stack.push((child, indent + 1));
        }
    }
    Some(out)
}

/// Fact-hash-table occupancy: bucket count, entries, and chain shape.
pub fn hash_table_report(env: &Environment) -> String {
    let lens = env.store.bucket_lens();
    let entries: usize = lens.iter().sum();
    let occupied = lens.iter().filter(|len| **len > 0).count();
    let longest = lens.iter().copied().max().unwrap_or(0);
    let mut out = String::new();
    out.push_str(&format!("buckets:        {}\n", lens.len()));
    out.push_str(&format!("entries:        {entries}\n"));
    out.push_str(&format!("occupied:       {occupied}\n"));
    out.push_str(&format!("longest chain:  {longest}\n"));
    if occupied > 0 {
        out.push_str(&format!(
            "avg chain:      {:.2}\n",
            entries as f64 / occupied as f64
        ));
    }
    out
}

/// One join whose output memory exceeds the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaMemoryReport {
    pub rule: RuleId,
    pub rule_name: String,
    pub join: JoinId,
    pub position: usize,
    pub tokens: usize,
}

/// Joins whose output memories exceed the configured warning threshold.
pub fn oversize_beta_memories(env: &Environment) -> Vec<BetaMemoryReport> {
    let threshold = env.config().beta_memory_warn_threshold;
    env.beta
        .joins()
        .filter(|join| join.memory_len() > threshold)
        .map(|join| BetaMemoryReport {
            rule: join.rule,
            rule_name: env
                .rule(join.rule)
                .map(|r| r.name.clone())
                .unwrap_or_default(),
            join: join.id,
            position: join.position,
            tokens: join.memory_len(),
        })
        .collect()
}

/// Atom-table occupancy: one line per primitive sub-table.
pub fn atom_table_report(env: &Environment) -> String {
    let stats = env.atoms().stats();
    let mut out = String::new();
    out.push_str(&format!("symbols:        {}\n", stats.symbols));
    out.push_str(&format!("strings:        {}\n", stats.strings));
    out.push_str(&format!("instance names: {}\n", stats.instance_names));
    out.push_str(&format!("bitmaps:        {}\n", stats.bitmaps));
    out
}

/// The environment counters rendered as pretty JSON, for host log sinks.
pub fn stats_report(env: &Environment) -> String {
    serde_json::to_string_pretty(&env.stats()).unwrap_or_default()
}

/// Verify the store and network invariants: list/bucket linkage and hash
/// caches of live facts, membership symmetry between facts and alpha
/// memories, partition-bucket consistency, pin counts against the token
/// population, and alpha-tree shape.
pub fn validate_integrity(env: &Environment) -> Result<(), IntegrityError> {
    // Live facts: correctly linked, hashed, and bucketed.
    for id in env.store.iter_live() {
        let Some(fact) = env.store.fact(id) else {
            return Err(fail("live-list", format!("fact {id} on the live list has no record")));
        };
        if fact.garbage {
            return Err(fail("live-list", format!("fact {id} is garbage but still listed")));
        }
        let Some(template) = env.templates.get(fact.template) else {
            return Err(fail("fact-template", format!("fact {id} names a missing template")));
        };
        let recomputed = FactStore::hash_fact(&template.name, &fact.slots);
        if recomputed != fact.hash {
            return Err(fail("fact-hash-cache", format!("fact {id} cached hash is stale")));
        }
        if !env.store.bucket_contains(fact.hash, id) {
            return Err(fail("fact-bucket", format!("fact {id} missing from its hash bucket")));
        }
        for &membership in &fact.memberships {
            if !env.alpha.memory(membership).contains(id) {
                return Err(fail(
                    "membership-forward",
                    format!("fact {id} claims membership in alpha memory {membership}"),
                ));
            }
        }
    }

    // Alpha memories: members live, symmetric, and bucketed consistently.
    for memory in env.alpha.memories() {
        for &id in &memory.facts {
            let Some(fact) = env.store.fact(id) else {
                return Err(fail(
                    "membership-record",
                    format!("alpha memory {} holds released fact {id}", memory.id),
                ));
            };
            if fact.garbage {
                return Err(fail(
                    "membership-garbage",
                    format!("alpha memory {} holds garbage fact {id}", memory.id),
                ));
            }
            if !fact.memberships.contains(&memory.id) {
                return Err(fail(
                    "membership-backward",
                    format!("alpha memory {} holds fact {id} without a back-reference", memory.id),
                ));
            }
        }
        if memory.partition_slot.is_some() {
            let bucketed: usize = memory.buckets.values().map(Vec::len).sum();
            if bucketed != memory.facts.len() {
                return Err(fail(
                    "partition-buckets",
                    format!(
                        "alpha memory {}: {} facts but {bucketed} bucket entries",
                        memory.id,
                        memory.facts.len()
                    ),
                ));
            }
        }
    }

    // Token pins: every fact's pin count matches the token population.
    let mut pins: HashMap<FactId, u32> = HashMap::new();
    for join in env.beta.joins() {
        for token in join.out.values() {
            for fact in token.facts.iter().flatten() {
                *pins.entry(*fact).or_insert(0) += 1;
            }
        }
    }
    for fact in env.store.iter_all() {
        let expected = pins.get(&fact.id).copied().unwrap_or(0);
        if fact.token_pins != expected {
            return Err(fail(
                "token-pins",
                format!(
                    "fact {} has {} token pins, {} tokens reference it",
                    fact.id, fact.token_pins, expected
                ),
            ));
        }
    }

    // Alpha tree shape: every terminal memory reachable from its
    // template's root, depths increasing along every edge.
    let mut reachable_memories = 0usize;
    for template in env.alpha.root_templates() {
        let mut stack: Vec<u32> = env.alpha.roots_of(template).to_vec();
        while let Some(node_id) = stack.pop() {
            let node = env.alpha.node(node_id);
            if node.template != template {
                return Err(fail(
                    "alpha-template",
                    format!("node {node_id} reached from the wrong template root"),
                ));
            }
            if let Some(memory) = node.memory {
                if env.alpha.memory(memory).node != node_id {
                    return Err(fail(
                        "alpha-memory-node",
                        format!("alpha memory {memory} does not point back at node {node_id}"),
                    ));
                }
                reachable_memories += 1;
            }
            for &child in &node.children {
                if env.alpha.node(child).depth != node.depth + 1 {
                    return Err(fail(
                        "alpha-depth",
                        format!("node {child} does not deepen its parent {node_id}"),
                    ));
                }
                stack.push(child);
            }
        }
    }
    if reachable_memories != env.alpha.memory_count() {
        return Err(fail(
            "alpha-reachability",
            format!(
                "{} alpha memories exist but {reachable_memories} are reachable",
                env.alpha.memory_count()
            ),
        ));
    }

    Ok(())
}
