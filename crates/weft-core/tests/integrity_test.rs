//! Store-wide invariants under churn, hash-table growth, queries, and the
//! diagnostic surface.

use weft_core::diagnostics::{
    hash_table_report, oversize_beta_memories, show_alpha_tree, stats_report, validate_integrity,
};
use weft_core::query::{any_fact, count_facts, find_all_facts};
use weft_core::{Environment, EnvironmentConfig, PatternDef, RuleDef, SlotDef, Value};

#[test]
fn integrity_holds_under_churn() -> anyhow::Result<()> {
    let mut env = Environment::new();
    env.define_template("n", vec![SlotDef::single("v")])?;
    env.define_rule(RuleDef::new("all").pattern(PatternDef::new("n")))?;
    let mut ids = Vec::new();
    for i in 0..100 {
        let mut fb = env.create_fact_builder("n")?;
        fb.put_slot(&env, "v", Value::Int(i))?;
        ids.push(fb.assert(&mut env)?);
        fb.dispose(&mut env);
    }
    validate_integrity(&env)?;
    for id in ids.iter().step_by(3) {
        env.retract(*id)?;
    }
    validate_integrity(&env)?;
    assert_eq!(env.get_number_of_facts(), 66);
    assert_eq!(env.agenda().len(), 66);
    Ok(())
}

#[test]
fn hash_table_grows_and_resets() {
    let config = EnvironmentConfig { initial_fact_table_size: 4, ..Default::default() };
    let mut env = Environment::with_config(config);
    for i in 0..50 {
        env.assert_string(&format!("(n {i})")).unwrap();
    }
    assert!(env.store_stats().buckets > 4);
    validate_integrity(&env).unwrap();
    env.retract_all().unwrap();
    assert_eq!(env.store_stats().buckets, 4);
    assert_eq!(env.get_number_of_facts(), 0);
    validate_integrity(&env).unwrap();
}

#[test]
fn indices_are_monotonic_and_never_reused() {
    let mut env = Environment::new();
    let first = env.assert_string("(a 1)").unwrap();
    env.retract(first).unwrap();
    let second = env.assert_string("(a 1)").unwrap();
    assert!(second > first);
    assert_eq!(env.find_indexed_fact(first), None);
    assert_eq!(env.find_indexed_fact(second), Some(second));
}

#[test]
fn oversize_beta_memories_are_reported() {
    let config = EnvironmentConfig { beta_memory_warn_threshold: 5, ..Default::default() };
    let mut env = Environment::with_config(config);
    env.define_template("thing", vec![SlotDef::single("id")]).unwrap();
    env.define_rule(RuleDef::new("all").pattern(PatternDef::new("thing")))
        .unwrap();
    for i in 0..10 {
        let mut fb = env.create_fact_builder("thing").unwrap();
        fb.put_slot(&env, "id", Value::Int(i)).unwrap();
        fb.assert(&mut env).unwrap();
        fb.dispose(&mut env);
    }
    let reports = oversize_beta_memories(&env);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].tokens, 10);
    assert_eq!(reports[0].rule_name, "all");
}

#[test]
fn diagnostic_renderings_cover_the_network() {
    let mut env = Environment::new();
    env.define_template("edge", vec![SlotDef::single("from"), SlotDef::single("to")])
        .unwrap();
    let a = env.symbol_value("a");
    env.define_rule(RuleDef::new("from-a").pattern(PatternDef::new("edge").constant(0, a)))
        .unwrap();
    env.assert_string("(marker 1)").unwrap();
    let edge = env.find_template("edge").unwrap();
    let tree = show_alpha_tree(&env, edge).unwrap();
    assert!(tree.contains("(edge)"));
    assert!(tree.contains("memory #"));
    let report = hash_table_report(&env);
    assert!(report.contains("buckets"));
    assert!(stats_report(&env).contains("fact_count"));
}

#[test]
fn queries_filter_by_template_and_predicate() {
    let mut env = Environment::new();
    env.define_template("n", vec![SlotDef::single("v")]).unwrap();
    for i in 0..6 {
        let mut fb = env.create_fact_builder("n").unwrap();
        fb.put_slot(&env, "v", Value::Int(i)).unwrap();
        fb.assert(&mut env).unwrap();
        fb.dispose(&mut env);
    }
    env.assert_string("(other 1)").unwrap();
    let n = env.find_template("n").unwrap();
    let evens = find_all_facts(&env, &[n], |view| {
        view.slot("v").and_then(|v| v.as_int()).is_some_and(|v| v % 2 == 0)
    });
    assert_eq!(evens.len(), 3);
    assert_eq!(
        count_facts(&env, &[n], |view| view.slot("v").is_some()),
        6
    );
    let found = any_fact(&env, &[n], |view| {
        view.slot("v") == Some(Value::Int(4))
    });
    assert!(found.is_some());
}

#[test]
fn halt_flag_stops_enumerations() {
    let mut env = Environment::new();
    for i in 0..5 {
        env.assert_string(&format!("(n {i})")).unwrap();
    }
    env.set_halt(true);
    assert!(env.facts(&weft_core::FactsQuery::default()).is_empty());
    env.set_halt(false);
    assert_eq!(env.facts(&weft_core::FactsQuery::default()).len(), 5);
}
