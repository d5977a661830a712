//! Deduplication of structurally equal assertions.

use weft_core::{Environment, FactsQuery, SlotDef, Value};

#[test]
fn ordered_assertion_deduplicates() {
    let mut env = Environment::new();
    let first = env.assert_string("(point 3 4)").unwrap();
    let second = env.assert_string("(point 3 4)").unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, first);
    assert_eq!(env.get_number_of_facts(), 1);
}

#[test]
fn template_assertion_deduplicates() {
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
    assert_eq!(second, first);
    assert_eq!(env.get_number_of_facts(), 1);
}

#[test]
fn templates_partition_the_equivalence_classes() {
    let mut env = Environment::new();
    env.assert_string("(a 1)").unwrap();
    env.assert_string("(b 1)").unwrap();
    assert_eq!(env.get_number_of_facts(), 2);
}

#[test]
fn signed_zeros_are_distinct_keys() {
    let mut env = Environment::new();
    let pos = env.assert_string("(z 0.0)").unwrap();
    let neg = env.assert_string("(z -0.0)").unwrap();
    assert_ne!(pos, neg);
    assert_eq!(env.get_number_of_facts(), 2);
}

#[test]
fn duplication_flag_disables_the_merge() {
    let mut env = Environment::new();
    assert!(!env.get_fact_duplication());
    env.set_fact_duplication(true);
    let first = env.assert_string("(point 3 4)").unwrap();
    let second = env.assert_string("(point 3 4)").unwrap();
    assert_ne!(first, second);
    assert_eq!(env.facts(&FactsQuery::default()), vec![first, second]);
}
