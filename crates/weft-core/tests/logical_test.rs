//! Logical dependencies: cascade retraction of derived facts.

use weft_core::{AssertError, Environment, PatternDef, RuleDef, SlotDef, Value};

fn setup() -> Environment {
    let mut env = Environment::new();
    env.define_template("trigger", vec![SlotDef::single("id")]).unwrap();
    env.define_template("derived", vec![SlotDef::single("id")]).unwrap();
    env.define_rule(RuleDef::new("r1").pattern(PatternDef::new("trigger")).logical())
        .unwrap();
    env
}

fn assert_with(env: &mut Environment, template: &str, id: i64) -> u64 {
    let mut fb = env.create_fact_builder(template).unwrap();
    fb.put_slot(env, "id", Value::Int(id)).unwrap();
    let fact = fb.assert(env).unwrap();
    fb.dispose(env);
    fact
}

#[test]
fn retracting_the_support_cascades() {
    let mut env = setup();
    let trigger = assert_with(&mut env, "trigger", 1);
    let activations = env.drain_agenda();
    assert_eq!(activations.len(), 1);

    let mut fb = env.create_fact_builder("derived").unwrap();
    fb.put_slot(&env, "id", Value::Int(1)).unwrap();
    let derived = fb.assert_with_support(&mut env, &activations[0]).unwrap();
    fb.dispose(&mut env);
    env.release_activation(&activations[0]);
    assert!(env.find_indexed_fact(derived).is_some());

    env.retract(trigger).unwrap();
    assert!(env.find_indexed_fact(derived).is_none());
    assert_eq!(env.get_number_of_facts(), 0);
}

#[test]
fn a_fact_with_two_supports_survives_one() {
    let mut env = setup();
    let t1 = assert_with(&mut env, "trigger", 1);
    let t2 = assert_with(&mut env, "trigger", 2);
    let activations = env.drain_agenda();
    assert_eq!(activations.len(), 2);

    // The same derived fact asserted under both activations: the
    // duplicate assertion merges and the second support attaches to the
    // existing fact.
    let mut fb = env.create_fact_builder("derived").unwrap();
    fb.put_slot(&env, "id", Value::Int(7)).unwrap();
    let first = fb.assert_with_support(&mut env, &activations[0]).unwrap();
    fb.put_slot(&env, "id", Value::Int(7)).unwrap();
    let second = fb.assert_with_support(&mut env, &activations[1]).unwrap();
    fb.dispose(&mut env);
    assert_eq!(first, second);
    for activation in &activations {
        env.release_activation(activation);
    }

    env.retract(t1).unwrap();
    assert!(env.find_indexed_fact(first).is_some());
    env.retract(t2).unwrap();
    assert!(env.find_indexed_fact(first).is_none());
}

#[test]
fn explicit_retraction_of_a_supported_fact_is_permanent() {
    let mut env = setup();
    let trigger = assert_with(&mut env, "trigger", 1);
    let activations = env.drain_agenda();
    let mut fb = env.create_fact_builder("derived").unwrap();
    fb.put_slot(&env, "id", Value::Int(1)).unwrap();
    let derived = fb.assert_with_support(&mut env, &activations[0]).unwrap();
    fb.dispose(&mut env);
    env.release_activation(&activations[0]);

    env.retract(derived).unwrap();
    assert!(env.find_indexed_fact(derived).is_none());
    // The support bookkeeping is gone too: retracting the trigger later
    // must not trip over the dead edge.
    env.retract(trigger).unwrap();
    assert_eq!(env.get_number_of_facts(), 0);
}

#[test]
fn stale_support_is_rejected() {
    let mut env = setup();
    let trigger = assert_with(&mut env, "trigger", 1);
    let activations = env.drain_agenda();
    env.release_activation(&activations[0]);
    env.retract(trigger).unwrap();

    // The partial match behind the activation is gone.
    let mut fb = env.create_fact_builder("derived").unwrap();
    fb.put_slot(&env, "id", Value::Int(1)).unwrap();
    assert_eq!(
        fb.assert_with_support(&mut env, &activations[0]),
        Err(AssertError::CouldNotAssert)
    );
    fb.dispose(&mut env);
    assert_eq!(env.get_number_of_facts(), 0);
}

#[test]
fn support_from_a_non_logical_rule_is_unconditional() {
    let mut env = Environment::new();
    env.define_template("trigger", vec![SlotDef::single("id")]).unwrap();
    env.define_template("derived", vec![SlotDef::single("id")]).unwrap();
    env.define_rule(RuleDef::new("plain").pattern(PatternDef::new("trigger")))
        .unwrap();
    let trigger = {
        let mut fb = env.create_fact_builder("trigger").unwrap();
        fb.put_slot(&env, "id", Value::Int(1)).unwrap();
        let id = fb.assert(&mut env).unwrap();
        fb.dispose(&mut env);
        id
    };
    let activations = env.drain_agenda();
    let mut fb = env.create_fact_builder("derived").unwrap();
    fb.put_slot(&env, "id", Value::Int(1)).unwrap();
    let derived = fb.assert_with_support(&mut env, &activations[0]).unwrap();
    fb.dispose(&mut env);
    env.release_activation(&activations[0]);

    env.retract(trigger).unwrap();
    assert!(env.find_indexed_fact(derived).is_some());
}
