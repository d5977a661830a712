//! Default filling and constraint rejection at the builder boundary.

use weft_core::{
    AssertError, AtomTable, Environment, Multifield, SlotDef, SlotError, TypeMask, Value,
};

#[test]
fn void_slots_fill_from_static_defaults() {
    let mut env = Environment::new();
    let tag_default = env.string_value("x");
    env.define_template(
        "item",
        vec![
            SlotDef::single("qty").with_default(Value::Int(1)),
            SlotDef::single("tag").with_default(tag_default),
        ],
    )
    .unwrap();
    let mut fb = env.create_fact_builder("item").unwrap();
    fb.put_slot(&env, "qty", Value::Int(5)).unwrap();
    let id = fb.assert(&mut env).unwrap();
    fb.dispose(&mut env);
    assert_eq!(env.get_fact_slot(id, "qty").unwrap(), Value::Int(5));
    assert_eq!(env.get_fact_slot(id, "tag").unwrap(), env.string_value("x"));
}

#[test]
fn dynamic_defaults_are_evaluated_at_assert() {
    let mut env = Environment::new();
    env.define_template(
        "stamped",
        vec![
            SlotDef::single("id"),
            SlotDef::single("stamp").with_dynamic_default(|_: &mut AtomTable| Ok(Value::Int(42))),
        ],
    )
    .unwrap();
    let mut fb = env.create_fact_builder("stamped").unwrap();
    fb.put_slot(&env, "id", Value::Int(1)).unwrap();
    let id = fb.assert(&mut env).unwrap();
    fb.dispose(&mut env);
    assert_eq!(env.get_fact_slot(id, "stamp").unwrap(), Value::Int(42));
}

#[test]
fn failing_dynamic_default_blocks_the_assertion() {
    let mut env = Environment::new();
    env.define_template(
        "bad",
        vec![SlotDef::single("x").with_dynamic_default(|_: &mut AtomTable| {
            Err("evaluation failed".to_string())
        })],
    )
    .unwrap();
    let mut fb = env.create_fact_builder("bad").unwrap();
    assert_eq!(fb.assert(&mut env), Err(AssertError::CouldNotAssert));
    fb.dispose(&mut env);
    assert_eq!(env.get_number_of_facts(), 0);
}

#[test]
fn no_default_requires_a_value() {
    let mut env = Environment::new();
    env.define_template("strict", vec![SlotDef::single("x").no_default()])
        .unwrap();
    let mut fb = env.create_fact_builder("strict").unwrap();
    assert_eq!(fb.assert(&mut env), Err(AssertError::CouldNotAssert));
    fb.put_slot(&env, "x", Value::Int(9)).unwrap();
    let id = fb.assert(&mut env).unwrap();
    fb.dispose(&mut env);
    assert_eq!(env.get_fact_slot(id, "x").unwrap(), Value::Int(9));
}

#[test]
fn derived_multislot_default_is_the_empty_multifield() {
    let mut env = Environment::new();
    env.define_template("bag", vec![SlotDef::multi("contents")]).unwrap();
    let mut fb = env.create_fact_builder("bag").unwrap();
    let id = fb.assert(&mut env).unwrap();
    fb.dispose(&mut env);
    let value = env.get_fact_slot(id, "contents").unwrap();
    assert_eq!(value, Value::Multifield(Multifield::empty()));
}

#[test]
fn cardinality_violation_rejects_the_value() {
    let mut env = Environment::new();
    env.define_template(
        "names",
        vec![SlotDef::multi("names")
            .with_types(TypeMask::SYMBOL)
            .with_cardinality(1, Some(2))],
    )
    .unwrap();
    let mut fb = env.create_fact_builder("names").unwrap();
    let too_many = Value::Multifield(Multifield::from_values(vec![
        env.symbol_value("a"),
        env.symbol_value("b"),
        env.symbol_value("c"),
    ]));
    assert_eq!(
        fb.put_slot(&env, "names", too_many),
        Err(SlotError::Cardinality { slot: "names".to_string(), len: 3, min: 1, max: Some(2) })
    );
    fb.dispose(&mut env);
    assert_eq!(env.get_number_of_facts(), 0);
}

#[test]
fn type_and_allowed_value_violations_are_local() {
    let mut env = Environment::new();
    let red = env.symbol_value("red");
    let green = env.symbol_value("green");
    env.define_template(
        "light",
        vec![SlotDef::single("color")
            .with_types(TypeMask::SYMBOL)
            .with_allowed_values(vec![red.clone(), green.clone()])],
    )
    .unwrap();
    let mut fb = env.create_fact_builder("light").unwrap();
    assert!(matches!(
        fb.put_slot(&env, "color", Value::Int(3)),
        Err(SlotError::Type { .. })
    ));
    let blue = env.symbol_value("blue");
    assert!(matches!(
        fb.put_slot(&env, "color", blue),
        Err(SlotError::AllowedValues { .. })
    ));
    fb.put_slot(&env, "color", red).unwrap();
    let id = fb.assert(&mut env).unwrap();
    fb.dispose(&mut env);
    assert_eq!(env.get_number_of_facts(), 1);
    assert_eq!(env.get_fact_slot(id, "color").unwrap(), env.symbol_value("red"));
}

#[test]
fn unknown_slot_is_reported() {
    let mut env = Environment::new();
    env.define_template("t", vec![SlotDef::single("x")]).unwrap();
    let mut fb = env.create_fact_builder("t").unwrap();
    assert_eq!(
        fb.put_slot(&env, "y", Value::Int(1)),
        Err(SlotError::NotFound("y".to_string()))
    );
    fb.dispose(&mut env);
}
