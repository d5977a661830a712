//! Textual save/load round-trips.

use std::path::PathBuf;

use weft_core::{Environment, FactsQuery, SaveScope, SlotDef, Value};

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("weft-{}-{name}", std::process::id()))
}

#[test]
fn save_then_load_restores_the_store() {
    let path = scratch_file("roundtrip.clp");
    let mut env = Environment::new();
    env.assert_string("(a 1)").unwrap();
    env.assert_string("(b \"x\" 2.5)").unwrap();

    let written = env.save_facts(&path, SaveScope::Visible, None).unwrap();
    assert_eq!(written, 2);

    env.clear();
    assert_eq!(env.get_number_of_facts(), 0);

    let loaded = env.load_facts(&path).unwrap();
    assert_eq!(loaded, 2);
    assert_eq!(env.get_number_of_facts(), 2);

    let rendered: Vec<String> = env
        .facts(&FactsQuery::default())
        .into_iter()
        .map(|id| env.format_fact(id).unwrap())
        .collect();
    assert!(rendered.contains(&"(a 1)".to_string()));
    assert!(rendered.contains(&"(b \"x\" 2.5)".to_string()));
    std::fs::remove_file(&path).ok();
}

#[test]
fn explicit_templates_round_trip_with_slot_syntax() {
    let path = scratch_file("slots.clp");
    let mut env = Environment::new();
    env.define_template(
        "person",
        vec![SlotDef::single("name"), SlotDef::multi("hobbies")],
    )
    .unwrap();
    let name = env.string_value("ada");
    let hobbies = Value::Multifield(weft_core::Multifield::from_values(vec![
        env.symbol_value("chess"),
        env.symbol_value("math"),
    ]));
    let mut fb = env.create_fact_builder("person").unwrap();
    fb.put_slot(&env, "name", name).unwrap();
    fb.put_slot(&env, "hobbies", hobbies).unwrap();
    let original = fb.assert(&mut env).unwrap();
    fb.dispose(&mut env);
    let original_text = env.format_fact(original).unwrap();
    assert_eq!(original_text, "(person (name \"ada\") (hobbies chess math))");

    env.save_facts(&path, SaveScope::Local, None).unwrap();
    env.clear_facts().unwrap();
    let loaded = env.load_facts(&path).unwrap();
    assert_eq!(loaded, 1);
    let restored = env.facts(&FactsQuery::default())[0];
    assert_eq!(env.format_fact(restored).unwrap(), original_text);
    std::fs::remove_file(&path).ok();
}

#[test]
fn loader_accepts_assert_wrapped_forms() {
    let path = scratch_file("wrapped.clp");
    std::fs::write(&path, "(assert (c 3))\n(c 4)\n; trailing comment\n").unwrap();
    let mut env = Environment::new();
    let loaded = env.load_facts(&path).unwrap();
    assert_eq!(loaded, 2);
    assert_eq!(env.get_number_of_facts(), 2);
    std::fs::remove_file(&path).ok();
}

#[test]
fn template_filter_restricts_the_save() {
    let path = scratch_file("filtered.clp");
    let mut env = Environment::new();
    env.assert_string("(a 1)").unwrap();
    env.assert_string("(b 2)").unwrap();
    let a = env.find_template("a").unwrap();
    let written = env.save_facts(&path, SaveScope::Visible, Some(&[a])).unwrap();
    assert_eq!(written, 1);
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.trim(), "(a 1)");
    std::fs::remove_file(&path).ok();
}
