//! Assertion and matching throughput.

use criterion::{Criterion, criterion_group, criterion_main};
use weft_core::{Environment, PatternDef, RuleDef, SlotDef, Value};

fn assert_1k_facts(c: &mut Criterion) {
    c.bench_function("assert_1k_facts", |b| {
        b.iter(|| {
            let mut env = Environment::new();
            env.define_template("n", vec![SlotDef::single("v")]).unwrap();
            let mut fb = env.create_fact_builder("n").unwrap();
            for i in 0..1_000 {
                fb.put_slot(&env, "v", Value::Int(i)).unwrap();
                fb.assert(&mut env).unwrap();
            }
            fb.dispose(&mut env);
            env.get_number_of_facts()
        })
    });
}

fn assert_1k_facts_with_join_rule(c: &mut Criterion) {
    c.bench_function("assert_1k_facts_with_join_rule", |b| {
        b.iter(|| {
            let mut env = Environment::new();
            env.define_template("edge", vec![SlotDef::single("from"), SlotDef::single("to")])
                .unwrap();
            env.define_rule(
                RuleDef::new("chain")
                    .pattern(PatternDef::new("edge"))
                    .pattern(PatternDef::new("edge").join_eq(0, 1, 0)),
            )
            .unwrap();
            let mut fb = env.create_fact_builder("edge").unwrap();
            for i in 0..1_000i64 {
                fb.put_slot(&env, "from", Value::Int(i)).unwrap();
                fb.put_slot(&env, "to", Value::Int(i + 1)).unwrap();
                fb.assert(&mut env).unwrap();
            }
            fb.dispose(&mut env);
            env.agenda().len()
        })
    });
}

criterion_group!(benches, assert_1k_facts, assert_1k_facts_with_join_rule);
criterion_main!(benches);
