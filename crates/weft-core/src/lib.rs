#![allow(missing_docs)]
//! # Weft Core — Forward-Chaining Production Rule Core
//!
//! ## Overview
//!
//! Weft Core is the working-memory and pattern-matching heart of a
//! forward-chaining production rule system: a content-addressed,
//! hash-deduplicated fact store organized by user-defined templates, and a
//! Rete-style discrimination network that incrementally propagates
//! assertion, retraction, and modification events so that every rule
//! whose left-hand side is satisfied can be enumerated efficiently.
//!
//! ## Quick Start
//!
//! ```rust
//! use weft_core::{Environment, SlotDef, RuleDef, PatternDef, Value};
//!
//! let mut env = Environment::new();
//!
//! env.define_template("point", vec![SlotDef::single("x"), SlotDef::single("y")])?;
//! env.define_rule(
//!     RuleDef::new("origin-x").pattern(PatternDef::new("point").constant(0, Value::Int(0))),
//! )?;
//!
//! let mut fb = env.create_fact_builder("point")?;
//! fb.put_slot(&env, "x", Value::Int(0))?;
//! fb.put_slot(&env, "y", Value::Int(4))?;
//! let fact = fb.assert(&mut env)?;
//! fb.dispose(&mut env);
//!
//! let activations = env.drain_agenda();
//! assert_eq!(activations.len(), 1);
//! assert_eq!(activations[0].facts, vec![Some(fact)]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | The environment: owner of all state, public surface |
//! | [`template`] | Templates, slot descriptors, defaults, registry |
//! | [`constraint`] | Slot constraint records and checking |
//! | [`fact`] | The fact record |
//! | [`fact_store`] | Hash-deduplicated working memory |
//! | [`build`] | Fact builders and modifiers |
//! | [`alpha`] | Per-template discrimination tree |
//! | [`beta`] | Join network and partial-match engine |
//! | [`logical`] | Logical dependencies (truth maintenance) |
//! | [`rule`] | Programmatic rule definitions and compilation |
//! | [`parse`] | Fact-literal parsing |
//! | [`textio`] | Textual save/load of the fact set |
//! | [`query`] | Fact-set queries |
//! | [`diagnostics`] | Alpha-tree dump, hash report, integrity validator |
//! | [`error`] | Typed per-operation error enums |
//!
//! ## Concurrency Model
//!
//! Strictly single-threaded and cooperative: an environment is an owned
//! context, never shared across threads. Propagation runs to quiescence
//! under the join-operation lease; a cooperative halt flag stops long
//! enumerations between facts.

pub mod alpha;
pub mod beta;
pub mod build;
pub mod constraint;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fact;
pub mod fact_store;
pub mod logical;
pub mod module;
mod parse;
pub mod query;
pub mod rule;
pub mod template;
pub mod textio;

// Re-export the value model so embedding hosts need only this crate.
pub use weft_types::{
    AtomTable, Bitmap, ExternalAddress, Lexeme, LexemeKind, Multifield, Value, ValueTag,
};

pub use alpha::{AlphaMemoryId, AlphaNodeId, AlphaTest};
pub use beta::{Activation, JoinBindings, JoinPredicate, JoinTest, RuleId, TokenId};
pub use build::{FactBuilder, FactModifier};
pub use constraint::{
    Cardinality, ConstraintRecord, InstanceClassifier, NumBound, NumericRange, TypeMask,
};
pub use engine::{Environment, EnvironmentConfig, EnvironmentStats, FactsQuery};
pub use error::{
    AssertError, BuildError, IntegrityError, LoadError, ModifyError, ModuleError, ParseError,
    RetractError, RuleError, SlotError, TemplateError,
};
pub use fact::FactId;
pub use fact_store::INITIAL_FACT_TABLE_SIZE;
pub use module::{MAIN_MODULE, MAX_MODULES, ModuleId};
pub use rule::{PatternDef, RuleDef};
pub use template::{DefaultKind, DefaultSupplier, SlotDef, TemplateId};
pub use textio::SaveScope;
