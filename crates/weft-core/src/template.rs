//! Templates: the schemas of working memory.
//!
//! A template names a relation and declares its ordered slots. Templates
//! are module-scoped; lookup walks the visibility order of the current
//! module. An *implied* template is the auto-created single-multislot
//! schema behind ordered facts whose relation was never declared.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;
use weft_types::{AtomTable, Lexeme, Value};

use crate::constraint::{Cardinality, ConstraintRecord, NumBound, NumericRange, TypeMask};
use crate::error::TemplateError;
use crate::module::{ModuleGraph, ModuleId};

pub type TemplateId = u32;

/// Slot name used by implied templates.
pub const IMPLIED_SLOT: &str = "implied";

/// Evaluation seam for dynamic slot defaults. The expression evaluator is
/// an external collaborator; the core only demands a value (or a reason
/// the evaluation failed) at assertion time.
pub trait DefaultSupplier {
    fn supply(&self, atoms: &mut AtomTable) -> Result<Value, String>;
}

impl<F> DefaultSupplier for F
where
    F: Fn(&mut AtomTable) -> Result<Value, String>,
{
    fn supply(&self, atoms: &mut AtomTable) -> Result<Value, String> {
        self(atoms)
    }
}

/// How a slot left void by the builder is filled at assertion.
#[derive(Clone)]
pub enum DefaultPolicy {
    /// Assertion fails if the slot is left void.
    NoDefault,
    Static(Value),
    Dynamic(Rc<dyn DefaultSupplier>),
    /// Synthesize the minimal value satisfying the slot's constraints.
    Derived,
}

impl fmt::Debug for DefaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultPolicy::NoDefault => write!(f, "NoDefault"),
            DefaultPolicy::Static(v) => write!(f, "Static({v})"),
            DefaultPolicy::Dynamic(_) => write!(f, "Dynamic(..)"),
            DefaultPolicy::Derived => write!(f, "Derived"),
        }
    }
}

/// Discriminant of [`DefaultPolicy`], exposed by the template accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultKind {
    NoDefault,
    Static,
    Dynamic,
    Derived,
}

#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    pub name: Lexeme,
    pub multislot: bool,
    pub default: DefaultPolicy,
    pub facets: Vec<(Lexeme, Value)>,
    pub constraint: ConstraintRecord,
}

impl SlotDescriptor {
    pub fn default_kind(&self) -> DefaultKind {
        match self.default {
            DefaultPolicy::NoDefault => DefaultKind::NoDefault,
            DefaultPolicy::Static(_) => DefaultKind::Static,
            DefaultPolicy::Dynamic(_) => DefaultKind::Dynamic,
            DefaultPolicy::Derived => DefaultKind::Derived,
        }
    }

    pub fn facet_value(&self, facet: &str) -> Option<&Value> {
        self.facets.iter().find(|(name, _)| name.text() == facet).map(|(_, v)| v)
    }
}

#[derive(Debug)]
pub struct Template {
    pub id: TemplateId,
    pub name: Lexeme,
    pub module: ModuleId,
    pub implied: bool,
    pub slots: Vec<SlotDescriptor>,
    /// Builders and modifiers currently bound to this template.
    pub busy: u32,
    /// Live facts of this template.
    pub fact_count: usize,
}

impl Template {
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name.text() == name)
    }

    /// Both the descriptor and its 0-based position.
    pub fn slot(&self, name: &str) -> Option<(usize, &SlotDescriptor)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.name.text() == name)
    }
}

/// Public slot specification consumed by `define_template`. Values must be
/// interned in the defining environment before use.
#[derive(Debug, Clone)]
pub struct SlotDef {
    pub(crate) name: String,
    pub(crate) multislot: bool,
    pub(crate) default: DefaultPolicy,
    pub(crate) facets: Vec<(String, Value)>,
    pub(crate) constraint: ConstraintRecord,
}

impl SlotDef {
    pub fn single(name: &str) -> Self {
        Self {
            name: name.to_string(),
            multislot: false,
            default: DefaultPolicy::Derived,
            facets: Vec::new(),
            constraint: ConstraintRecord::default(),
        }
    }

    pub fn multi(name: &str) -> Self {
        Self { multislot: true, ..Self::single(name) }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = DefaultPolicy::Static(value);
        self
    }

    pub fn with_dynamic_default<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&mut AtomTable) -> Result<Value, String> + 'static,
    {
        self.default = DefaultPolicy::Dynamic(Rc::new(supplier));
        self
    }

    pub fn no_default(mut self) -> Self {
        self.default = DefaultPolicy::NoDefault;
        self
    }

    pub fn with_types(mut self, types: TypeMask) -> Self {
        self.constraint.types = types;
        self
    }

    pub fn with_allowed_values(mut self, allowed: Vec<Value>) -> Self {
        self.constraint.allowed = Some(allowed);
        self
    }

    pub fn with_allowed_classes(mut self, classes: Vec<Lexeme>) -> Self {
        self.constraint.allowed_classes = Some(classes);
        self
    }

    pub fn with_range(mut self, min: NumBound, max: NumBound) -> Self {
        self.constraint.range = NumericRange { min, max };
        self
    }

    pub fn with_cardinality(mut self, min: usize, max: Option<usize>) -> Self {
        self.constraint.cardinality = Cardinality { min, max };
        self
    }

    pub fn with_facet(mut self, name: &str, value: Value) -> Self {
        self.facets.push((name.to_string(), value));
        self
    }
}

#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: Vec<Option<Template>>,
    by_name: HashMap<(ModuleId, String), TemplateId>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(
        &mut self,
        atoms: &mut AtomTable,
        module: ModuleId,
        name: &str,
        slots: Vec<SlotDef>,
        implied: bool,
    ) -> Result<TemplateId, TemplateError> {
        let key = (module, name.to_string());
        if self.by_name.contains_key(&key) {
            return Err(TemplateError::DuplicateName(name.to_string()));
        }
        let mut descriptors = Vec::with_capacity(slots.len());
        for def in slots {
            if descriptors.iter().any(|d: &SlotDescriptor| d.name.text() == def.name) {
                return Err(TemplateError::DuplicateSlot(name.to_string(), def.name));
            }
            let facets = def
                .facets
                .into_iter()
                .map(|(facet, value)| (atoms.symbol(&facet), value))
                .collect();
            descriptors.push(SlotDescriptor {
                name: atoms.symbol(&def.name),
                multislot: def.multislot,
                default: def.default,
                facets,
                constraint: def.constraint,
            });
        }
        let id = self.templates.len() as TemplateId;
        debug!(template = name, id, implied, "defining template");
        self.templates.push(Some(Template {
            id,
            name: atoms.symbol(name),
            module,
            implied,
            slots: descriptors,
            busy: 0,
            fact_count: 0,
        }));
        self.by_name.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: TemplateId) -> Option<&Template> {
        self.templates.get(id as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: TemplateId) -> Option<&mut Template> {
        self.templates.get_mut(id as usize)?.as_mut()
    }

    pub fn find_in_module(&self, module: ModuleId, name: &str) -> Option<TemplateId> {
        self.by_name.get(&(module, name.to_string())).copied()
    }

    /// Search the current module and then its imports, nearest first.
    pub fn find(&self, graph: &ModuleGraph, name: &str) -> Option<TemplateId> {
        graph
            .visible_order(graph.current())
            .into_iter()
            .find_map(|m| self.find_in_module(m, name))
    }

    /// Deletion requires no attached builders, no facts, and an empty
    /// alpha subnetwork (asserted by the caller, which owns the network).
    pub fn delete(&mut self, id: TemplateId, alpha_empty: bool) -> Result<(), TemplateError> {
        let template = self.get(id).ok_or(TemplateError::NotFound)?;
        if template.busy > 0 || template.fact_count > 0 || !alpha_empty {
            return Err(TemplateError::InUse(template.name.text().to_string()));
        }
        let key = (template.module, template.name.text().to_string());
        self.by_name.remove(&key);
        self.templates[id as usize] = None;
        Ok(())
    }

    /// Templates visible from `module` (or every template), in id order.
    pub fn list(&self, graph: &ModuleGraph, module: Option<ModuleId>) -> Vec<TemplateId> {
        let mask = module.map(|m| graph.visible_mask(m));
        self.templates
            .iter()
            .flatten()
            .filter(|t| mask.is_none_or(|mask| mask & (1u64 << t.module) != 0))
            .map(|t| t.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.templates.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
