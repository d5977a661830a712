//! The fact record: the unit of working memory.

use std::rc::Rc;

use weft_types::Value;

use crate::alpha::AlphaMemoryId;
use crate::template::TemplateId;

/// Monotonic 64-bit fact index. 0 is never issued; a fact keeps its index
/// across modification.
pub type FactId = u64;

#[derive(Debug)]
pub struct Fact {
    pub id: FactId,
    pub template: TemplateId,
    pub slots: Vec<Value>,
    /// Cached canonical hash over template name and slot tuple.
    pub hash: u64,
    /// Set on retraction; storage is held until the pins drop to zero.
    pub garbage: bool,
    /// Partial matches currently containing this fact.
    pub token_pins: u32,
    /// External holders: attached modifiers and drained activations.
    pub external_pins: u32,
    /// Pattern-match list: the alpha memories this fact belongs to.
    pub memberships: Vec<AlphaMemoryId>,
    /// Slot snapshot frozen when the fact first entered a partial match,
    /// keeping bindings stable for in-flight activations across modifies.
    pub basis: Option<Rc<[Value]>>,
}

impl Fact {
    pub fn busy(&self) -> u32 {
        self.token_pins + self.external_pins
    }

    /// Slot values as stabilized for partial matches: the basis snapshot
    /// when one exists, the current tuple otherwise.
    pub fn basis_slots(&self) -> &[Value] {
        match &self.basis {
            Some(basis) => basis,
            None => &self.slots,
        }
    }
}
