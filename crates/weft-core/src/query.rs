//! Fact-set queries: predicate-driven iteration over the live fact set
//! restricted to a template list. The host supplies the predicate; the
//! enumeration honors the cooperative halt flag between facts.

use weft_types::Value;

use crate::engine::Environment;
use crate::fact::FactId;
use crate::template::TemplateId;

/// Read-only view of one fact handed to query predicates.
pub struct FactView<'a> {
    env: &'a Environment,
    id: FactId,
}

impl FactView<'_> {
    pub fn id(&self) -> FactId {
        self.id
    }

    pub fn template(&self) -> Option<TemplateId> {
        self.env.fact_template(self.id)
    }

    pub fn template_name(&self) -> Option<String> {
        self.env.fact_template_name(self.id)
    }

    pub fn slot(&self, name: &str) -> Option<Value> {
        self.env.get_fact_slot(self.id, name).ok()
    }

    pub fn slots(&self) -> Option<Vec<Value>> {
        self.env.fact_slots(self.id)
    }
}

fn iterate(
    env: &Environment,
    templates: &[TemplateId],
    mut visit: impl FnMut(FactView<'_>) -> bool,
) {
    for &template in templates {
        for id in env.store_template_facts(template) {
            if env.halted() {
                return;
            }
            if !visit(FactView { env, id }) {
                return;
            }
        }
    }
}

/// Every live fact of the given templates satisfying the predicate, in
/// template order then index order.
pub fn find_all_facts(
    env: &Environment,
    templates: &[TemplateId],
    pred: impl Fn(&FactView<'_>) -> bool,
) -> Vec<FactId> {
    let mut out = Vec::new();
    iterate(env, templates, |view| {
        if pred(&view) {
            out.push(view.id());
        }
        true
    });
    out
}

/// The first live fact satisfying the predicate, if any.
pub fn any_fact(
    env: &Environment,
    templates: &[TemplateId],
    pred: impl Fn(&FactView<'_>) -> bool,
) -> Option<FactId> {
    let mut found = None;
    iterate(env, templates, |view| {
        if pred(&view) {
            found = Some(view.id());
            false
        } else {
            true
        }
    });
    found
}

pub fn count_facts(
    env: &Environment,
    templates: &[TemplateId],
    pred: impl Fn(&FactView<'_>) -> bool,
) -> usize {
    let mut count = 0;
    iterate(env, templates, |view| {
        if pred(&view) {
            count += 1;
        }
        true
    });
    count
}
