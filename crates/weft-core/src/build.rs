//! Fact builders and modifiers.
//!
//! A `FactBuilder` is the pre-assertion form of a fact: a slot buffer
//! validated at put time and completed from slot defaults at assert time.
//! A `FactModifier` produces a new version of an existing fact through a
//! per-slot change map; setting a slot back to its current value clears
//! the corresponding change bit, and modifying with an empty map is a
//! no-op. Both hold their template (and the modifier its fact) busy until
//! disposed.

use tracing::debug;
use weft_types::Value;

use crate::beta::Activation;
use crate::engine::Environment;
use crate::error::{AssertError, BuildError, ModifyError, SlotError};
use crate::fact::FactId;
use crate::template::{DefaultPolicy, TemplateId};

fn change_bit(slot: usize) -> u64 {
    1u64 << (slot as u32 & 63)
}

/// Validate provided slot values and fill the rest from defaults,
/// producing the final slot tuple for assertion.
pub(crate) fn finish_slots(
    env: &mut Environment,
    template: TemplateId,
    partial: Vec<Option<Value>>,
) -> Result<Vec<Value>, AssertError> {
    let num_slots = env
        .templates
        .get(template)
        .ok_or(AssertError::CouldNotAssert)?
        .num_slots();
    let mut out = Vec::with_capacity(num_slots);
    for idx in 0..num_slots {
        let (name, multislot, default, constraint) = {
            let t = env.templates.get(template).ok_or(AssertError::CouldNotAssert)?;
            let d = &t.slots[idx];
            (d.name.text().to_string(), d.multislot, d.default.clone(), d.constraint.clone())
        };
        let value = match partial.get(idx).cloned().flatten() {
            Some(value) => {
                constraint
                    .check_slot(&name, multislot, &value, env.classifier())
                    .map_err(|e| {
                        debug!(slot = name.as_str(), error = %e, "slot value rejected at assert");
                        AssertError::CouldNotAssert
                    })?;
                value
            }
            None => match default {
                DefaultPolicy::NoDefault => {
                    debug!(slot = name.as_str(), "void slot with no default");
                    return Err(AssertError::CouldNotAssert);
                }
                DefaultPolicy::Static(value) => value,
                DefaultPolicy::Dynamic(supplier) => {
                    let value = supplier.supply(env.atoms_mut()).map_err(|e| {
                        debug!(slot = name.as_str(), error = e.as_str(), "dynamic default failed");
                        AssertError::CouldNotAssert
                    })?;
                    constraint
                        .check_slot(&name, multislot, &value, env.classifier())
                        .map_err(|_| AssertError::CouldNotAssert)?;
                    value
                }
                DefaultPolicy::Derived => constraint
                    .derive_default(multislot, env.atoms_mut())
                    .ok_or(AssertError::CouldNotAssert)?,
            },
        };
        out.push(value);
    }
    Ok(out)
}

#[derive(Debug)]
pub struct FactBuilder {
    template: TemplateId,
    slots: Vec<Option<Value>>,
}

impl FactBuilder {
    pub(crate) fn bind(template: TemplateId, num_slots: usize) -> Self {
        Self { template, slots: vec![None; num_slots] }
    }

    pub fn template(&self) -> TemplateId {
        self.template
    }

    /// Validate and stage a slot value.
    pub fn put_slot(&mut self, env: &Environment, name: &str, value: Value) -> Result<(), SlotError> {
        let template = env.templates.get(self.template).ok_or(SlotError::InvalidTarget)?;
        let (idx, descriptor) = template
            .slot(name)
            .ok_or_else(|| SlotError::NotFound(name.to_string()))?;
        descriptor.constraint.check_slot(
            name,
            descriptor.multislot,
            &value,
            env.classifier(),
        )?;
        self.slots[idx] = Some(value);
        Ok(())
    }

    /// Materialize the fact: fill void slots from defaults and submit to
    /// the store. The buffer resets on success so the builder can be
    /// reused.
    pub fn assert(&mut self, env: &mut Environment) -> Result<FactId, AssertError> {
        let partial = self.slots.clone();
        let slots = finish_slots(env, self.template, partial)?;
        let id = env.assert_internal(self.template, slots, None)?;
        self.reset();
        Ok(id)
    }

    /// As [`Self::assert`], but records the activation's partial match as
    /// logical support when the rule was defined logical. For non-logical
    /// rules this is a plain assertion.
    pub fn assert_with_support(
        &mut self,
        env: &mut Environment,
        activation: &Activation,
    ) -> Result<FactId, AssertError> {
        let partial = self.slots.clone();
        let slots = finish_slots(env, self.template, partial)?;
        let support = activation.logical.then_some(activation.token);
        let id = env.assert_internal(self.template, slots, support)?;
        self.reset();
        Ok(id)
    }

    /// Drop any staged values without asserting.
    pub fn abort(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Rebind to a different template, clearing the buffer.
    pub fn set_template(&mut self, env: &mut Environment, name: &str) -> Result<(), BuildError> {
        let fresh = env.bind_builder_template(name)?;
        env.release_template(self.template);
        self.template = fresh.0;
        self.slots = vec![None; fresh.1];
        Ok(())
    }

    /// Release the template. Builders hold their template busy, so this
    /// must be called when the builder is no longer needed.
    pub fn dispose(self, env: &mut Environment) {
        env.release_template(self.template);
    }
}

#[derive(Debug)]
pub struct FactModifier {
    fact: FactId,
    template: TemplateId,
    proposed: Vec<Option<Value>>,
    changed: u64,
}

impl FactModifier {
    pub(crate) fn bind(fact: FactId, template: TemplateId, num_slots: usize) -> Self {
        Self { fact, template, proposed: vec![None; num_slots], changed: 0 }
    }

    pub fn fact(&self) -> FactId {
        self.fact
    }

    /// Stage a slot change. Staging the current value clears the change
    /// bit again.
    pub fn put_slot(&mut self, env: &Environment, name: &str, value: Value) -> Result<(), SlotError> {
        let current = env.store.fact(self.fact).ok_or(SlotError::InvalidTarget)?;
        if current.garbage {
            return Err(SlotError::InvalidTarget);
        }
        let template = env.templates.get(self.template).ok_or(SlotError::InvalidTarget)?;
        let (idx, descriptor) = template
            .slot(name)
            .ok_or_else(|| SlotError::NotFound(name.to_string()))?;
        descriptor.constraint.check_slot(
            name,
            descriptor.multislot,
            &value,
            env.classifier(),
        )?;
        if current.slots[idx] == value {
            self.proposed[idx] = None;
            self.changed &= !change_bit(idx);
        } else {
            self.proposed[idx] = Some(value);
            self.changed |= change_bit(idx);
        }
        Ok(())
    }

    /// Apply the staged changes through the fact-replacement protocol. A
    /// no-op when no change bits are set. The modifier rebinds to the
    /// resulting fact, so repeated modifications accumulate.
    pub fn modify(&mut self, env: &mut Environment) -> Result<FactId, ModifyError> {
        if self.changed == 0 {
            return Ok(self.fact);
        }
        let new_slots = {
            let current = env.store.fact(self.fact).ok_or(ModifyError::Retracted)?;
            if current.garbage {
                return Err(ModifyError::Retracted);
            }
            current
                .slots
                .iter()
                .enumerate()
                .map(|(idx, value)| self.proposed[idx].clone().unwrap_or_else(|| value.clone()))
                .collect::<Vec<_>>()
        };
        let result = env.modify_internal(self.fact, new_slots, self.changed)?;
        if result != self.fact {
            env.transfer_external_pin(self.fact, result);
            self.fact = result;
        }
        self.abort();
        Ok(result)
    }

    /// Drop staged changes.
    pub fn abort(&mut self) {
        for slot in &mut self.proposed {
            *slot = None;
        }
        self.changed = 0;
    }

    /// Rebind to a different fact of the same or another explicit template.
    pub fn set_fact(&mut self, env: &mut Environment, fact: FactId) -> Result<(), BuildError> {
        let (template, num_slots) = env.bind_modifier_fact(fact)?;
        env.release_modifier_fact(self.fact, self.template);
        self.fact = fact;
        self.template = template;
        self.proposed = vec![None; num_slots];
        self.changed = 0;
        Ok(())
    }

    /// Release the fact and template pins.
    pub fn dispose(self, env: &mut Environment) {
        env.release_modifier_fact(self.fact, self.template);
    }
}
