//! Textual persistence: `save-facts` and `load-facts`.
//!
//! The wire format is one parenthesized fact literal per line, in index
//! order: `(name value …)` for implied templates, `(name (slot value…) …)`
//! for explicit ones. The loader accepts the same bare literals as well as
//! `(assert …)`-wrapped forms, asserting each sequentially; indices are
//! not preserved across a save/load cycle.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;
use weft_types::Value;

use crate::build::finish_slots;
use crate::engine::Environment;
use crate::error::LoadError;
use crate::fact::FactId;
use crate::parse::{Cursor, parse_form, tokenize};
use crate::template::TemplateId;

/// Which templates' facts a save covers: those defined in the current
/// module, or every template visible from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveScope {
    Local,
    Visible,
}

/// Render one fact as its literal. `None` for released facts.
pub(crate) fn format_fact(env: &Environment, id: FactId) -> Option<String> {
    let fact = env.store.fact(id)?;
    let template = env.templates.get(fact.template)?;
    let mut out = String::new();
    out.push('(');
    out.push_str(template.name.text());
    if template.implied {
        if let Some(Value::Multifield(mf)) = fact.slots.first() {
            for value in mf.iter() {
                out.push(' ');
                out.push_str(&value.to_string());
            }
        }
    } else {
        for (descriptor, value) in template.slots.iter().zip(&fact.slots) {
            out.push_str(" (");
            out.push_str(descriptor.name.text());
            match value {
                Value::Multifield(mf) => {
                    for element in mf.iter() {
                        out.push(' ');
                        out.push_str(&element.to_string());
                    }
                }
                other => {
                    out.push(' ');
                    out.push_str(&other.to_string());
                }
            }
            out.push(')');
        }
    }
    out.push(')');
    Some(out)
}

pub fn save_facts(
    env: &Environment,
    path: &Path,
    scope: SaveScope,
    templates: Option<&[TemplateId]>,
) -> Result<usize, std::io::Error> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let current = env.current_module();
    let visible = env.modules.visible_mask(current);
    let mut written = 0;
    for id in env.store.iter_live() {
        if env.halted() {
            break;
        }
        let Some(template) = env.fact_template(id) else { continue };
        let Some(module) = env.template_module(template) else { continue };
        let in_scope = match scope {
            SaveScope::Local => module == current,
            SaveScope::Visible => visible & (1u64 << module) != 0,
        };
        if !in_scope {
            continue;
        }
        if templates.is_some_and(|filter| !filter.contains(&template)) {
            continue;
        }
        if let Some(line) = format_fact(env, id) {
            writeln!(writer, "{line}")?;
            written += 1;
        }
    }
    writer.flush()?;
    info!(written, path = %path.display(), "facts saved");
    Ok(written)
}

pub fn load_facts(env: &mut Environment, path: &Path) -> Result<usize, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let toks = tokenize(&text).map_err(|source| LoadError::Parse { form: 1, source })?;
    let mut cursor = Cursor::new(toks);
    let mut loaded = 0;
    while !cursor.at_end() {
        let form = loaded + 1;
        let parsed =
            parse_form(env, &mut cursor).map_err(|source| LoadError::Parse { form, source })?;
        let slots = finish_slots(env, parsed.template, parsed.slots)
            .map_err(|source| LoadError::Assert { form, source })?;
        env.assert_internal(parsed.template, slots, None)
            .map_err(|source| LoadError::Assert { form, source })?;
        loaded += 1;
    }
    info!(loaded, path = %path.display(), "facts loaded");
    Ok(loaded)
}
