//! The atom intern table.
//!
//! Lexemes and bitmaps are deduplicated here so that equal content yields
//! one shared allocation per environment. The table holds one strong
//! reference per entry; [`AtomTable::purge`] drops entries nothing else
//! holds, which is the ephemeron sweep of the original design expressed
//! through `Rc` strong counts.

use std::collections::HashSet;
use std::rc::Rc;

use crate::value::{Bitmap, ExternalAddress, Lexeme, LexemeKind, Value};

#[derive(Debug, Default)]
pub struct AtomTable {
    symbols: HashSet<Rc<str>>,
    strings: HashSet<Rc<str>>,
    instance_names: HashSet<Rc<str>>,
    bitmaps: HashSet<Rc<[u8]>>,
}

/// Occupancy counters, one per sub-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomTableStats {
    pub symbols: usize,
    pub strings: usize,
    pub instance_names: usize,
    pub bitmaps: usize,
}

fn intern_text(set: &mut HashSet<Rc<str>>, text: &str) -> Rc<str> {
    if let Some(existing) = set.get(text) {
        return existing.clone();
    }
    let fresh: Rc<str> = Rc::from(text);
    set.insert(fresh.clone());
    fresh
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(&mut self, text: &str) -> Lexeme {
        Lexeme::new(LexemeKind::Symbol, intern_text(&mut self.symbols, text))
    }

    pub fn string(&mut self, text: &str) -> Lexeme {
        Lexeme::new(LexemeKind::Str, intern_text(&mut self.strings, text))
    }

    pub fn instance_name(&mut self, text: &str) -> Lexeme {
        Lexeme::new(
            LexemeKind::InstanceName,
            intern_text(&mut self.instance_names, text),
        )
    }

    pub fn bitmap(&mut self, bytes: &[u8]) -> Bitmap {
        if let Some(existing) = self.bitmaps.get(bytes) {
            return Bitmap::new(existing.clone());
        }
        let fresh: Rc<[u8]> = Rc::from(bytes);
        self.bitmaps.insert(fresh.clone());
        Bitmap::new(fresh)
    }

    /// External addresses carry no payload worth deduplicating; the
    /// constructor lives here for interface symmetry with the other atoms.
    pub fn external(&mut self, type_tag: u16, address: usize) -> ExternalAddress {
        ExternalAddress { type_tag, address }
    }

    /// Convenience constructors returning finished values.
    pub fn symbol_value(&mut self, text: &str) -> Value {
        Value::Symbol(self.symbol(text))
    }

    pub fn string_value(&mut self, text: &str) -> Value {
        Value::Str(self.string(text))
    }

    pub fn instance_name_value(&mut self, text: &str) -> Value {
        Value::InstanceName(self.instance_name(text))
    }

    /// Drop every entry whose only holder is the table itself. Returns the
    /// number of entries released.
    pub fn purge(&mut self) -> usize {
        let before = self.len();
        self.symbols.retain(|rc| Rc::strong_count(rc) > 1);
        self.strings.retain(|rc| Rc::strong_count(rc) > 1);
        self.instance_names.retain(|rc| Rc::strong_count(rc) > 1);
        self.bitmaps.retain(|rc| Rc::strong_count(rc) > 1);
        before - self.len()
    }

    /// True when `lexeme` is the table's interned entry for its content.
    pub fn owns(&self, lexeme: &Lexeme) -> bool {
        let set = match lexeme.kind() {
            LexemeKind::Symbol => &self.symbols,
            LexemeKind::Str => &self.strings,
            LexemeKind::InstanceName => &self.instance_names,
        };
        set.get(lexeme.text()).is_some_and(|rc| Rc::ptr_eq(rc, lexeme.rc()))
    }

    pub fn len(&self) -> usize {
        self.symbols.len() + self.strings.len() + self.instance_names.len() + self.bitmaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> AtomTableStats {
        AtomTableStats {
            symbols: self.symbols.len(),
            strings: self.strings.len(),
            instance_names: self.instance_names.len(),
            bitmaps: self.bitmaps.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut atoms = AtomTable::new();
        let a = atoms.symbol("hello");
        let b = atoms.symbol("hello");
        assert!(a.same_atom(&b));
        assert_eq!(atoms.stats().symbols, 1);
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut atoms = AtomTable::new();
        let sym = atoms.symbol("x");
        let s = atoms.string("x");
        assert!(!sym.same_atom(&s));
        assert_eq!(atoms.stats().symbols, 1);
        assert_eq!(atoms.stats().strings, 1);
    }

    #[test]
    fn purge_drops_unreferenced_entries() {
        let mut atoms = AtomTable::new();
        let keep = atoms.symbol("keep");
        atoms.symbol("drop");
        let released = atoms.purge();
        assert_eq!(released, 1);
        assert!(atoms.owns(&keep));
        assert_eq!(atoms.stats().symbols, 1);
    }

    #[test]
    fn bitmap_interned_by_content() {
        let mut atoms = AtomTable::new();
        let a = atoms.bitmap(&[1, 2, 3]);
        let b = atoms.bitmap(&[1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(atoms.stats().bitmaps, 1);
    }
}
