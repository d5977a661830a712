//! Weft Types
//!
//! This crate defines the value model shared across the Weft ecosystem
//! (currently `weft-core`): tagged atomic values, interned lexemes and
//! bitmaps, immutable multifields, and the intern table that guarantees
//! one identity per distinct atom. Keeping the value model in its own
//! crate keeps `weft-core` free of circular dependencies when further
//! crates (code generators, front-ends) are added.

mod intern;
mod json;
mod multifield;
mod value;

pub use intern::{AtomTable, AtomTableStats};
pub use json::{JsonConvertError, value_from_json, value_to_json};
pub use multifield::Multifield;
pub use value::{Bitmap, ExternalAddress, Lexeme, LexemeKind, Value, ValueTag};
