//! Slot constraint records and checking.
//!
//! A constraint record restricts the values a slot may hold: a type mask,
//! an optional allowed-values set, a numeric range, a cardinality range
//! for multislots, and an allowed-classes list for instance-valued slots.
//! Checking runs at builder/modifier put time and again for values
//! produced by dynamic defaults; violations map to [`SlotError`] variants
//! and never mutate state.

use std::ops::BitOr;

use weft_types::{AtomTable, Lexeme, Multifield, Value, ValueTag};

use crate::error::SlotError;

/// Bitmask of the atomic types a slot element may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMask(u16);

impl TypeMask {
    pub const SYMBOL: TypeMask = TypeMask(1);
    pub const STRING: TypeMask = TypeMask(2);
    pub const INSTANCE_NAME: TypeMask = TypeMask(4);
    pub const INTEGER: TypeMask = TypeMask(8);
    pub const FLOAT: TypeMask = TypeMask(16);
    pub const EXTERNAL: TypeMask = TypeMask(32);
    pub const BITMAP: TypeMask = TypeMask(64);

    pub const NUMBER: TypeMask = TypeMask(8 | 16);
    pub const LEXEME: TypeMask = TypeMask(1 | 2);
    pub const ANY: TypeMask = TypeMask(127);

    pub fn allows(self, tag: ValueTag) -> bool {
        let bit = match tag {
            ValueTag::Symbol => Self::SYMBOL.0,
            ValueTag::Str => Self::STRING.0,
            ValueTag::InstanceName => Self::INSTANCE_NAME.0,
            ValueTag::Int => Self::INTEGER.0,
            ValueTag::Float => Self::FLOAT.0,
            ValueTag::External => Self::EXTERNAL.0,
            ValueTag::Bitmap => Self::BITMAP.0,
            ValueTag::Void | ValueTag::Multifield => return false,
        };
        self.0 & bit != 0
    }

    pub fn is_any(self) -> bool {
        self == Self::ANY
    }

    pub fn contains(self, other: TypeMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: Self) -> Self {
        TypeMask(self.0 | rhs.0)
    }
}

impl Default for TypeMask {
    fn default() -> Self {
        Self::ANY
    }
}

/// One end of a numeric range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumBound {
    Unbounded,
    Int(i64),
    Float(f64),
}

impl NumBound {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            NumBound::Unbounded => None,
            NumBound::Int(i) => Some(i as f64),
            NumBound::Float(f) => Some(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: NumBound,
    pub max: NumBound,
}

impl NumericRange {
    pub fn admits(&self, value: f64) -> bool {
        if let Some(min) = self.min.as_f64() {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max.as_f64() {
            if value > max {
                return false;
            }
        }
        true
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self.min, NumBound::Unbounded) && matches!(self.max, NumBound::Unbounded)
    }
}

impl Default for NumericRange {
    fn default() -> Self {
        Self { min: NumBound::Unbounded, max: NumBound::Unbounded }
    }
}

/// Element-count bounds for a multislot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub min: usize,
    pub max: Option<usize>,
}

impl Cardinality {
    pub fn admits(&self, len: usize) -> bool {
        len >= self.min && self.max.is_none_or(|max| len <= max)
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self { min: 0, max: None }
    }
}

/// Hook for resolving the class of an instance name. The instance system
/// is an external collaborator; without a registered classifier the
/// allowed-classes facet is not enforced.
pub trait InstanceClassifier {
    fn class_of(&self, instance: &Lexeme) -> Option<Lexeme>;
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintRecord {
    pub types: TypeMask,
    pub allowed: Option<Vec<Value>>,
    pub allowed_classes: Option<Vec<Lexeme>>,
    pub range: NumericRange,
    pub cardinality: Cardinality,
}

impl ConstraintRecord {
    fn check_element(
        &self,
        slot: &str,
        value: &Value,
        classifier: Option<&dyn InstanceClassifier>,
    ) -> Result<(), SlotError> {
        if !self.types.allows(value.tag()) {
            return Err(SlotError::Type { slot: slot.to_string(), found: value.tag().name() });
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                return Err(SlotError::AllowedValues { slot: slot.to_string() });
            }
        }
        if let Some(n) = value.as_number() {
            if !self.range.admits(n) {
                return Err(SlotError::Range { slot: slot.to_string() });
            }
        }
        if let (Some(classes), Value::InstanceName(instance)) = (&self.allowed_classes, value) {
            if let Some(classifier) = classifier {
                let class = classifier.class_of(instance);
                if !class.is_some_and(|c| classes.contains(&c)) {
                    return Err(SlotError::AllowedClasses { slot: slot.to_string() });
                }
            }
        }
        Ok(())
    }

    /// Validate a whole slot value: a multifield within cardinality for a
    /// multislot, a single non-void atom otherwise.
    pub fn check_slot(
        &self,
        slot: &str,
        multislot: bool,
        value: &Value,
        classifier: Option<&dyn InstanceClassifier>,
    ) -> Result<(), SlotError> {
        if multislot {
            let Value::Multifield(mf) = value else {
                return Err(SlotError::Type { slot: slot.to_string(), found: value.tag().name() });
            };
            if !self.cardinality.admits(mf.len()) {
                return Err(SlotError::Cardinality {
                    slot: slot.to_string(),
                    len: mf.len(),
                    min: self.cardinality.min,
                    max: self.cardinality.max,
                });
            }
            for element in mf.iter() {
                self.check_element(slot, element, classifier)?;
            }
            Ok(())
        } else {
            self.check_element(slot, value, classifier)
        }
    }

    fn derive_element(&self, atoms: &mut AtomTable) -> Option<Value> {
        if let Some(allowed) = &self.allowed {
            return allowed.first().cloned();
        }
        if self.types.contains(TypeMask::SYMBOL) {
            return Some(atoms.symbol_value("nil"));
        }
        if self.types.contains(TypeMask::STRING) {
            return Some(atoms.string_value(""));
        }
        if self.types.contains(TypeMask::INTEGER) {
            let v = match self.range.min {
                NumBound::Int(i) => i,
                NumBound::Float(f) => f.ceil() as i64,
                NumBound::Unbounded => 0,
            };
            return Some(Value::Int(v));
        }
        if self.types.contains(TypeMask::FLOAT) {
            let v = self.range.min.as_f64().unwrap_or(0.0);
            return Some(Value::Float(v));
        }
        if self.types.contains(TypeMask::INSTANCE_NAME) {
            return Some(atoms.instance_name_value("nil"));
        }
        None
    }

    /// Synthesize the minimal value admitted by this record: the empty
    /// multifield (padded to the cardinality minimum) for multislots, a
    /// type-appropriate zero/empty value otherwise.
    pub fn derive_default(&self, multislot: bool, atoms: &mut AtomTable) -> Option<Value> {
        if multislot {
            if self.cardinality.min == 0 {
                return Some(Value::Multifield(Multifield::empty()));
            }
            let element = self.derive_element(atoms)?;
            let values = vec![element; self.cardinality.min];
            Some(Value::Multifield(Multifield::from_values(values)))
        } else {
            self.derive_element(atoms)
        }
    }
}
