//! Error types for core engine operations.
//!
//! Every public operation reports failures through a small typed enum of
//! its own rather than one catch-all error, so callers can match on the
//! exact statuses an operation can produce. Constraint and guard
//! violations are local and never mutate state; failures that would
//! corrupt a store invariant are not represented here at all — those
//! abort via `panic!` with the name of the violated check.

use thiserror::Error;

/// Statuses of slot assignment through a builder or modifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot '{0}' does not exist")]
    NotFound(String),

    #[error("value of type {found} violates the type constraint of slot '{slot}'")]
    Type { slot: String, found: &'static str },

    #[error("value is outside the numeric range allowed for slot '{slot}'")]
    Range { slot: String },

    #[error("value is not in the allowed-values set of slot '{slot}'")]
    AllowedValues { slot: String },

    #[error("multifield of length {len} violates the cardinality of multislot '{slot}'")]
    Cardinality { slot: String, len: usize, min: usize, max: Option<usize> },

    #[error("instance is not of a class allowed for slot '{slot}'")]
    AllowedClasses { slot: String },

    #[error("the target fact is not writable or no longer exists")]
    InvalidTarget,
}

/// Statuses of fact assertion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssertError {
    /// Guard active, constraint violation, missing required default, or a
    /// stale logical-support reference.
    #[error("the fact could not be asserted")]
    CouldNotAssert,

    #[error("the target fact has already been retracted")]
    Retracted,

    #[error("the fact literal could not be parsed: {0}")]
    Parsing(#[from] ParseError),

    #[error("a failure occurred while propagating through the match network")]
    RuleNetworkError,
}

/// Statuses of fact retraction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetractError {
    #[error("no fact with that index exists")]
    NoSuchFact,

    /// A join operation is in progress; nothing was changed.
    #[error("the fact could not be retracted")]
    CouldNotRetract,

    #[error("a failure occurred while propagating through the match network")]
    RuleNetworkError,
}

/// Statuses of fact modification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModifyError {
    #[error("the target fact has already been retracted")]
    Retracted,

    /// Guard active; nothing was changed.
    #[error("the fact could not be modified")]
    CouldNotModify,

    #[error("a failure occurred while propagating through the match network")]
    RuleNetworkError,
}

/// Statuses of builder and modifier construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("no template named '{0}' is visible from the current module")]
    TemplateNotFound(String),

    /// Modifiers (and slot-addressed builders) do not apply to implied
    /// templates, whose single slot has no declared name in fact literals.
    #[error("the operation does not apply to an implied template")]
    ImpliedTemplate,

    #[error("the target fact has already been retracted")]
    Retracted,

    #[error("no fact with that index exists")]
    NoSuchFact,
}

/// Statuses of template definition and deletion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("a template named '{0}' already exists in this module")]
    DuplicateName(String),

    #[error("template '{0}' declares slot '{1}' more than once")]
    DuplicateSlot(String, String),

    #[error("template '{0}' is in use and cannot be deleted")]
    InUse(String),

    #[error("no such template")]
    NotFound,

    /// A join operation is in progress; definitions are refused.
    #[error("templates cannot be defined or deleted during a join operation")]
    Guard,
}

/// Statuses of rule definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("no template named '{0}' is visible from the current module")]
    TemplateNotFound(String),

    #[error("rule '{rule}' is malformed: {detail}")]
    BadPattern { rule: String, detail: String },

    /// A join operation is in progress; definitions are refused.
    #[error("rules cannot be defined during a join operation")]
    Guard,
}

/// Statuses of module definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("a module named '{0}' already exists")]
    DuplicateName(String),

    #[error("the module limit ({0}) has been reached")]
    TooManyModules(usize),

    #[error("no such module")]
    NotFound,
}

/// Statuses of fact-literal parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unterminated instance name")]
    UnterminatedInstanceName,

    #[error("expected '{expected}' but found {found}")]
    Expected { expected: &'static str, found: String },

    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("no template named '{0}' is visible from the current module")]
    UnknownTemplate(String),

    #[error("template '{0}' has no slot named '{1}'")]
    UnknownSlot(String, String),

    #[error("slot '{0}' appears more than once")]
    DuplicateSlot(String),

    #[error("single-field slot '{0}' takes exactly one value")]
    SlotArity(String),

    #[error("facts may not be nested inside other facts")]
    NestedFact,

    #[error("facts of explicit template '{0}' use (slot value) syntax")]
    ExpectedSlotSyntax(String),

    #[error("a value provided for template '{0}' violates a slot constraint")]
    ConstraintViolated(String),
}

/// Errors surfaced by `load_facts`.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("fact form {form}: {source}")]
    Parse { form: usize, source: ParseError },

    #[error("fact form {form}: {source}")]
    Assert { form: usize, source: AssertError },
}

/// A violated store or network invariant, as reported by the integrity
/// validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("integrity check '{check}' failed: {detail}")]
pub struct IntegrityError {
    pub check: &'static str,
    pub detail: String,
}
