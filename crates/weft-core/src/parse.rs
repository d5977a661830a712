//! Fact-literal parsing.
//!
//! The textual grammar is deliberately small: `(name value …)` for
//! implied templates and `(name (slot value…) …)` for explicit ones, with
//! symbols, quoted strings, integers, floats, and `[instance]` names as
//! values. `;` starts a comment to end of line. Facts do not nest. An
//! `(assert …)` wrapper is accepted and unwrapped so saved files and
//! command transcripts load alike. Asserting an ordered fact whose head
//! was never declared auto-creates an implied template.

use weft_types::{Multifield, Value};

use crate::engine::Environment;
use crate::error::ParseError;
use crate::template::TemplateId;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    LParen,
    RParen,
    Sym(String),
    Str(String),
    Int(i64),
    Float(f64),
    Inst(String),
}

fn describe(tok: Option<&Tok>) -> String {
    match tok {
        None => "end of input".to_string(),
        Some(Tok::LParen) => "'('".to_string(),
        Some(Tok::RParen) => "')'".to_string(),
        Some(Tok::Sym(s)) => format!("symbol '{s}'"),
        Some(Tok::Str(s)) => format!("string \"{s}\""),
        Some(Tok::Int(i)) => format!("integer {i}"),
        Some(Tok::Float(f)) => format!("float {f}"),
        Some(Tok::Inst(s)) => format!("instance name [{s}]"),
    }
}

fn classify(text: String) -> Tok {
    if let Ok(i) = text.parse::<i64>() {
        return Tok::Int(i);
    }
    let numeric_start = text
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');
    if numeric_start {
        if let Ok(f) = text.parse::<f64>() {
            return Tok::Float(f);
        }
    }
    Tok::Sym(text)
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Tok>, ParseError> {
    let mut toks = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some(escaped) => s.push(escaped),
                            None => return Err(ParseError::UnterminatedString),
                        },
                        other => s.push(other),
                    }
                }
                if !closed {
                    return Err(ParseError::UnterminatedString);
                }
                toks.push(Tok::Str(s));
            }
            '[' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    s.push(c);
                }
                if !closed {
                    return Err(ParseError::UnterminatedInstanceName);
                }
                toks.push(Tok::Inst(s));
            }
            _ => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || "()\";".contains(c) {
                        break;
                    }
                    s.push(c);
                    chars.next();
                }
                toks.push(classify(s));
            }
        }
    }
    Ok(toks)
}

#[derive(Debug)]
pub(crate) struct Cursor {
    toks: Vec<Tok>,
    pos: usize,
}

impl Cursor {
    pub(crate) fn new(toks: Vec<Tok>) -> Self {
        Self { toks, pos: 0 }
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }
}

/// A parsed fact ready for default filling: provided slots are `Some`.
#[derive(Debug)]
pub(crate) struct ParsedFact {
    pub template: TemplateId,
    pub slots: Vec<Option<Value>>,
}

fn expect_lparen(cursor: &mut Cursor) -> Result<(), ParseError> {
    match cursor.next() {
        Some(Tok::LParen) => Ok(()),
        other => Err(ParseError::Expected { expected: "'('", found: describe(other.as_ref()) }),
    }
}

fn value_from_tok(env: &mut Environment, tok: Tok) -> Result<Value, ParseError> {
    Ok(match tok {
        Tok::Sym(s) => env.atoms.symbol_value(&s),
        Tok::Str(s) => env.atoms.string_value(&s),
        Tok::Int(i) => Value::Int(i),
        Tok::Float(f) => Value::Float(f),
        Tok::Inst(s) => env.atoms.instance_name_value(&s),
        Tok::LParen => return Err(ParseError::NestedFact),
        Tok::RParen => {
            return Err(ParseError::Expected { expected: "a value", found: "')'".to_string() });
        }
    })
}

/// Values up to (and consuming) the closing paren.
fn collect_values(env: &mut Environment, cursor: &mut Cursor) -> Result<Vec<Value>, ParseError> {
    let mut values = Vec::new();
    loop {
        match cursor.peek() {
            Some(Tok::RParen) => {
                cursor.next();
                return Ok(values);
            }
            None => return Err(ParseError::UnexpectedEnd),
            _ => {
                let tok = cursor.next().ok_or(ParseError::UnexpectedEnd)?;
                values.push(value_from_tok(env, tok)?);
            }
        }
    }
}

/// Parse one fact form from the cursor. This is the
/// `build-fact-from-tokens` contract: template resolution, slot binding,
/// and value interning — default filling and constraint checking happen at
/// assertion.
pub(crate) fn parse_form(env: &mut Environment, cursor: &mut Cursor) -> Result<ParsedFact, ParseError> {
    expect_lparen(cursor)?;
    let head = match cursor.next() {
        Some(Tok::Sym(s)) => s,
        other => {
            return Err(ParseError::Expected {
                expected: "a template name",
                found: describe(other.as_ref()),
            });
        }
    };
    if head == "assert" && matches!(cursor.peek(), Some(Tok::LParen)) {
        let inner = parse_form(env, cursor)?;
        match cursor.next() {
            Some(Tok::RParen) => return Ok(inner),
            other => {
                return Err(ParseError::Expected {
                    expected: "')'",
                    found: describe(other.as_ref()),
                });
            }
        }
    }
    if matches!(cursor.peek(), Some(Tok::LParen)) {
        parse_slot_groups(env, cursor, head)
    } else {
        parse_ordered(env, cursor, head)
    }
}

fn parse_ordered(
    env: &mut Environment,
    cursor: &mut Cursor,
    head: String,
) -> Result<ParsedFact, ParseError> {
    let values = collect_values(env, cursor)?;
    let template = env
        .implied_template(&head)
        .map_err(|_| ParseError::UnknownTemplate(head.clone()))?;
    let (implied, num_slots) = {
        let t = env
            .templates
            .get(template)
            .ok_or_else(|| ParseError::UnknownTemplate(head.clone()))?;
        (t.implied, t.num_slots())
    };
    if implied {
        let slots = vec![Some(Value::Multifield(Multifield::from_values(values)))];
        return Ok(ParsedFact { template, slots });
    }
    if values.is_empty() {
        // `(name)` for an explicit template: every slot from defaults.
        return Ok(ParsedFact { template, slots: vec![None; num_slots] });
    }
    Err(ParseError::ExpectedSlotSyntax(head))
}

fn parse_slot_groups(
    env: &mut Environment,
    cursor: &mut Cursor,
    head: String,
) -> Result<ParsedFact, ParseError> {
    let template = env
        .find_template(&head)
        .ok_or_else(|| ParseError::UnknownTemplate(head.clone()))?;
    let (implied, slot_info): (bool, Vec<(String, bool)>) = {
        let t = env
            .templates
            .get(template)
            .ok_or_else(|| ParseError::UnknownTemplate(head.clone()))?;
        (
            t.implied,
            t.slots
                .iter()
                .map(|s| (s.name.text().to_string(), s.multislot))
                .collect(),
        )
    };
    if implied {
        return Err(ParseError::NestedFact);
    }
    let mut slots: Vec<Option<Value>> = vec![None; slot_info.len()];
    loop {
        match cursor.next() {
            Some(Tok::RParen) => break,
            Some(Tok::LParen) => {}
            other => {
                return Err(ParseError::Expected {
                    expected: "a slot group or ')'",
                    found: describe(other.as_ref()),
                });
            }
        }
        let slot_name = match cursor.next() {
            Some(Tok::Sym(s)) => s,
            other => {
                return Err(ParseError::Expected {
                    expected: "a slot name",
                    found: describe(other.as_ref()),
                });
            }
        };
        let idx = slot_info
            .iter()
            .position(|(name, _)| *name == slot_name)
            .ok_or_else(|| ParseError::UnknownSlot(head.clone(), slot_name.clone()))?;
        if slots[idx].is_some() {
            return Err(ParseError::DuplicateSlot(slot_name));
        }
        let values = collect_values(env, cursor)?;
        let multislot = slot_info[idx].1;
        slots[idx] = Some(if multislot {
            Value::Multifield(Multifield::from_values(values))
        } else {
            if values.len() != 1 {
                return Err(ParseError::SlotArity(slot_name));
            }
            values.into_iter().next().ok_or(ParseError::UnexpectedEnd)?
        });
    }
    Ok(ParsedFact { template, slots })
}

/// Parse exactly one fact literal.
pub(crate) fn parse_fact(env: &mut Environment, text: &str) -> Result<ParsedFact, ParseError> {
    let mut cursor = Cursor::new(tokenize(text)?);
    let parsed = parse_form(env, &mut cursor)?;
    if !cursor.at_end() {
        return Err(ParseError::Expected {
            expected: "end of input",
            found: describe(cursor.peek()),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_classifies_atoms() {
        let toks = tokenize("(f a \"b c\" 1 2.5 [i] -3 +x)").unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::LParen,
                Tok::Sym("f".to_string()),
                Tok::Sym("a".to_string()),
                Tok::Str("b c".to_string()),
                Tok::Int(1),
                Tok::Float(2.5),
                Tok::Inst("i".to_string()),
                Tok::Int(-3),
                Tok::Sym("+x".to_string()),
                Tok::RParen,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let toks = tokenize("; heading\n(a 1) ; trailing\n").unwrap();
        assert_eq!(toks.len(), 4);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert_eq!(tokenize("(a \"oops)"), Err(ParseError::UnterminatedString));
    }

    #[test]
    fn string_escapes_round_trip() {
        let toks = tokenize("(a \"he said \\\"hi\\\"\")").unwrap();
        assert_eq!(toks[2], Tok::Str("he said \"hi\"".to_string()));
    }
}
