//! The regex sub-parser: a minimal regex dialect used for *generating* text patterns.
//!
//! A `/…/` definition becomes an implicit concatenation of text, character set and repeat
//! symbols. There is no grouping and no alternation; `(`, `)` and `|` are ordinary characters.

use super::body::unescape;
use super::ParseState;
use crate::symbol::{
    ConcatSymbol, RepeatSymbol, Symbol, SymbolKind, TextChoiceSymbol, TextSymbol,
};
use crate::{Grammar, ParseError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// The fixed alphabet generated for `.` and complemented for `[^…]` sets.
pub(crate) const REGEX_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                                         abcdefghijklmnopqrstuvwxyz\
                                         0123456789\
                                         ,./<>?;':\"[]\\{}|=_+`~!@#$%^&*() -";

/// Name of the interned alphabet symbol shared by every `.` in a grammar.
pub(crate) const ALPHABET_NAME: &str = "[regex alpha]";

static RE_QUANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\s*(?P<a>\d+)\s*(?:,\s*(?P<b>\d+)\s*)?\}").unwrap());

/// Parse a `/…/` definition. Returns the name of the minted concatenation symbol and the input
/// after the closing slash.
pub(crate) fn parse_regex<'d>(
    grmr: &mut Grammar,
    pstate: &mut ParseState,
    defn: &'d str,
) -> Result<(String, &'d str), ParseError> {
    let mut rest = match defn.strip_prefix('/') {
        Some(rest) => rest,
        None => return Err(pstate.error("Regex definitions must begin with /".to_string())),
    };
    let counter = pstate.implicit();
    let parent = format!(
        "{}.[regex (line {} #{})]",
        pstate.prefix, pstate.line_no, counter
    );
    grmr.define(
        pstate,
        Symbol::new(
            parent.clone(),
            pstate.line_no,
            true,
            SymbolKind::Concat(ConcatSymbol {
                children: Vec::new(),
            }),
        ),
    )?;
    let mut children: Vec<String> = Vec::new();
    let mut n_implicit = 0usize;

    loop {
        if rest.is_empty() {
            return Err(pstate.error("Unterminated regular expression".to_string()));
        }
        if let Some(caps) = RE_QUANT.captures(rest) {
            let min = parse_quant(caps.name("a").map_or("", |m| m.as_str()), pstate, rest)?;
            let max = match caps.name("b") {
                Some(bound) => parse_quant(bound.as_str(), pstate, rest)?,
                None => min,
            };
            if min > max {
                return Err(pstate.error(format!("Repeat bounds out of order at: {}", rest)));
            }
            add_repeat(grmr, pstate, &parent, &mut children, &mut n_implicit, min, max, rest)?;
            rest = &rest[caps.get(0).map_or(0, |m| m.end())..];
            continue;
        }
        let chr = match rest.chars().next() {
            Some(chr) => chr,
            None => return Err(pstate.error("Unterminated regular expression".to_string())),
        };
        match chr {
            '/' => {
                if let Some(sym) = grmr.symtab.get_mut(&parent) {
                    if let SymbolKind::Concat(concat) = &mut sym.kind {
                        concat.children = children;
                    }
                }
                return Ok((parent, &rest[1..]));
            }
            '?' => {
                add_repeat(grmr, pstate, &parent, &mut children, &mut n_implicit, 0, 1, rest)?;
                rest = &rest[1..];
            }
            '*' => {
                add_repeat(grmr, pstate, &parent, &mut children, &mut n_implicit, 0, 5, rest)?;
                rest = &rest[1..];
            }
            '+' => {
                add_repeat(grmr, pstate, &parent, &mut children, &mut n_implicit, 1, 5, rest)?;
                rest = &rest[1..];
            }
            '.' => {
                if !grmr.symtab.contains_key(ALPHABET_NAME) {
                    grmr.define(
                        pstate,
                        Symbol::new(
                            ALPHABET_NAME.to_string(),
                            0,
                            true,
                            SymbolKind::TextChoice(TextChoiceSymbol {
                                value: REGEX_ALPHABET.to_string(),
                            }),
                        ),
                    )?;
                }
                children.push(ALPHABET_NAME.to_string());
                rest = &rest[1..];
            }
            '[' => {
                rest = parse_set(grmr, pstate, &parent, &mut children, &mut n_implicit, &rest[1..])?;
            }
            '\\' => match rest[1..].chars().next() {
                Some(escaped) => {
                    new_text(
                        grmr,
                        pstate,
                        &parent,
                        &mut children,
                        &mut n_implicit,
                        unescape(escaped),
                    )?;
                    rest = &rest[1 + escaped.len_utf8()..];
                }
                None => {
                    new_text(grmr, pstate, &parent, &mut children, &mut n_implicit, '\\')?;
                    rest = "";
                }
            },
            other => {
                new_text(grmr, pstate, &parent, &mut children, &mut n_implicit, other)?;
                rest = &rest[other.len_utf8()..];
            }
        }
    }
}

/// Implicit part names derive from the parent regex name: `[regex (line 3 #0).1]`.
fn impl_name(parent: &str, n_implicit: &mut usize) -> String {
    let name = format!("{}.{}]", &parent[..parent.len() - 1], n_implicit);
    *n_implicit += 1;
    name
}

fn new_text(
    grmr: &mut Grammar,
    pstate: &ParseState,
    parent: &str,
    children: &mut Vec<String>,
    n_implicit: &mut usize,
    value: char,
) -> Result<(), ParseError> {
    let name = impl_name(parent, n_implicit);
    grmr.define(
        pstate,
        Symbol::new(
            name.clone(),
            pstate.line_no,
            true,
            SymbolKind::Text(TextSymbol {
                value: value.to_string(),
            }),
        ),
    )?;
    children.push(name);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn add_repeat(
    grmr: &mut Grammar,
    pstate: &ParseState,
    parent: &str,
    children: &mut Vec<String>,
    n_implicit: &mut usize,
    min: usize,
    max: usize,
    tail: &str,
) -> Result<(), ParseError> {
    let wraps_repeat = children
        .last()
        .and_then(|name| grmr.symtab.get(name))
        .map_or(false, |sym| matches!(sym.kind, SymbolKind::Repeat(_)));
    let inner = match children.pop() {
        Some(inner) if !wraps_repeat => inner,
        _ => {
            return Err(pstate.error(format!(
                "Error parsing regex, unexpected repeat at: {}",
                tail
            )))
        }
    };
    let name = impl_name(parent, n_implicit);
    grmr.define(
        pstate,
        Symbol::new(
            name.clone(),
            pstate.line_no,
            true,
            SymbolKind::Repeat(RepeatSymbol {
                children: vec![inner],
                min,
                max,
            }),
        ),
    )?;
    children.push(name);
    Ok(())
}

/// Parse a `[…]` or `[^…]` character set; `rest` starts just after the opening bracket. Ranges
/// expand inclusively, a leading or trailing `-` is literal, and an inverted set complements
/// over the fixed alphabet.
fn parse_set<'d>(
    grmr: &mut Grammar,
    pstate: &ParseState,
    parent: &str,
    children: &mut Vec<String>,
    n_implicit: &mut usize,
    rest: &'d str,
) -> Result<&'d str, ParseError> {
    let (inverse, mut rest) = match rest.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let mut alpha: Vec<char> = Vec::new();
    let mut in_range = false;
    let mut closed = false;
    while !rest.is_empty() {
        let chr = match rest.chars().next() {
            Some(chr) => chr,
            None => break,
        };
        match chr {
            ']' => {
                if in_range {
                    alpha.push('-');
                }
                rest = &rest[1..];
                closed = true;
                break;
            }
            '-' if !alpha.is_empty() => {
                if in_range {
                    return Err(pstate.error(format!("Parse error in regex at: {}", rest)));
                }
                in_range = true;
                rest = &rest[1..];
            }
            '\\' => {
                let (entry, consumed) = match rest[1..].chars().next() {
                    Some(escaped) => (unescape(escaped), 1 + escaped.len_utf8()),
                    None => ('\\', 1),
                };
                push_set_entry(&mut alpha, &mut in_range, entry, pstate, rest)?;
                rest = &rest[consumed..];
            }
            other => {
                push_set_entry(&mut alpha, &mut in_range, other, pstate, rest)?;
                rest = &rest[other.len_utf8()..];
            }
        }
    }
    if !closed {
        return Err(pstate.error("Unterminated set in regex".to_string()));
    }

    let mut seen: HashSet<char> = HashSet::new();
    let mut value = String::new();
    for chr in alpha {
        if seen.insert(chr) {
            value.push(chr);
        }
    }
    if inverse {
        value = REGEX_ALPHABET.chars().filter(|chr| !seen.contains(chr)).collect();
    }
    if value.is_empty() {
        return Err(pstate.error("Empty character set in regex".to_string()));
    }

    let name = impl_name(parent, n_implicit);
    grmr.define(
        pstate,
        Symbol::new(
            name.clone(),
            pstate.line_no,
            true,
            SymbolKind::TextChoice(TextChoiceSymbol { value }),
        ),
    )?;
    children.push(name);
    Ok(rest)
}

fn push_set_entry(
    alpha: &mut Vec<char>,
    in_range: &mut bool,
    entry: char,
    pstate: &ParseState,
    rest: &str,
) -> Result<(), ParseError> {
    alpha.push(entry);
    if *in_range {
        let start = alpha[alpha.len() - 2];
        if start > entry {
            return Err(pstate.error(format!("Empty range in regex at: {}", rest)));
        }
        alpha.extend((start as u32..=entry as u32).filter_map(char::from_u32));
        *in_range = false;
    }
    Ok(())
}

fn parse_quant(digits: &str, pstate: &ParseState, tail: &str) -> Result<usize, ParseError> {
    digits
        .parse::<usize>()
        .map_err(|_| pstate.error(format!("Invalid repeat bound at: {}", tail)))
}
