//! The definition body tokenizer: turns the right hand side of a grammar line into a sequence of
//! child symbol names, minting implicit symbols as it goes.

use super::{regexp, ParseState};
use crate::symbol::{
    BinSymbol, ConcatSymbol, FuncArg, FuncSymbol, RefSymbol, RepeatSampleSymbol, RepeatSymbol,
    Symbol, SymbolKind, TextSymbol,
};
use crate::{Grammar, ParseError};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_DEFN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?:(?P<quote>["'])|(?P<hexstr>x["'])|(?P<regex>/)|(?P<implconcat>\()|(?P<infunc>[,)])|(?P<comment>#)|(?P<func>\w+)\(|(?P<maybe>\?)|(?P<repeat>[{<]\s*(?P<a>\d+)\s*(?:,\s*(?P<b>\d+)\s*)?[}>])|@(?P<refprefix>[\w-]+\.)?(?P<ref>[\w:-]+)|(?P<symprefix>[\w-]+\.)?(?P<sym>[\w:-]+)|(?P<ws>\s+))"#,
    )
    .unwrap()
});

/// Parse a whole definition body; trailing unparsed input is an error.
pub(crate) fn parse_body(
    grmr: &mut Grammar,
    pstate: &mut ParseState,
    defn: &str,
) -> Result<Vec<String>, ParseError> {
    let (result, remain) = parse_defn(grmr, pstate, defn, false, false)?;
    if !remain.is_empty() {
        return Err(pstate.error(format!("Unexpected token in definition: {}", remain)));
    }
    Ok(result)
}

/// Tokenize a definition until the input runs out or a terminator of the enclosing context is
/// reached: `,` or `)` inside function arguments, `)` inside an implicit concatenation.
fn parse_defn<'d>(
    grmr: &mut Grammar,
    pstate: &mut ParseState,
    mut defn: &'d str,
    in_func: bool,
    in_concat: bool,
) -> Result<(Vec<String>, &'d str), ParseError> {
    let mut result: Vec<String> = Vec::new();
    while !defn.is_empty() {
        let caps = match RE_DEFN.captures(defn) {
            Some(caps) => caps,
            None => return Err(pstate.error(format!("Failed to parse definition at: {}", defn))),
        };
        let matched_end = caps.get(0).map_or(0, |m| m.end());
        if caps.name("ws").is_some() {
            defn = &defn[matched_end..];
        } else if caps.name("quote").is_some() {
            let (value, rest) = scan_quoted(defn, pstate)?;
            let counter = pstate.implicit();
            let name = format!(
                "{}.[text (line {} #{})]",
                pstate.prefix, pstate.line_no, counter
            );
            grmr.define(
                pstate,
                Symbol::new(
                    name.clone(),
                    pstate.line_no,
                    true,
                    SymbolKind::Text(TextSymbol { value }),
                ),
            )?;
            result.push(name);
            defn = rest;
        } else if caps.name("hexstr").is_some() {
            let (value, rest) = scan_hex(defn, pstate)?;
            let counter = pstate.implicit();
            let name = format!(
                "{}.[bin (line {} #{})]",
                pstate.prefix, pstate.line_no, counter
            );
            grmr.define(
                pstate,
                Symbol::new(
                    name.clone(),
                    pstate.line_no,
                    true,
                    SymbolKind::Bin(BinSymbol { value }),
                ),
            )?;
            result.push(name);
            defn = rest;
        } else if caps.name("regex").is_some() {
            let (name, rest) = regexp::parse_regex(grmr, pstate, defn)?;
            result.push(name);
            defn = rest;
        } else if let Some(fname) = caps.name("func") {
            let fname = fname.as_str().to_string();
            let (name, rest) = parse_func(grmr, pstate, &fname, &defn[matched_end..])?;
            result.push(name);
            defn = rest;
        } else if let Some(reference) = caps.name("ref") {
            let refprefix = caps.name("refprefix").map(|m| m.as_str());
            let target = pstate.get_prefixed(refprefix, reference.as_str())?;
            if !grmr.symtab.contains_key(&target) {
                grmr.define(
                    pstate,
                    Symbol::new(target.clone(), pstate.line_no, false, SymbolKind::Unresolved),
                )?;
            }
            grmr.tracked.insert(target.clone());
            let name = format!("@{}", target);
            grmr.define(
                pstate,
                Symbol::new(
                    name.clone(),
                    pstate.line_no,
                    false,
                    SymbolKind::Ref(RefSymbol { target }),
                ),
            )?;
            result.push(name);
            defn = &defn[matched_end..];
        } else if let Some(sym) = caps.name("sym") {
            let symprefix = caps.name("symprefix").map(|m| m.as_str());
            let full = pstate.get_prefixed(symprefix, sym.as_str())?;
            if !grmr.symtab.contains_key(&full) {
                grmr.define(
                    pstate,
                    Symbol::new(full.clone(), pstate.line_no, false, SymbolKind::Unresolved),
                )?;
            }
            result.push(full);
            defn = &defn[matched_end..];
        } else if caps.name("comment").is_some() {
            defn = "";
        } else if let Some(token) = caps.name("infunc") {
            if in_func || (in_concat && token.as_str() == ")") {
                break;
            }
            return Err(pstate.error(format!("Unexpected token in definition: {}", defn)));
        } else if caps.name("implconcat").is_some() {
            let (parts, rest) = parse_defn(grmr, pstate, &defn[matched_end..], false, true)?;
            let rest = match rest.strip_prefix(')') {
                Some(rest) => rest,
                None => return Err(pstate.error(format!("Expecting ) at: {}", rest))),
            };
            let counter = pstate.implicit();
            let name = format!(
                "{}.[concat (line {} #{})]",
                pstate.prefix, pstate.line_no, counter
            );
            grmr.define(
                pstate,
                Symbol::new(
                    name.clone(),
                    pstate.line_no,
                    true,
                    SymbolKind::Concat(ConcatSymbol { children: parts }),
                ),
            )?;
            result.push(name);
            defn = rest;
        } else {
            // postfix ? or {…} / <…> repeat
            let previous = match result.pop() {
                Some(previous) => previous,
                None => {
                    return Err(pstate.error(format!("Unexpected token in definition: {}", defn)))
                }
            };
            let (min, max, sample) = if caps.name("maybe").is_some() {
                (0, 1, false)
            } else {
                let token = match caps.name("repeat") {
                    Some(token) => token.as_str(),
                    None => {
                        return Err(
                            pstate.error(format!("Failed to parse definition at: {}", defn))
                        )
                    }
                };
                let sample = match (token.as_bytes()[0], token.as_bytes()[token.len() - 1]) {
                    (b'{', b'}') => false,
                    (b'<', b'>') => true,
                    _ => {
                        return Err(pstate.error(format!("Repeat symbol mismatch at: {}", defn)))
                    }
                };
                let min = parse_bound(caps.name("a").map_or("", |m| m.as_str()), pstate, defn)?;
                let max = match caps.name("b") {
                    Some(bound) => parse_bound(bound.as_str(), pstate, defn)?,
                    None => min,
                };
                if min > max {
                    return Err(pstate.error(format!("Repeat bounds out of order at: {}", defn)));
                }
                (min, max, sample)
            };
            let counter = pstate.implicit();
            let name = format!(
                "{}.[repeat (line {} #{})]",
                pstate.prefix, pstate.line_no, counter
            );
            // a group minted by ( … ) dissolves into the repeat; anything else repeats whole
            let lifted = match grmr.symtab.get(&previous) {
                Some(sym) if sym.implicit && sym.name.contains("[concat") => match &sym.kind {
                    SymbolKind::Concat(concat) => Some(concat.children.clone()),
                    _ => None,
                },
                _ => None,
            };
            let children = match lifted {
                Some(children) => {
                    grmr.symtab.remove(&previous);
                    children
                }
                None => vec![previous],
            };
            let kind = if sample {
                SymbolKind::RepeatSample(RepeatSampleSymbol {
                    children,
                    min,
                    max,
                    sample_idx: None,
                })
            } else {
                SymbolKind::Repeat(RepeatSymbol { children, min, max })
            };
            grmr.define(pstate, Symbol::new(name.clone(), pstate.line_no, true, kind))?;
            result.push(name);
            defn = &defn[matched_end..];
        }
    }
    Ok((result, defn))
}

fn parse_func<'d>(
    grmr: &mut Grammar,
    pstate: &mut ParseState,
    fname: &str,
    mut defn: &'d str,
) -> Result<(String, &'d str), ParseError> {
    if fname == "import" {
        return Err(pstate.error("'import' is a reserved function name".to_string()));
    }
    let counter = pstate.implicit();
    let name = format!(
        "{}.[{} (line {} #{})]",
        pstate.prefix, fname, pstate.line_no, counter
    );
    grmr.define(
        pstate,
        Symbol::new(
            name.clone(),
            pstate.line_no,
            true,
            SymbolKind::Func(FuncSymbol {
                fname: fname.to_string(),
                args: Vec::new(),
            }),
        ),
    )?;
    let mut args: Vec<FuncArg> = Vec::new();
    loop {
        let (arg, rest) = parse_defn(grmr, pstate, defn, true, false)?;
        let done = match rest.chars().next() {
            Some(',') => false,
            Some(')') => true,
            _ => {
                return Err(pstate.error(format!(
                    "Expected , or ) parsing function args at: {}",
                    rest
                )))
            }
        };
        defn = &rest[1..];
        if !(arg.is_empty() && done) {
            let numeric = numeric_argument(grmr, &arg);
            match numeric {
                Some(value) => {
                    grmr.symtab.remove(&arg[0]);
                    args.push(value);
                }
                None => {
                    let arg_name = format!("{}.{}]", &name[..name.len() - 1], args.len());
                    grmr.define(
                        pstate,
                        Symbol::new(
                            arg_name.clone(),
                            pstate.line_no,
                            true,
                            SymbolKind::Concat(ConcatSymbol { children: arg }),
                        ),
                    )?;
                    args.push(FuncArg::Symbol(arg_name));
                }
            }
        }
        if done {
            break;
        }
    }
    if let Some(sym) = grmr.symtab.get_mut(&name) {
        if let SymbolKind::Func(func) = &mut sym.kind {
            func.args = args;
        }
    }
    Ok((name, defn))
}

fn parse_bound(digits: &str, pstate: &ParseState, defn: &str) -> Result<usize, ParseError> {
    digits
        .parse::<usize>()
        .map_err(|_| pstate.error(format!("Invalid repeat bound at: {}", defn)))
}

/// A single bare identifier that lexes as a number is passed to the function as a numeric
/// literal rather than as a symbol. Integer classification is tried before float, so `3` stays
/// `3` and never becomes `3.0`.
fn numeric_argument(grmr: &Grammar, arg: &[String]) -> Option<FuncArg> {
    if arg.len() != 1 {
        return None;
    }
    match grmr.symtab.get(&arg[0]).map(|sym| &sym.kind) {
        Some(SymbolKind::Unresolved) => {}
        _ => return None,
    }
    let unprefixed = match arg[0].split_once('.') {
        Some((_, local)) => local,
        None => arg[0].as_str(),
    };
    if let Ok(value) = unprefixed.parse::<i64>() {
        return Some(FuncArg::Int(value));
    }
    if let Ok(value) = unprefixed.parse::<f64>() {
        return Some(FuncArg::Float(value));
    }
    None
}

/// Scan a `"…"` or `'…'` literal, applying the text escapes. Returns the value and the input
/// after the closing quote.
pub(crate) fn scan_quoted<'d>(
    defn: &'d str,
    pstate: &ParseState,
) -> Result<(String, &'d str), ParseError> {
    let mut chars = defn.char_indices();
    let qchar = match chars.next() {
        Some((_, qchar @ ('"' | '\''))) => qchar,
        _ => {
            return Err(pstate.error(format!(
                "Error parsing string, expected \" or ' at: {}",
                defn
            )))
        }
    };
    let mut out = String::new();
    while let Some((index, chr)) = chars.next() {
        if chr == qchar {
            return Ok((out, &defn[index + 1..]));
        }
        if chr == '\\' {
            match chars.next() {
                Some((_, escaped)) => out.push(unescape(escaped)),
                None => break,
            }
        } else {
            out.push(chr);
        }
    }
    Err(pstate.error("Unterminated string literal!".to_string()))
}

fn scan_hex<'d>(defn: &'d str, pstate: &ParseState) -> Result<(Vec<u8>, &'d str), ParseError> {
    // defn starts with x" or x'
    let qchar = defn.as_bytes()[1] as char;
    let inner = &defn[2..];
    let close = match inner.find(qchar) {
        Some(close) => close,
        None => return Err(pstate.error("Unterminated bin literal!".to_string())),
    };
    let value = decode_hex(&inner[..close])
        .map_err(|message| pstate.error(format!("Invalid hex string: {}", message)))?;
    Ok((value, &inner[close + 1..]))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, String> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(format!("Odd-length string: {}", hex));
    }
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks(2) {
        let high = hex_value(pair[0]).ok_or_else(|| format!("Non-hex digit in: {}", hex))?;
        let low = hex_value(pair[1]).ok_or_else(|| format!("Non-hex digit in: {}", hex))?;
        out.push(high << 4 | low);
    }
    Ok(out)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// The text escapes: `\f`, `\n`, `\r`, `\t` and `\v` map to control characters, anything else to
/// the character itself.
pub(crate) fn unescape(chr: char) -> char {
    match chr {
        'f' => '\u{0C}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{0B}',
        other => other,
    }
}
