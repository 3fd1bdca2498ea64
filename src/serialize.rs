//! Serialization of a canonicalized symbol table back into grammar text.
//!
//! Named symbols are written one definition per line, choice alternatives as continuation lines
//! with their resolved numeric weights, and implicit symbols inline in the defining body.
//! Re-parsing the produced text yields a structurally equivalent grammar. Prefixed names from
//! imported grammars are written as-is and will not re-parse into a single file; the serializer
//! is intended for single-file grammars.

use crate::parse::regexp::{ALPHABET_NAME, REGEX_ALPHABET};
use crate::symbol::{ChoiceWeight, FuncArg, Symbol, SymbolKind};
use crate::Grammar;
use std::fmt::Write;

impl Grammar {
    /// Write the grammar definition text for this symbol table.
    pub fn build_grammar(&self) -> Result<String, std::fmt::Error> {
        let mut writer = String::new();
        self.write_grammar(&mut writer)?;
        Ok(writer)
    }

    pub fn write_grammar(&self, writer: &mut dyn Write) -> std::fmt::Result {
        let mut named: Vec<&Symbol> = self
            .symtab
            .values()
            .filter(|sym| !sym.implicit && !matches!(sym.kind, SymbolKind::Ref(_)))
            .collect();
        named.sort_by(|a, b| (a.line_no, &a.name).cmp(&(b.line_no, &b.name)));
        for sym in named {
            match &sym.kind {
                SymbolKind::Choice(choice) => {
                    for (index, alternative) in choice.alternatives.iter().enumerate() {
                        if index == 0 {
                            write!(writer, "{}\t", sym.name)?;
                        } else {
                            write!(writer, "\t")?;
                        }
                        write!(writer, "{}\t", format_weight(&choice.weights[index]))?;
                        self.write_children(writer, alternative)?;
                        writeln!(writer)?;
                    }
                }
                _ => {
                    write!(writer, "{}\t", sym.name)?;
                    self.write_body(writer, sym)?;
                    writeln!(writer)?;
                }
            }
        }
        Ok(())
    }

    /// The defining body of a named symbol. A named concatenation writes its children bare;
    /// every other kind writes the same form it would take inline.
    fn write_body(&self, writer: &mut dyn Write, sym: &Symbol) -> std::fmt::Result {
        match &sym.kind {
            SymbolKind::Concat(concat) => self.write_children(writer, &concat.children),
            _ => self.write_inline(writer, sym),
        }
    }

    fn write_children(&self, writer: &mut dyn Write, children: &[String]) -> std::fmt::Result {
        for (index, child) in children.iter().enumerate() {
            if index > 0 {
                write!(writer, " ")?;
            }
            self.write_child(writer, child)?;
        }
        Ok(())
    }

    /// An implicit child is rendered in place; anything else is referenced by name (which for a
    /// reference symbol is already its `@target` spelling).
    fn write_child(&self, writer: &mut dyn Write, name: &str) -> std::fmt::Result {
        match self.symtab.get(name) {
            Some(sym) if sym.implicit => self.write_inline(writer, sym),
            _ => write!(writer, "{}", name),
        }
    }

    fn write_inline(&self, writer: &mut dyn Write, sym: &Symbol) -> std::fmt::Result {
        match &sym.kind {
            SymbolKind::Text(text) => write_quoted(writer, &text.value),
            SymbolKind::TextChoice(choice) => {
                if sym.name == ALPHABET_NAME || choice.value == REGEX_ALPHABET {
                    write!(writer, "/./")
                } else {
                    write_charclass(writer, &choice.value)
                }
            }
            SymbolKind::Bin(bin) => {
                write!(writer, "x\"")?;
                for byte in &bin.value {
                    write!(writer, "{:02x}", byte)?;
                }
                write!(writer, "\"")
            }
            SymbolKind::Concat(concat) => {
                write!(writer, "(")?;
                self.write_children(writer, &concat.children)?;
                write!(writer, ")")
            }
            SymbolKind::Repeat(repeat) => {
                self.write_repeat_parts(writer, &repeat.children)?;
                if repeat.min == repeat.max {
                    write!(writer, "{{{}}}", repeat.min)
                } else {
                    write!(writer, "{{{},{}}}", repeat.min, repeat.max)
                }
            }
            SymbolKind::RepeatSample(repeat) => {
                self.write_repeat_parts(writer, &repeat.children)?;
                write!(writer, "<{},{}>", repeat.min, repeat.max)
            }
            SymbolKind::Func(func) => {
                write!(writer, "{}(", func.fname)?;
                for (index, arg) in func.args.iter().enumerate() {
                    if index > 0 {
                        write!(writer, ", ")?;
                    }
                    match arg {
                        FuncArg::Int(value) => write!(writer, "{}", value)?,
                        FuncArg::Float(value) => write!(writer, "{}", format_float(*value))?,
                        FuncArg::Symbol(name) => self.write_child(writer, name)?,
                    }
                }
                write!(writer, ")")
            }
            _ => write!(writer, "{}", sym.name),
        }
    }

    fn write_repeat_parts(&self, writer: &mut dyn Write, children: &[String]) -> std::fmt::Result {
        if children.len() == 1 {
            self.write_child(writer, &children[0])
        } else {
            write!(writer, "(")?;
            self.write_children(writer, children)?;
            write!(writer, ")")
        }
    }
}

fn format_weight(weight: &ChoiceWeight) -> String {
    match weight {
        ChoiceWeight::Inherited => "+".to_string(),
        ChoiceWeight::Number(value) => {
            if value.fract() == 0.0 && *value >= 0.0 && *value < u64::MAX as f64 {
                format!("{}", *value as u64)
            } else {
                format!("{}", value)
            }
        }
    }
}

/// Format a float argument so that it re-reads as a float: a fractionless value keeps one
/// decimal place, everything else uses the shortest form.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

fn write_quoted(writer: &mut dyn Write, value: &str) -> std::fmt::Result {
    write!(writer, "\"")?;
    for chr in value.chars() {
        match chr {
            '\\' => write!(writer, "\\\\")?,
            '"' => write!(writer, "\\\"")?,
            '\n' => write!(writer, "\\n")?,
            '\r' => write!(writer, "\\r")?,
            '\t' => write!(writer, "\\t")?,
            '\u{0B}' => write!(writer, "\\v")?,
            '\u{0C}' => write!(writer, "\\f")?,
            other => write!(writer, "{}", other)?,
        }
    }
    write!(writer, "\"")
}

fn write_charclass(writer: &mut dyn Write, value: &str) -> std::fmt::Result {
    write!(writer, "/[")?;
    for chr in value.chars() {
        match chr {
            '\\' => write!(writer, "\\\\")?,
            ']' => write!(writer, "\\]")?,
            '-' => write!(writer, "\\-")?,
            '^' => write!(writer, "\\^")?,
            '\n' => write!(writer, "\\n")?,
            '\r' => write!(writer, "\\r")?,
            '\t' => write!(writer, "\\t")?,
            '\u{0B}' => write!(writer, "\\v")?,
            '\u{0C}' => write!(writer, "\\f")?,
            other => write!(writer, "{}", other)?,
        }
    }
    write!(writer, "]/")
}
