//! The normalization pass run between parsing and integrity checking.
//!
//! Three rewrites bring the freshly parsed symbol table into its canonical shape: hash prefixes
//! become friendly prefixes, single-child concatenation wrappers dissolve, and `+` choice
//! weights resolve to the totals they inherit. The passes iterate to a fixpoint, then repeat
//! sample symbols are checked for shape and their choice index is recorded.

use crate::symbol::{ChoiceWeight, SymbolKind};
use crate::{Grammar, GrammarError, IntegrityError, ParseError};
use std::collections::{HashMap, HashSet};

impl Grammar {
    pub(crate) fn normalize(
        &mut self,
        imports: &HashMap<String, String>,
    ) -> Result<(), GrammarError> {
        self.rewrite_prefixes(imports)?;
        loop {
            let mut changed = false;
            let names: Vec<String> = self.symtab.keys().cloned().collect();
            for name in names {
                if !self.symtab.contains_key(&name) {
                    // dissolved by an earlier flatten in this pass
                    continue;
                }
                changed |= self.flatten_concat(&name);
                changed |= self.resolve_choice(&name, &mut HashSet::new())?;
            }
            if !changed {
                break;
            }
        }
        self.validate_repeat_samples()?;
        Ok(())
    }

    /// Rewrite every `<hash>.<local>` name to `<friendly>.<local>`, in symbol table keys,
    /// internal references and the tracked set alike. The top level friendly prefix is empty, so
    /// its names become bare local names.
    fn rewrite_prefixes(&mut self, imports: &HashMap<String, String>) -> Result<(), ParseError> {
        let rename = |name: &str| -> Result<String, ParseError> {
            let (is_ref, stripped) = match name.strip_prefix('@') {
                Some(stripped) => (true, stripped),
                None => (false, name),
            };
            let (prefix, local) = match stripped.split_once('.') {
                Some(parts) => parts,
                None => return Ok(name.to_string()),
            };
            let friendly = match imports.get(prefix) {
                Some(friendly) => friendly,
                None => {
                    return Err(ParseError::new(
                        format!(
                            "Failed to reassign {} to proper namespace after parsing",
                            name
                        ),
                        0,
                        None,
                    ))
                }
            };
            let renamed = if friendly.is_empty() {
                local.to_string()
            } else {
                format!("{}.{}", friendly, local)
            };
            Ok(if is_ref {
                format!("@{}", renamed)
            } else {
                renamed
            })
        };

        let old_names: Vec<String> = self.symtab.keys().cloned().collect();
        for old_name in old_names {
            let new_name = rename(&old_name)?;
            if new_name != old_name {
                if let Some(mut sym) = self.symtab.remove(&old_name) {
                    sym.name = new_name.clone();
                    self.symtab.insert(new_name, sym);
                }
            }
        }
        for sym in self.symtab.values_mut() {
            sym.map_children(&mut |name| rename(name))?;
        }
        let tracked = std::mem::take(&mut self.tracked);
        for name in tracked {
            self.tracked.insert(rename(&name)?);
        }
        Ok(())
    }

    /// A concatenation whose only child is implicit has no reason to exist: the child takes over
    /// its name and line and the wrapper is dropped.
    fn flatten_concat(&mut self, name: &str) -> bool {
        let (child_name, line_no, implicit) = match self.symtab.get(name) {
            Some(sym) => match &sym.kind {
                SymbolKind::Concat(concat) if concat.children.len() == 1 => {
                    let child_name = &concat.children[0];
                    match self.symtab.get(child_name) {
                        Some(child) if child.implicit && child_name != &sym.name => {
                            (child_name.clone(), sym.line_no, sym.implicit)
                        }
                        _ => return false,
                    }
                }
                _ => return false,
            },
            None => return false,
        };
        let mut child = match self.symtab.remove(&child_name) {
            Some(child) => child,
            None => return false,
        };
        child.name = name.to_string();
        child.line_no = line_no;
        child.implicit = implicit;
        self.symtab.insert(name.to_string(), child);
        true
    }

    /// Replace every `+` weight of the choice with the total weight of the referenced choice,
    /// resolving the target first when it carries `+` weights of its own. A cycle of such
    /// indirections cannot be resolved.
    fn resolve_choice(
        &mut self,
        name: &str,
        in_progress: &mut HashSet<String>,
    ) -> Result<bool, GrammarError> {
        let line_no = match self.symtab.get(name) {
            Some(sym) => match &sym.kind {
                SymbolKind::Choice(choice)
                    if choice
                        .weights
                        .iter()
                        .any(|weight| matches!(weight, ChoiceWeight::Inherited)) =>
                {
                    sym.line_no
                }
                _ => return Ok(false),
            },
            None => return Ok(false),
        };
        if !in_progress.insert(name.to_string()) {
            return Err(GrammarError::Integrity(IntegrityError::new(
                format!("Unresolvable '+' weight in {}", name),
                Some(line_no),
            )));
        }
        let count = match self.symtab.get(name) {
            Some(sym) => match &sym.kind {
                SymbolKind::Choice(choice) => choice.alternatives.len(),
                _ => 0,
            },
            None => 0,
        };
        for index in 0..count {
            let target = match self.symtab.get(name) {
                Some(sym) => match &sym.kind {
                    SymbolKind::Choice(choice) => {
                        if !matches!(choice.weights[index], ChoiceWeight::Inherited) {
                            continue;
                        }
                        if choice.alternatives[index].len() == 1 {
                            let target = choice.alternatives[index][0].clone();
                            match self.symtab.get(&target).map(|sym| &sym.kind) {
                                Some(SymbolKind::Choice(_)) => Some(target),
                                _ => None,
                            }
                        } else {
                            None
                        }
                    }
                    _ => None,
                },
                None => None,
            };
            let target = match target {
                Some(target) => target,
                None => {
                    return Err(GrammarError::Integrity(IntegrityError::new(
                        format!("Invalid use of '+' on non-choice symbol in {}", name),
                        Some(line_no),
                    )))
                }
            };
            self.resolve_choice(&target, in_progress)?;
            let total = match self.symtab.get(&target).map(|sym| &sym.kind) {
                Some(SymbolKind::Choice(choice)) => choice.total,
                _ => 0.0,
            };
            if let Some(sym) = self.symtab.get_mut(name) {
                if let SymbolKind::Choice(choice) = &mut sym.kind {
                    choice.weights[index] = ChoiceWeight::Number(total);
                    choice.total += total;
                }
            }
        }
        in_progress.remove(name);
        Ok(true)
    }

    /// A repeat sample must contain exactly one choice symbol; text and binary children are
    /// allowed as padding. The choice index is recorded so generation does not rescan.
    fn validate_repeat_samples(&mut self) -> Result<(), GrammarError> {
        let names: Vec<String> = self.symtab.keys().cloned().collect();
        for name in names {
            let (children, line_no) = match self.symtab.get(&name) {
                Some(sym) => match &sym.kind {
                    SymbolKind::RepeatSample(repeat) if repeat.sample_idx.is_none() => {
                        (repeat.children.clone(), sym.line_no)
                    }
                    _ => continue,
                },
                None => continue,
            };
            let mut choice_idx = None;
            let mut num_choices = 0;
            for (index, child_name) in children.iter().enumerate() {
                match self.symtab.get(child_name) {
                    Some(child) => match &child.kind {
                        SymbolKind::Choice(_) => {
                            num_choices += 1;
                            choice_idx = Some(index);
                        }
                        SymbolKind::Text(_) | SymbolKind::TextChoice(_) | SymbolKind::Bin(_) => {}
                        _ => {
                            return Err(GrammarError::Integrity(IntegrityError::new(
                                format!(
                                    "Repeat sample {} has invalid child type: {}({})",
                                    name,
                                    child.kind_name(),
                                    child_name
                                ),
                                Some(line_no),
                            )))
                        }
                    },
                    None => {
                        return Err(GrammarError::Integrity(IntegrityError::new(
                            format!("Symbol {} used but not defined", child_name),
                            Some(line_no),
                        )))
                    }
                }
            }
            if num_choices != 1 {
                return Err(GrammarError::Integrity(IntegrityError::new(
                    format!(
                        "Repeat sample {} must have one choice symbol in its children, got {}",
                        name, num_choices
                    ),
                    Some(line_no),
                )));
            }
            if let Some(sym) = self.symtab.get_mut(&name) {
                if let SymbolKind::RepeatSample(repeat) = &mut sym.kind {
                    repeat.sample_idx = choice_idx;
                }
            }
        }
        Ok(())
    }
}
