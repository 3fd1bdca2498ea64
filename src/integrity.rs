//! The integrity checks run after normalization: undefined symbols, function coverage, the start
//! symbol, reachability and the termination proof.

use crate::funcs::BUILTIN_NAMES;
use crate::symbol::SymbolKind;
use crate::{Grammar, GrammarError, IntegrityError};
use std::collections::HashSet;

impl Grammar {
    pub(crate) fn check_integrity(&mut self) -> Result<(), GrammarError> {
        self.check_symbols_and_functions()?;
        if !self.symtab.contains_key("root") {
            return Err(GrammarError::Integrity(IntegrityError::new(
                "Missing required start symbol: root".to_string(),
                None,
            )));
        }
        self.check_reachability()?;
        self.check_termination()?;
        Ok(())
    }

    /// Every placeholder must have been replaced by a definition, every called function must be
    /// registered, and every registered function must be called. The built-ins always count as
    /// used.
    fn check_symbols_and_functions(&self) -> Result<(), GrammarError> {
        let mut funcs_used: HashSet<&str> = BUILTIN_NAMES.iter().copied().collect();
        for sym in self.symtab.values() {
            match &sym.kind {
                SymbolKind::Unresolved => {
                    return Err(GrammarError::Integrity(IntegrityError::new(
                        format!("Symbol {} used but not defined", sym.name),
                        Some(sym.line_no),
                    )))
                }
                SymbolKind::Func(func) => {
                    if !self.funcs.contains(&func.fname) {
                        return Err(GrammarError::Integrity(IntegrityError::new(
                            format!("Function {} used but not defined", func.fname),
                            Some(sym.line_no),
                        )));
                    }
                    funcs_used.insert(func.fname.as_str());
                }
                _ => {}
            }
        }
        let mut unused: Vec<&str> = self
            .funcs
            .names()
            .filter(|name| !funcs_used.contains(name))
            .collect();
        if !unused.is_empty() {
            unused.sort_unstable();
            return Err(GrammarError::Integrity(IntegrityError::new(
                format!(
                    "Unused function{}: {}",
                    if unused.len() > 1 { "s" } else { "" },
                    unused.join(", ")
                ),
                None,
            )));
        }
        Ok(())
    }

    /// Walk the child edges from `root`; any named symbol of the top level grammar that is never
    /// reached is unused. Implicit symbols and imported symbols are exempt.
    fn check_reachability(&self) -> Result<(), GrammarError> {
        let mut reached: HashSet<&str> = HashSet::new();
        let mut to_check: Vec<&str> = vec!["root"];
        reached.insert("root");
        while let Some(name) = to_check.pop() {
            let sym = match self.symtab.get(name) {
                Some(sym) => sym,
                None => {
                    return Err(GrammarError::Integrity(IntegrityError::new(
                        format!("Symbol {} used but not defined", name),
                        None,
                    )))
                }
            };
            for child in sym.children() {
                if reached.insert(child) {
                    to_check.push(child);
                }
            }
        }
        let unused: Vec<&str> = self
            .symtab
            .values()
            .filter(|sym| {
                !sym.implicit && !sym.name.contains('.') && !reached.contains(sym.name.as_str())
            })
            .map(|sym| sym.name.as_str())
            .collect();
        if !unused.is_empty() {
            return Err(GrammarError::Integrity(IntegrityError::new(
                format!(
                    "Unused symbol{}: {}",
                    if unused.len() > 1 { "s" } else { "" },
                    unused.join(", ")
                ),
                None,
            )));
        }
        Ok(())
    }

    /// Iterate termination marks to a fixpoint, then require every symbol to either terminate or
    /// have a terminating child. A symbol failing both is an unbounded recursion.
    fn check_termination(&mut self) -> Result<(), GrammarError> {
        loop {
            let mut changed = false;
            let names: Vec<String> = self.symtab.keys().cloned().collect();
            for name in names {
                changed |= self.update_can_terminate(&name);
            }
            if !changed {
                break;
            }
        }
        for sym in self.symtab.values() {
            if sym.can_terminate == Some(true) {
                continue;
            }
            let has_terminating_child = sym
                .children()
                .iter()
                .any(|child| self.terminates(child));
            if !has_terminating_child {
                return Err(GrammarError::Integrity(IntegrityError::new(
                    format!(
                        "Symbol has no paths to termination (infinite recursion?): {}",
                        sym.name
                    ),
                    Some(sym.line_no),
                )));
            }
        }
        Ok(())
    }

    fn terminates(&self, name: &str) -> bool {
        self.symtab
            .get(name)
            .map_or(false, |sym| sym.can_terminate == Some(true))
    }

    /// One termination step for a single symbol. Terminals are marked at construction; a choice
    /// terminates when any alternative has only terminating children (each such alternative is
    /// remembered for limit-biased generation); everything else terminates when all of its
    /// children do.
    fn update_can_terminate(&mut self, name: &str) -> bool {
        let is_choice = match self.symtab.get(name) {
            Some(sym) if sym.can_terminate.is_none() => {
                matches!(sym.kind, SymbolKind::Choice(_))
            }
            _ => return false,
        };
        if is_choice {
            let (alternatives, mut flags) = match self.symtab.get(name) {
                Some(sym) => match &sym.kind {
                    SymbolKind::Choice(choice) => {
                        (choice.alternatives.clone(), choice.alt_terminate.clone())
                    }
                    _ => return false,
                },
                None => return false,
            };
            for (index, alternative) in alternatives.iter().enumerate() {
                if flags[index] == Some(true) {
                    continue;
                }
                if alternative.iter().all(|child| self.terminates(child)) {
                    flags[index] = Some(true);
                }
            }
            let any = flags.iter().any(|flag| *flag == Some(true));
            if let Some(sym) = self.symtab.get_mut(name) {
                if let SymbolKind::Choice(choice) = &mut sym.kind {
                    choice.alt_terminate = flags;
                }
                if any {
                    sym.can_terminate = Some(true);
                }
            }
            any
        } else {
            let all = match self.symtab.get(name) {
                Some(sym) => sym.children().iter().all(|child| self.terminates(child)),
                None => return false,
            };
            if !all {
                return false;
            }
            if let Some(sym) = self.symtab.get_mut(name) {
                sym.can_terminate = Some(true);
            }
            true
        }
    }
}
