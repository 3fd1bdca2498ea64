//! A printable tree view of a grammar's symbol structure, for debugging grammar files.

use crate::symbol::{FuncArg, Symbol, SymbolKind};
use crate::Grammar;
use ptree::TreeItem;
use std::borrow::Cow;
use std::collections::HashSet;

#[derive(Clone)]
/// A cycle-safe tree of symbol labels. Every named symbol is expanded once; later occurrences
/// appear as bare names.
pub struct SymbolTree {
    label: String,
    children: Vec<SymbolTree>,
}

impl SymbolTree {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn child_nodes(&self) -> &[SymbolTree] {
        &self.children
    }

    pub fn print(&self) -> std::io::Result<()> {
        ptree::print_tree(self)
    }
}

impl TreeItem for SymbolTree {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<[Self::Child]> {
        Cow::from(&self.children)
    }
}

impl Grammar {
    /// Build a tree view of the symbol structure below `start`, or [None] when `start` is not a
    /// symbol of this grammar.
    pub fn to_tree(&self, start: &str) -> Option<SymbolTree> {
        let sym = self.symtab.get(start)?;
        let mut expanded: HashSet<&str> = HashSet::new();
        Some(self.build_tree(sym, &mut expanded))
    }

    /// Print the symbol structure below `root` to standard output.
    pub fn print_tree(&self) -> std::io::Result<()> {
        match self.to_tree("root") {
            Some(tree) => tree.print(),
            None => Ok(()),
        }
    }

    fn build_tree<'g>(&'g self, sym: &'g Symbol, expanded: &mut HashSet<&'g str>) -> SymbolTree {
        if !expanded.insert(&sym.name) {
            return SymbolTree {
                label: format!("{} …", display_name(sym)),
                children: Vec::new(),
            };
        }
        let children = sym
            .children()
            .iter()
            .filter_map(|child| self.symtab.get(*child))
            .map(|child| self.build_tree(child, expanded))
            .collect();
        SymbolTree {
            label: label(sym),
            children,
        }
    }
}

fn display_name(sym: &Symbol) -> &str {
    if sym.implicit {
        sym.kind_name()
    } else {
        &sym.name
    }
}

fn label(sym: &Symbol) -> String {
    let detail = match &sym.kind {
        SymbolKind::Text(text) => format!("{:?}", text.value),
        SymbolKind::TextChoice(choice) => format!("one of {:?}", choice.value),
        SymbolKind::Bin(bin) => format!("{} bytes", bin.value.len()),
        SymbolKind::Choice(choice) => format!("{} alternatives", choice.alternatives.len()),
        SymbolKind::Repeat(repeat) => format!("{{{},{}}}", repeat.min, repeat.max),
        SymbolKind::RepeatSample(repeat) => format!("<{},{}>", repeat.min, repeat.max),
        SymbolKind::Func(func) => format!("{}/{}", func.fname, func.args.len()),
        SymbolKind::Concat(_) | SymbolKind::Ref(_) | SymbolKind::Unresolved => String::new(),
    };
    if detail.is_empty() {
        format!("{} # {}", display_name(sym), sym.kind_name())
    } else {
        format!("{} # {} {}", display_name(sym), sym.kind_name(), detail)
    }
}

impl std::fmt::Debug for SymbolTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug_struct = f.debug_struct("SymbolTree");
        debug_struct.field("label", &self.label);
        if !self.children.is_empty() {
            debug_struct.field("children", &self.children);
        }
        debug_struct.finish()
    }
}
