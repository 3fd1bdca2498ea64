//! The symbol model shared by the parser, the normalizer, the integrity checker and the
//! generator.
//!
//! Every production of a grammar is a [Symbol]: common attributes plus a [SymbolKind] variant.
//! Symbols are mutated only during normalization (name rewrites, wrapper flattening, `+` weight
//! resolution) and integrity checking (termination flags); generation reads them immutably.

#[derive(Debug)]
pub(crate) struct Symbol {
    /// Fully qualified name: `<prefix>.<local>` during parsing, `<friendly>.<local>` (empty
    /// friendly prefix for the top level) after normalization.
    pub name: String,
    /// Line of the declaration in its source file.
    pub line_no: usize,
    /// Whether the symbol was minted by the parser rather than named by the user.
    pub implicit: bool,
    /// Tri-state termination flag: unknown, proven true, or derived false.
    pub can_terminate: Option<bool>,
    pub kind: SymbolKind,
}

#[derive(Debug)]
pub(crate) enum SymbolKind {
    Text(TextSymbol),
    TextChoice(TextChoiceSymbol),
    Bin(BinSymbol),
    Concat(ConcatSymbol),
    Choice(ChoiceSymbol),
    Repeat(RepeatSymbol),
    RepeatSample(RepeatSampleSymbol),
    Func(FuncSymbol),
    Ref(RefSymbol),
    /// Forward declaration placeholder; one surviving past parsing is an undefined symbol.
    Unresolved,
}

#[derive(Debug)]
/// A literal string, generated verbatim.
pub(crate) struct TextSymbol {
    pub value: String,
}

#[derive(Debug)]
/// A set of characters of which one is generated uniformly at random. Minted by the regex
/// sub-parser for `.`, `[…]` and `[^…]`.
pub(crate) struct TextChoiceSymbol {
    pub value: String,
}

#[derive(Debug)]
/// A literal byte string, decoded from hex notation.
pub(crate) struct BinSymbol {
    pub value: Vec<u8>,
}

#[derive(Debug)]
/// An ordered sequence of child symbols generated in succession.
pub(crate) struct ConcatSymbol {
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ChoiceWeight {
    Number(f64),
    /// The `+` sentinel: inherit the total weight of the referenced choice symbol. Resolved to a
    /// number during normalization.
    Inherited,
}

impl ChoiceWeight {
    pub fn value(&self) -> f64 {
        match self {
            ChoiceWeight::Number(weight) => *weight,
            ChoiceWeight::Inherited => 0.0,
        }
    }
}

#[derive(Debug)]
/// Weighted alternatives of which one is generated per expansion.
pub(crate) struct ChoiceSymbol {
    pub alternatives: Vec<Vec<String>>,
    pub weights: Vec<ChoiceWeight>,
    /// Running total of the numeric weights; kept in step by [append](ChoiceSymbol::append) and
    /// `+` resolution.
    pub total: f64,
    /// Per-alternative termination, filled by the integrity checker so that generation can pick
    /// only terminating alternatives once the length limit is exceeded.
    pub alt_terminate: Vec<Option<bool>>,
}

impl ChoiceSymbol {
    pub fn new() -> Self {
        Self {
            alternatives: Vec::new(),
            weights: Vec::new(),
            total: 0.0,
            alt_terminate: Vec::new(),
        }
    }

    pub fn append(&mut self, children: Vec<String>, weight: ChoiceWeight) {
        if let ChoiceWeight::Number(value) = weight {
            self.total += value;
        }
        self.alternatives.push(children);
        self.weights.push(weight);
        self.alt_terminate.push(None);
    }
}

#[derive(Debug)]
/// A child sequence generated between `min` and `max` times.
pub(crate) struct RepeatSymbol {
    pub children: Vec<String>,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug)]
/// Like [RepeatSymbol], but the repetitions draw unique alternatives from the single choice
/// symbol among the children.
pub(crate) struct RepeatSampleSymbol {
    pub children: Vec<String>,
    pub min: usize,
    pub max: usize,
    /// Index of the choice child, recorded during normalization.
    pub sample_idx: Option<usize>,
}

#[derive(Debug)]
pub(crate) enum FuncArg {
    Int(i64),
    Float(f64),
    /// A child symbol whose generated output is passed as a string argument.
    Symbol(String),
}

#[derive(Debug)]
/// An invocation of a registered generator function.
pub(crate) struct FuncSymbol {
    pub fname: String,
    pub args: Vec<FuncArg>,
}

#[derive(Debug)]
/// A back-reference emitting a previously generated instance of the target symbol.
pub(crate) struct RefSymbol {
    pub target: String,
}

impl Symbol {
    pub fn new(name: String, line_no: usize, implicit: bool, kind: SymbolKind) -> Self {
        let can_terminate = match kind {
            SymbolKind::Text(_) | SymbolKind::TextChoice(_) | SymbolKind::Bin(_) => Some(true),
            _ => None,
        };
        Self {
            name,
            line_no,
            implicit,
            can_terminate,
            kind,
        }
    }

    /// The names of all symbols this symbol refers to.
    pub fn children(&self) -> Vec<&String> {
        match &self.kind {
            SymbolKind::Text(_)
            | SymbolKind::TextChoice(_)
            | SymbolKind::Bin(_)
            | SymbolKind::Unresolved => Vec::new(),
            SymbolKind::Concat(concat) => concat.children.iter().collect(),
            SymbolKind::Choice(choice) => choice.alternatives.iter().flatten().collect(),
            SymbolKind::Repeat(repeat) => repeat.children.iter().collect(),
            SymbolKind::RepeatSample(repeat) => repeat.children.iter().collect(),
            SymbolKind::Func(func) => func
                .args
                .iter()
                .filter_map(|arg| match arg {
                    FuncArg::Symbol(name) => Some(name),
                    _ => None,
                })
                .collect(),
            SymbolKind::Ref(reference) => vec![&reference.target],
        }
    }

    /// Apply a name rewrite to every internal symbol reference.
    pub fn map_children(
        &mut self,
        f: &mut dyn FnMut(&str) -> Result<String, crate::ParseError>,
    ) -> Result<(), crate::ParseError> {
        match &mut self.kind {
            SymbolKind::Text(_)
            | SymbolKind::TextChoice(_)
            | SymbolKind::Bin(_)
            | SymbolKind::Unresolved => Ok(()),
            SymbolKind::Concat(concat) => {
                for child in concat.children.iter_mut() {
                    *child = f(child)?;
                }
                Ok(())
            }
            SymbolKind::Choice(choice) => {
                for alternative in choice.alternatives.iter_mut() {
                    for child in alternative.iter_mut() {
                        *child = f(child)?;
                    }
                }
                Ok(())
            }
            SymbolKind::Repeat(repeat) => {
                for child in repeat.children.iter_mut() {
                    *child = f(child)?;
                }
                Ok(())
            }
            SymbolKind::RepeatSample(repeat) => {
                for child in repeat.children.iter_mut() {
                    *child = f(child)?;
                }
                Ok(())
            }
            SymbolKind::Func(func) => {
                for arg in func.args.iter_mut() {
                    if let FuncArg::Symbol(name) = arg {
                        *name = f(name)?;
                    }
                }
                Ok(())
            }
            SymbolKind::Ref(reference) => {
                reference.target = f(&reference.target)?;
                Ok(())
            }
        }
    }

    /// Short kind label used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            SymbolKind::Text(_) => "text",
            SymbolKind::TextChoice(_) => "text choice",
            SymbolKind::Bin(_) => "binary",
            SymbolKind::Concat(_) => "concat",
            SymbolKind::Choice(_) => "choice",
            SymbolKind::Repeat(_) => "repeat",
            SymbolKind::RepeatSample(_) => "repeat sample",
            SymbolKind::Func(_) => "function",
            SymbolKind::Ref(_) => "reference",
            SymbolKind::Unresolved => "unresolved",
        }
    }
}
