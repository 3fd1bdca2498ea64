//! Grammar generation tool (gramgen) is a library to produce randomly constructed instances of a
//! language described by a textual grammar, intended for fuzz-testing parsers, interpreters and
//! protocol handlers.
//!
//! # Overview
//! Test inputs for language processors are often either hand written or produced by ad-hoc
//! scripts, both of which explore only a narrow corner of the accepted language.
//! This library reads a grammar description and generates random conforming strings or byte
//! sequences from it, so that a single grammar file can drive an arbitrary amount of structurally
//! valid, structurally varied test data.
//!
//! A [Grammar] is built from a text definition with [Grammar::new] (or [Grammar::from_file] when
//! the grammar imports other grammar files). Construction parses the definition into a symbol
//! table, normalizes it and proves its integrity: every referenced symbol must be defined, every
//! symbol must be reachable from the start symbol `root`, and every symbol must have a finite
//! path to termination. A validated [Grammar] is immutable and [Grammar::generate] can be called
//! any number of times.
//!
//! # Grammar format
//!
//! A grammar is a sequence of lines. Comments start with `#`, a trailing backslash joins a line
//! with the next one, and blank lines are ignored. A named symbol is a name at the start of a
//! line followed by whitespace and a definition:
//!
//! ```text
//! SymbolName  Definition
//! ```
//!
//! The definition is a concatenation of one or more parts:
//!
//! * `"text"` or `'text'` generates the text verbatim. The escapes `\f`, `\n`, `\r`, `\t` and
//!   `\v` map to the corresponding control characters; any other backslash pair yields the
//!   character itself.
//! * `x"4141"` generates binary data given in hex notation. Text and binary output cannot be
//!   mixed in one generation.
//! * `/[a-z]{3}[0-9]?/` generates text from a minimal regex sublanguage: literal characters,
//!   `.` for any character of a fixed ASCII alphabet, character sets `[…]` and inverted sets
//!   `[^…]` with inclusive ranges, and the quantifiers `{n}`, `{n,m}`, `?`, `*` (up to five) and
//!   `+` (one to five). There is no grouping or alternation; `(`, `)` and `|` are plain
//!   characters.
//! * `OtherSymbol` generates the named symbol at this position. Symbols may be referenced before
//!   they are defined.
//! * `function(arg, …)` invokes a caller registered function (see [Functions]) with the given
//!   arguments; each argument is a number or a nested definition whose generated output is passed
//!   as a string. The built-ins `rndint(a,b)`, `rndflt(a,b)` and `rndpow2(exp_limit, variation)`
//!   are always available.
//! * `@OtherSymbol` repeats a value of `OtherSymbol` generated elsewhere in the output.
//! * `( … )` groups parts, and a group or part may carry a repeat suffix: `?` for zero or one,
//!   `{min,max}` for a random repetition count, `<min,max>` to repeat while sampling unique
//!   alternatives from a choice symbol.
//!
//! A weighted choice symbol is declared by giving each alternative its own line; alternatives
//! after the first start with whitespace. Each alternative is generated with probability
//! `weight / sum(weights)`. A weight of `+` inherits the total weight of the referenced choice
//! symbol:
//!
//! ```text
//! Value   10  Number
//!          5  String
//!          +  SpecialValue
//! ```
//!
//! Grammars can be split over multiple files: `Mod import("other.gmr")` parses `other.gmr` and
//! makes its symbols available as `Mod.SymbolName`.
//!
//! # Example
//!
//! ```
//! use gramgen::{Functions, Grammar};
//!
//! let grammar = Grammar::new(
//!     r#"
//! # toy key/value config generator
//! root        line{1,4}
//! line        key "=" value "\n"
//! key         /[a-z]{2,8}/
//! value       1   rndint(0, 100)
//!             1   "yes"
//!             1   "no"
//! "#,
//!     None,
//!     Functions::new(),
//! )
//! .unwrap();
//!
//! let output = grammar.generate().unwrap().into_text().unwrap();
//! for line in output.lines() {
//!     assert!(line.contains('='));
//! }
//! ```
//!
//! Generation is driven by [rand]; pass a seeded generator to [Grammar::generate_with] for
//! reproducible output. The output length is bounded softly: once the accumulated length crosses
//! the configured limit, choices and repetitions are biased toward terminating the expansion.
mod error;
pub mod examples;
mod funcs;
mod generate;
mod import;
mod integrity;
mod normalize;
mod parse;
mod serialize;
mod symbol;
mod tree;
pub mod util;
mod weighted;

use crate::funcs::FuncImpl;
use crate::symbol::Symbol;
use crate::util::Log;
use once_cell::unsync::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use crate::import::{FsImportResolver, ImportResolver, MapImportResolver};
pub use crate::tree::SymbolTree;

/// Default soft output length limit, in bytes.
pub const DEFAULT_LIMIT: usize = 100 * 1024;

/// A language generator constructed from a textual grammar definition.
///
/// The symbol table of a constructed [Grammar] is validated and immutable; generation keeps all
/// of its state per call, so one grammar can serve any number of [generate](Grammar::generate)
/// calls.
pub struct Grammar {
    pub(crate) symtab: BTreeMap<String, Symbol>,
    pub(crate) tracked: BTreeSet<String>,
    pub(crate) funcs: Functions,
    pub(crate) limit: usize,
    pub(crate) debug: OnceCell<Log<&'static str>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A value produced by [Grammar::generate]: text for grammars built from text symbols, bytes for
/// grammars containing binary symbols.
pub enum Generated {
    Text(String),
    Bin(Vec<u8>),
}

/// A caller supplied generator function, invoked with the stringified arguments of a
/// `function(…)` symbol.
pub type NativeFunction = Box<dyn Fn(&[String]) -> Result<String, GenerationError>>;

/// The registry of generator functions available to a grammar.
///
/// The built-in functions `rndint`, `rndflt` and `rndpow2` are always registered and may be
/// shadowed. Every registered non built-in function must be used by the grammar; an unused
/// function is an integrity error. The name `import` is reserved.
pub struct Functions {
    pub(crate) map: HashMap<String, FuncImpl>,
}

#[derive(Debug)]
/// An error returned when the grammar text is syntactically malformed.
pub struct ParseError {
    pub message: String,
    pub line_no: usize,
    /// Source file name, when the failing grammar was read from a file.
    pub name: Option<String>,
}

#[derive(Debug)]
/// An error returned when a well-formed grammar fails semantic validation: undefined or
/// unreachable symbols, a missing `root`, unused imports or functions, or productions with no
/// path to termination.
pub struct IntegrityError {
    pub message: String,
    pub line_no: Option<usize>,
}

#[derive(Debug)]
/// An error raised while expanding a symbol during generation.
///
/// The backtrace lists the symbols whose expansion was in progress, outermost first.
pub struct GenerationError {
    pub message: String,
    pub backtrace: Vec<String>,
}

#[derive(Debug)]
/// An error returned from [Grammar] construction.
pub enum GrammarError {
    Parse(ParseError),
    Integrity(IntegrityError),
}
