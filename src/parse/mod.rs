//! The line oriented grammar reader.
//!
//! Parsing builds the symbol table under grammar-hash prefixes; the normalizer rewrites those to
//! friendly prefixes once all files are read. Each line is classified by a single regex, and
//! definition bodies are tokenized by a second one (see [body]).

mod body;
pub(crate) mod regexp;

#[cfg(test)]
mod __tests__;

use crate::import::{FsImportResolver, ImportResolver};
use crate::symbol::{ChoiceSymbol, ChoiceWeight, ConcatSymbol, Symbol, SymbolKind};
use crate::{Functions, Grammar, GrammarError, IntegrityError, ParseError, DEFAULT_LIMIT};
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::Path;

static RE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?P<broken>.*)\\|\s*(?P<comment>#).*|(?P<nothing>\s*)|(?P<name>[\w:-]+)(?P<type>(?:\s+(?P<weight>\d+)\s+|\s*\+\s*|\s+import\(\s*)|\s+)(?P<def>.+)|\s+(?:\+|(?P<contweight>\d+))\s*(?P<cont>.+))$",
    )
    .unwrap()
});

/// Per-file parser state: the hash prefix of the file being parsed, its import declarations and
/// the bookkeeping for implicit symbol names.
pub(crate) struct ParseState {
    /// Hash prefix under which this file's symbols are keyed.
    pub prefix: String,
    /// Import alias to (hash prefix, declaration line).
    pub imports: HashMap<String, (String, usize)>,
    /// Aliases actually used by prefixed references.
    pub imports_used: HashSet<String>,
    pub line_no: usize,
    /// Per-line counter minting unique implicit names; reset for every physical line.
    pub n_implicit: i64,
    /// Source name for error reporting, when known.
    pub name: Option<String>,
}

impl ParseState {
    fn new(prefix: String, name: Option<String>) -> Self {
        Self {
            prefix,
            imports: HashMap::new(),
            imports_used: HashSet::new(),
            line_no: 0,
            n_implicit: -1,
            name,
        }
    }

    pub fn implicit(&mut self) -> i64 {
        self.n_implicit += 1;
        self.n_implicit
    }

    pub fn error(&self, message: String) -> ParseError {
        ParseError::new(message, self.line_no, self.name.clone())
    }

    /// Qualify a local reference: an explicit `Alias.` prefix maps through the import table,
    /// anything else is keyed under the current file's hash prefix.
    pub fn get_prefixed(
        &mut self,
        symprefix: Option<&str>,
        sym: &str,
    ) -> Result<String, ParseError> {
        match symprefix {
            Some(prefix) => {
                let alias = &prefix[..prefix.len() - 1];
                match self.imports.get(alias) {
                    Some((hash, _)) => {
                        let prefixed = format!("{}.{}", hash, sym);
                        self.imports_used.insert(alias.to_string());
                        Ok(prefixed)
                    }
                    None => Err(self.error(format!(
                        "Attempt to use symbol from unknown prefix: {}",
                        alias
                    ))),
                }
            }
            None => Ok(format!("{}.{}", self.prefix, sym)),
        }
    }

    fn add_import(&mut self, alias: String, hash: String) {
        self.imports.insert(alias, (hash, self.line_no));
    }

    fn check_unused_imports(&self) -> Result<(), IntegrityError> {
        let mut unused: Vec<&str> = self
            .imports
            .keys()
            .filter(|alias| !self.imports_used.contains(*alias))
            .map(|alias| alias.as_str())
            .collect();
        if unused.is_empty() {
            return Ok(());
        }
        unused.sort_unstable();
        Err(IntegrityError::new(
            format!(
                "Unused import{}: {}",
                if unused.len() > 1 { "s" } else { "" },
                unused.join(", ")
            ),
            None,
        ))
    }
}

fn grammar_hash(text: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    let digest = format!("{:016x}", hasher.finish());
    digest[..6].to_string()
}

impl Grammar {
    /// Parse and validate a grammar definition. `limit` is the soft output length bound
    /// ([DEFAULT_LIMIT] when [None]); `functions` supplies the generator functions the grammar
    /// may call. Imports are resolved from the filesystem relative to the working directory.
    pub fn new(
        grammar: &str,
        limit: Option<usize>,
        functions: Functions,
    ) -> Result<Self, GrammarError> {
        Self::with_resolver(grammar, None, limit, functions, &FsImportResolver)
    }

    /// Like [Grammar::new], reading the grammar from a file so that imports also resolve
    /// relative to that file's directory.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        limit: Option<usize>,
        functions: Functions,
    ) -> Result<Self, GrammarError> {
        let name = path.as_ref().display().to_string();
        let text = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            GrammarError::Parse(ParseError::new(
                format!("Could not read grammar: {}", err),
                0,
                Some(name.clone()),
            ))
        })?;
        Self::with_resolver(&text, Some(&name), limit, functions, &FsImportResolver)
    }

    /// Like [Grammar::new] with an explicit [ImportResolver], for grammars whose imports do not
    /// live on the filesystem.
    pub fn with_resolver(
        grammar: &str,
        source_name: Option<&str>,
        limit: Option<usize>,
        functions: Functions,
        resolver: &dyn ImportResolver,
    ) -> Result<Self, GrammarError> {
        if functions.contains("import") {
            return Err(GrammarError::Integrity(IntegrityError::new(
                "'import' is a reserved function name".to_string(),
                None,
            )));
        }
        let mut built = Grammar {
            symtab: BTreeMap::new(),
            tracked: BTreeSet::new(),
            funcs: functions,
            limit: limit.unwrap_or(DEFAULT_LIMIT),
            debug: OnceCell::new(),
        };
        let mut imports: HashMap<String, String> = HashMap::new();
        built.parse_source(grammar, source_name, "", &mut imports, resolver)?;
        built.normalize(&imports)?;
        built.check_integrity()?;
        Ok(built)
    }

    /// Parse one grammar file into the symbol table under its hash prefix, recursing into
    /// imports. Returns the hash prefix; a file whose hash was already parsed is not parsed
    /// again.
    fn parse_source(
        &mut self,
        text: &str,
        source_name: Option<&str>,
        prefix: &str,
        imports: &mut HashMap<String, String>,
        resolver: &dyn ImportResolver,
    ) -> Result<String, GrammarError> {
        let hash = grammar_hash(text);
        if imports.contains_key(&hash) {
            return Ok(hash);
        }
        imports.insert(hash.clone(), prefix.to_string());
        let mut pstate = ParseState::new(hash.clone(), source_name.map(str::to_string));

        let mut ljoin = String::new();
        let mut current_choice: Option<String> = None;
        for raw_line in text.lines() {
            pstate.line_no += 1;
            pstate.n_implicit = -1;
            let line = if ljoin.is_empty() {
                raw_line.to_string()
            } else {
                format!("{}{}", ljoin, raw_line)
            };
            ljoin.clear();
            let caps = match RE_LINE.captures(&line) {
                Some(caps) => caps,
                None => {
                    return Err(pstate
                        .error(format!("Failed to parse definition at: {}", line))
                        .into())
                }
            };
            if let Some(broken) = caps.name("broken") {
                ljoin = broken.as_str().to_string();
                continue;
            }
            if caps.name("comment").is_some() || caps.name("nothing").is_some() {
                continue;
            }
            if let Some(name) = caps.name("name") {
                let sym_name = name.as_str();
                let sym_type = caps.name("type").map_or("", |m| m.as_str());
                let defn = caps.name("def").map_or("", |m| m.as_str());
                if caps.name("weight").is_some() || sym_type.trim_start().starts_with('+') {
                    let weight = match caps.name("weight") {
                        Some(weight) => ChoiceWeight::Number(parse_weight(weight.as_str(), &pstate)?),
                        None => ChoiceWeight::Inherited,
                    };
                    let full = format!("{}.{}", pstate.prefix, sym_name);
                    self.define(
                        &pstate,
                        Symbol::new(
                            full.clone(),
                            pstate.line_no,
                            false,
                            SymbolKind::Choice(ChoiceSymbol::new()),
                        ),
                    )?;
                    let children = body::parse_body(self, &mut pstate, defn)?;
                    self.append_alternative(&full, children, weight);
                    current_choice = Some(full);
                } else if sym_type.trim_start().starts_with("import(") {
                    current_choice = None;
                    let full = format!("{}.{}", pstate.prefix, sym_name);
                    if let Some(prev) = self.symtab.get(&full) {
                        return Err(pstate
                            .error(format!(
                                "Redefinition of symbol {} previously declared on line {}",
                                sym_name, prev.line_no
                            ))
                            .into());
                    }
                    let (import_fn, rest) = body::scan_quoted(defn, &pstate)?;
                    let rest = rest.trim_start();
                    let rest = match rest.strip_prefix(')') {
                        Some(rest) => rest.trim(),
                        None => {
                            return Err(pstate
                                .error(format!("Expected ')' parsing import at: {}", rest))
                                .into())
                        }
                    };
                    if !rest.is_empty() {
                        return Err(pstate
                            .error(format!("Unexpected input following import: {}", rest))
                            .into());
                    }
                    let (import_text, import_name) = match resolver
                        .resolve(&import_fn, pstate.name.as_deref())
                    {
                        Ok(resolved) => resolved,
                        Err(_) => {
                            return Err(GrammarError::Integrity(IntegrityError::new(
                                format!("Could not find imported grammar: {}", import_fn),
                                Some(pstate.line_no),
                            )))
                        }
                    };
                    let import_hash = self.parse_source(
                        &import_text,
                        import_name.as_deref(),
                        sym_name,
                        imports,
                        resolver,
                    )?;
                    pstate.add_import(sym_name.to_string(), import_hash);
                } else {
                    current_choice = None;
                    let full = format!("{}.{}", pstate.prefix, sym_name);
                    self.define(
                        &pstate,
                        Symbol::new(
                            full.clone(),
                            pstate.line_no,
                            false,
                            SymbolKind::Concat(ConcatSymbol {
                                children: Vec::new(),
                            }),
                        ),
                    )?;
                    let children = body::parse_body(self, &mut pstate, defn)?;
                    if let Some(sym) = self.symtab.get_mut(&full) {
                        if let SymbolKind::Concat(concat) = &mut sym.kind {
                            concat.children = children;
                        }
                    }
                }
            } else if let Some(cont) = caps.name("cont") {
                let weight = match caps.name("contweight") {
                    Some(weight) => ChoiceWeight::Number(parse_weight(weight.as_str(), &pstate)?),
                    None => ChoiceWeight::Inherited,
                };
                let choice_name = match &current_choice {
                    Some(name) => name.clone(),
                    None => {
                        return Err(pstate
                            .error("Unexpected continuation of choice symbol".to_string())
                            .into())
                    }
                };
                let children = body::parse_body(self, &mut pstate, cont.as_str())?;
                self.append_alternative(&choice_name, children, weight);
            }
        }

        pstate.check_unused_imports()?;
        Ok(hash)
    }

    fn append_alternative(&mut self, choice_name: &str, children: Vec<String>, weight: ChoiceWeight) {
        if let Some(sym) = self.symtab.get_mut(choice_name) {
            if let SymbolKind::Choice(choice) = &mut sym.kind {
                choice.append(children, weight);
            }
        }
    }

    /// Bind a symbol in the symbol table, rejecting reserved names and redefinitions. An
    /// existing forward declaration placeholder or reference entry may be replaced.
    pub(crate) fn define(&mut self, pstate: &ParseState, sym: Symbol) -> Result<(), ParseError> {
        let name = sym.name.clone();
        if name == format!("{}.import", pstate.prefix) {
            return Err(pstate.error("'import' is a reserved name".to_string()));
        }
        let unprefixed = match name.split_once('.') {
            Some((_, local)) => local,
            None => name.as_str(),
        };
        if let Some((_, import_line)) = pstate.imports.get(unprefixed) {
            return Err(pstate.error(format!(
                "Redefinition of symbol {} previously declared on line {}",
                unprefixed, import_line
            )));
        }
        if let Some(prev) = self.symtab.get(&name) {
            match prev.kind {
                SymbolKind::Unresolved | SymbolKind::Ref(_) => {}
                _ => {
                    return Err(pstate.error(format!(
                        "Redefinition of symbol {} previously declared on line {}",
                        unprefixed, prev.line_no
                    )))
                }
            }
        }
        self.symtab.insert(name, sym);
        Ok(())
    }
}

fn parse_weight(digits: &str, pstate: &ParseState) -> Result<f64, ParseError> {
    digits
        .parse::<f64>()
        .map_err(|_| pstate.error(format!("Invalid choice weight: {}", digits)))
}
