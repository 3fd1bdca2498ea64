//! The stack machine that expands a start symbol into output.
//!
//! Expansion never recurses through the host stack for grammar structure; every dispatch pushes
//! work items onto an explicit stack. The only host recursion is the nested generation of
//! function arguments. Once the output length crosses the grammar's soft limit, choices restrict
//! themselves to terminating alternatives and repeats collapse to their minimum count.


use crate::serialize::format_float;
use crate::symbol::{FuncArg, SymbolKind};
use crate::util::Log;
use crate::weighted::WeightedChoice;
use crate::{Generated, GenerationError, Grammar};
use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use std::collections::{BTreeSet, HashMap};

impl Generated {
    pub fn len(&self) -> usize {
        match self {
            Generated::Text(text) => text.len(),
            Generated::Bin(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Generated::Text(text) => Some(text),
            Generated::Bin(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Generated::Text(text) => Some(text),
            Generated::Bin(_) => None,
        }
    }

    pub fn as_bin(&self) -> Option<&[u8]> {
        match self {
            Generated::Text(_) => None,
            Generated::Bin(bytes) => Some(bytes),
        }
    }

    /// The raw output bytes, regardless of kind.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Generated::Text(text) => text.into_bytes(),
            Generated::Bin(bytes) => bytes,
        }
    }
}

/// One pending item of the expansion stack: a symbol to expand, an unwind marker recording the
/// symbol for error backtraces, or an untrack marker closing an instance capture.
enum StackItem {
    Sym(String),
    Unwind(String),
    Untrack(String),
}

/// The output accumulator. The buffer kind is decided by the first value appended; appending the
/// other kind afterwards is a generation error.
enum OutputBuffer {
    Empty,
    Text(String),
    Bin(Vec<u8>),
}

impl OutputBuffer {
    fn len(&self) -> usize {
        match self {
            OutputBuffer::Empty => 0,
            OutputBuffer::Text(text) => text.len(),
            OutputBuffer::Bin(bytes) => bytes.len(),
        }
    }

    fn append_text(&mut self, value: &str) -> Result<(), String> {
        match self {
            OutputBuffer::Empty => {
                *self = OutputBuffer::Text(value.to_string());
                Ok(())
            }
            OutputBuffer::Text(text) => {
                text.push_str(value);
                Ok(())
            }
            OutputBuffer::Bin(_) => {
                Err("Wrong value type generated, expecting binary, got text".to_string())
            }
        }
    }

    fn append_bin(&mut self, value: &[u8]) -> Result<(), String> {
        match self {
            OutputBuffer::Empty => {
                *self = OutputBuffer::Bin(value.to_vec());
                Ok(())
            }
            OutputBuffer::Bin(bytes) => {
                bytes.extend_from_slice(value);
                Ok(())
            }
            OutputBuffer::Text(_) => {
                Err("Wrong value type generated, expecting text, got binary".to_string())
            }
        }
    }

    fn append(&mut self, value: &Generated) -> Result<(), String> {
        match value {
            Generated::Text(text) => self.append_text(text),
            Generated::Bin(bytes) => self.append_bin(bytes),
        }
    }

    /// The output appended since `start`, joined into one captured instance.
    fn slice_from(&self, start: usize) -> Generated {
        match self {
            OutputBuffer::Empty => Generated::Text(String::new()),
            OutputBuffer::Text(text) => Generated::Text(text[start..].to_string()),
            OutputBuffer::Bin(bytes) => Generated::Bin(bytes[start..].to_vec()),
        }
    }

    fn into_generated(self) -> Generated {
        match self {
            OutputBuffer::Empty => Generated::Text(String::new()),
            OutputBuffer::Text(text) => Generated::Text(text),
            OutputBuffer::Bin(bytes) => Generated::Bin(bytes),
        }
    }
}

/// Per-call generation state; owned exclusively by one generate call.
struct GenState {
    symstack: Vec<StackItem>,
    /// Captured previous outputs of tracked symbols, for `@` references.
    instances: HashMap<String, Vec<Generated>>,
    output: OutputBuffer,
    /// Open instance captures: tracked symbol name and the output length when its expansion
    /// began.
    tracking: Vec<(String, usize)>,
}

impl GenState {
    fn new(tracked: &BTreeSet<String>) -> Self {
        Self {
            symstack: Vec::new(),
            instances: tracked
                .iter()
                .map(|name| (name.clone(), Vec::new()))
                .collect(),
            output: OutputBuffer::Empty,
            tracking: Vec::new(),
        }
    }

    /// A nested state for function argument generation; the instances map is swapped in from the
    /// enclosing state so captures are shared.
    fn nested() -> Self {
        Self {
            symstack: Vec::new(),
            instances: HashMap::new(),
            output: OutputBuffer::Empty,
            tracking: Vec::new(),
        }
    }

    /// The symbols whose expansion is currently in progress, outermost first.
    fn backtrace(&self) -> Vec<String> {
        self.symstack
            .iter()
            .filter_map(|item| match item {
                StackItem::Unwind(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn error(&self, message: String) -> GenerationError {
        GenerationError::new(message, self.backtrace())
    }
}

impl Grammar {
    /// Set a log label to debug generation. Based on the level of the [Log], expansions and
    /// reference fallbacks are reported on standard output (debug builds only).
    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.debug
            .set(log)
            .map_err(|log| format!("Log label {} is already assigned.", log))
    }

    pub(crate) fn is_limit_exceeded(&self, length: usize) -> bool {
        length >= self.limit
    }

    /// Generate one instance of the language from `root`, using the thread-local random source.
    pub fn generate(&self) -> Result<Generated, GenerationError> {
        self.generate_with(&mut rand::thread_rng())
    }

    /// Generate one instance of the language from `root` with the given random source. A seeded
    /// source makes the output reproducible.
    pub fn generate_with<R: Rng>(&self, rng: &mut R) -> Result<Generated, GenerationError> {
        self.generate_from("root", rng)
    }

    /// Generate one instance starting from an arbitrary named symbol.
    pub fn generate_from<R: Rng>(
        &self,
        start: &str,
        rng: &mut R,
    ) -> Result<Generated, GenerationError> {
        let mut state = GenState::new(&self.tracked);
        state.symstack.push(StackItem::Sym(start.to_string()));
        self.run(&mut state, rng)?;
        Ok(state.output.into_generated())
    }

    /// The expansion loop: pop an item, handle markers, dispatch symbols.
    fn run<R: Rng>(&self, state: &mut GenState, rng: &mut R) -> Result<(), GenerationError> {
        while let Some(item) = state.symstack.pop() {
            match item {
                StackItem::Unwind(_) => {}
                StackItem::Untrack(name) => {
                    let (tracked_name, start) = match state.tracking.pop() {
                        Some(entry) => entry,
                        None => {
                            return Err(
                                state.error(format!("Tracking mismatch: nothing open for {}", name))
                            )
                        }
                    };
                    if tracked_name != name {
                        return Err(state.error(format!(
                            "Tracking mismatch: expected {}, got {}",
                            tracked_name, name
                        )));
                    }
                    let instance = state.output.slice_from(start);
                    state.instances.entry(name).or_default().push(instance);
                }
                StackItem::Sym(name) => {
                    if self.tracked.contains(&name) {
                        state.symstack.push(StackItem::Untrack(name.clone()));
                        state.tracking.push((name.clone(), state.output.len()));
                    }
                    state.symstack.push(StackItem::Unwind(name.clone()));
                    self.expand(&name, state, rng)?;
                }
            }
        }
        Ok(())
    }

    fn expand<R: Rng>(
        &self,
        name: &str,
        state: &mut GenState,
        rng: &mut R,
    ) -> Result<(), GenerationError> {
        self.log_expand(name);
        let sym = match self.symtab.get(name) {
            Some(sym) => sym,
            None => return Err(state.error(format!("Can't generate undefined symbol {}", name))),
        };
        match &sym.kind {
            SymbolKind::Text(text) => state
                .output
                .append_text(&text.value)
                .map_err(|message| state.error(message)),
            SymbolKind::TextChoice(choice) => match choice.value.chars().choose(rng) {
                Some(chr) => state
                    .output
                    .append_text(chr.encode_utf8(&mut [0u8; 4]))
                    .map_err(|message| state.error(message)),
                None => Err(state.error(format!("Empty text choice in {}", name))),
            },
            SymbolKind::Bin(bin) => state
                .output
                .append_bin(&bin.value)
                .map_err(|message| state.error(message)),
            SymbolKind::Concat(concat) => {
                for child in concat.children.iter().rev() {
                    state.symstack.push(StackItem::Sym(child.clone()));
                }
                Ok(())
            }
            SymbolKind::Choice(choice) => {
                let index = if self.is_limit_exceeded(state.output.len())
                    && sym.can_terminate == Some(true)
                {
                    let mut terminators = WeightedChoice::new();
                    for (alt, flag) in choice.alt_terminate.iter().enumerate() {
                        if *flag == Some(true) {
                            terminators.append(alt, choice.weights[alt].value());
                        }
                    }
                    *terminators
                        .choice(rng)
                        .map_err(|message| state.error(message))?
                } else {
                    let mut weighted = WeightedChoice::new();
                    weighted.extend(
                        choice
                            .weights
                            .iter()
                            .enumerate()
                            .map(|(alt, weight)| (alt, weight.value())),
                    );
                    *weighted.choice(rng).map_err(|message| state.error(message))?
                };
                for child in choice.alternatives[index].iter().rev() {
                    state.symstack.push(StackItem::Sym(child.clone()));
                }
                Ok(())
            }
            SymbolKind::Repeat(repeat) => {
                let reps = match self.repeat_count(
                    sym.can_terminate,
                    repeat.min,
                    repeat.max,
                    state.output.len(),
                    rng,
                ) {
                    Some(reps) => reps,
                    None => return Ok(()), // over the limit with no way out, chop the output
                };
                for _ in 0..reps {
                    for child in repeat.children.iter().rev() {
                        state.symstack.push(StackItem::Sym(child.clone()));
                    }
                }
                Ok(())
            }
            SymbolKind::RepeatSample(repeat) => {
                let reps = match self.repeat_count(
                    sym.can_terminate,
                    repeat.min,
                    repeat.max,
                    state.output.len(),
                    rng,
                ) {
                    Some(reps) => reps,
                    None => return Ok(()),
                };
                let sample_idx = match repeat.sample_idx {
                    Some(sample_idx) => sample_idx,
                    None => {
                        return Err(
                            state.error(format!("Repeat sample {} was not normalized", name))
                        )
                    }
                };
                let choice = match self
                    .symtab
                    .get(&repeat.children[sample_idx])
                    .map(|sym| &sym.kind)
                {
                    Some(SymbolKind::Choice(choice)) => choice,
                    _ => {
                        return Err(state.error(format!(
                            "Repeat sample {} has lost its choice child",
                            name
                        )))
                    }
                };
                let mut weighted = WeightedChoice::new();
                weighted.extend(
                    choice
                        .weights
                        .iter()
                        .enumerate()
                        .map(|(alt, weight)| (alt, weight.value())),
                );
                let picks: Vec<usize> = weighted
                    .sample(rng, reps)
                    .map_err(|message| state.error(message))?
                    .into_iter()
                    .copied()
                    .collect();
                let pre = &repeat.children[..sample_idx];
                let post = &repeat.children[sample_idx + 1..];
                for pick in picks.iter().rev() {
                    for child in post.iter().rev() {
                        state.symstack.push(StackItem::Sym(child.clone()));
                    }
                    for child in choice.alternatives[*pick].iter().rev() {
                        state.symstack.push(StackItem::Sym(child.clone()));
                    }
                    for child in pre.iter().rev() {
                        state.symstack.push(StackItem::Sym(child.clone()));
                    }
                }
                Ok(())
            }
            SymbolKind::Func(func) => {
                let mut argv: Vec<String> = Vec::with_capacity(func.args.len());
                for arg in &func.args {
                    match arg {
                        FuncArg::Int(value) => argv.push(value.to_string()),
                        FuncArg::Float(value) => argv.push(format_float(*value)),
                        FuncArg::Symbol(child) => {
                            let mut nested = GenState::nested();
                            nested.instances = std::mem::take(&mut state.instances);
                            nested.symstack.push(StackItem::Sym(child.clone()));
                            let run_result = self.run(&mut nested, rng);
                            state.instances = std::mem::take(&mut nested.instances);
                            run_result?;
                            match nested.output.into_generated() {
                                Generated::Text(text) => argv.push(text),
                                Generated::Bin(_) => {
                                    return Err(state.error(format!(
                                        "Binary value passed as argument to function {}",
                                        func.fname
                                    )))
                                }
                            }
                        }
                    }
                }
                let result = self.funcs.call(&func.fname, &argv, rng).map_err(|mut err| {
                    if err.backtrace.is_empty() {
                        err.backtrace = state.backtrace();
                    }
                    err
                })?;
                state
                    .output
                    .append_text(&result)
                    .map_err(|message| state.error(message))
            }
            SymbolKind::Ref(reference) => {
                let instance = state
                    .instances
                    .get(&reference.target)
                    .and_then(|list| list.choose(rng))
                    .cloned();
                match instance {
                    Some(instance) => state
                        .output
                        .append(&instance)
                        .map_err(|message| state.error(message)),
                    None => {
                        // nothing captured yet; expand the target instead, which also captures it
                        self.log_ref_miss(&reference.target);
                        state
                            .symstack
                            .push(StackItem::Sym(reference.target.clone()));
                        Ok(())
                    }
                }
            }
            SymbolKind::Unresolved => {
                Err(state.error(format!("Can't generate unresolved symbol {}", name)))
            }
        }
    }

    /// The repetition count for a repeat symbol. Below the limit the count is biased toward the
    /// lower end of `[min, max]`; above it a terminating repeat collapses to its minimum and a
    /// non-terminating one emits nothing.
    fn repeat_count<R: Rng>(
        &self,
        can_terminate: Option<bool>,
        min: usize,
        max: usize,
        length: usize,
        rng: &mut R,
    ) -> Option<usize> {
        if self.is_limit_exceeded(length) {
            if can_terminate != Some(true) {
                return None;
            }
            return Some(min);
        }
        let upper = rng.gen_range(min..=max);
        Some(rng.gen_range(min..=upper))
    }

    fn log_expand(&self, _name: &str) {
        #[cfg(debug_assertions)]
        if let Some(log) = self.debug.get() {
            if log.order() >= Log::Verbose(()).order() {
                println!("[{}; Expanding]: {}", log, _name);
            }
        }
    }

    fn log_ref_miss(&self, _target: &str) {
        #[cfg(debug_assertions)]
        if let Some(log) = self.debug.get() {
            if log.order() >= Log::Default(()).order() {
                println!(
                    "[{}; Reference]: no instances of {} yet, generating a fresh value",
                    log, _target
                );
            }
        }
    }
}
