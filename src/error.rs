use crate::{GenerationError, GrammarError, IntegrityError, ParseError};
use std::fmt::{Display, Formatter};

impl ParseError {
    pub fn new(message: String, line_no: usize, name: Option<String>) -> Self {
        Self {
            message,
            line_no,
            name,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(
                f,
                "ParseError: {} ({} line {})",
                self.message, name, self.line_no
            ),
            None => write!(f, "ParseError: {} (line {})", self.message, self.line_no),
        }
    }
}

impl IntegrityError {
    pub fn new(message: String, line_no: Option<usize>) -> Self {
        Self { message, line_no }
    }
}

impl Display for IntegrityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.line_no {
            Some(line_no) => write!(f, "IntegrityError: {} (line {})", self.message, line_no),
            None => write!(f, "IntegrityError: {}", self.message),
        }
    }
}

impl GenerationError {
    pub fn new(message: String, backtrace: Vec<String>) -> Self {
        Self { message, backtrace }
    }

    /// An error raised outside of an expansion, e.g. from a generator function; the caller fills
    /// in the backtrace of the enclosing expansion.
    pub fn bare(message: String) -> Self {
        Self {
            message,
            backtrace: Vec::new(),
        }
    }
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.backtrace.is_empty() {
            write!(f, "GenerationError: {}", self.message)
        } else {
            write!(
                f,
                "GenerationError: {} (generation backtrace: {})",
                self.message,
                self.backtrace.join(", ")
            )
        }
    }
}

impl Display for GrammarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GrammarError::Parse(err) => write!(f, "{}", err),
            GrammarError::Integrity(err) => write!(f, "{}", err),
        }
    }
}

impl From<ParseError> for GrammarError {
    fn from(err: ParseError) -> Self {
        GrammarError::Parse(err)
    }
}

impl From<IntegrityError> for GrammarError {
    fn from(err: IntegrityError) -> Self {
        GrammarError::Integrity(err)
    }
}
