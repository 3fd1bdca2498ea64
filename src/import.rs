//! Resolution of `import("…")` declarations.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// An interface used by the parser to load the text of an imported grammar.
///
/// The filesystem implementation [FsImportResolver] is used by [Grammar::new](crate::Grammar::new)
/// and [Grammar::from_file](crate::Grammar::from_file); [MapImportResolver] serves grammars kept
/// in memory.
pub trait ImportResolver {
    /// Load the grammar requested by an import declaration. `importer` is the source name of the
    /// importing grammar, when known. Returns the grammar text and, when available, a source name
    /// for it.
    fn resolve(&self, requested: &str, importer: Option<&str>)
        -> io::Result<(String, Option<String>)>;
}

/// Loads imported grammars from the filesystem, looking next to the importing file first and
/// falling back to the working directory.
pub struct FsImportResolver;

impl ImportResolver for FsImportResolver {
    fn resolve(
        &self,
        requested: &str,
        importer: Option<&str>,
    ) -> io::Result<(String, Option<String>)> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(importer) = importer {
            if let Some(parent) = Path::new(importer).parent() {
                candidates.push(parent.join(requested));
            }
        }
        candidates.push(PathBuf::from(requested));
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no import candidates");
        for candidate in candidates {
            match fs::read_to_string(&candidate) {
                Ok(text) => return Ok((text, Some(candidate.display().to_string()))),
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }
}

/// Serves imported grammars from an in-memory name to text map.
pub struct MapImportResolver {
    grammars: HashMap<String, String>,
}

impl MapImportResolver {
    pub fn new() -> Self {
        Self {
            grammars: HashMap::new(),
        }
    }

    pub fn add(mut self, name: &str, text: &str) -> Self {
        self.grammars.insert(name.to_string(), text.to_string());
        self
    }
}

impl Default for MapImportResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportResolver for MapImportResolver {
    fn resolve(
        &self,
        requested: &str,
        _importer: Option<&str>,
    ) -> io::Result<(String, Option<String>)> {
        match self.grammars.get(requested) {
            Some(text) => Ok((text.clone(), Some(requested.to_string()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown grammar {}", requested),
            )),
        }
    }
}
