//! Repository inventory: the facts the Compliance Evaluator classifies
//! against a `Template`. Collected via `RepoHost`/`RemoteFS`, not by
//! this crate — this is a pure function over already-gathered facts.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct RepositoryFile {
    pub hash: String,
    pub version: Option<String>,
    pub syntax_valid: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RepositoryInventory {
    pub files: HashMap<String, RepositoryFile>,
    pub directories: HashSet<String>,
    pub tags: Vec<String>,
    /// Expected content hash per required file path, from the template's
    /// canonical bundle. Absent entries skip the `modified` check.
    pub baseline_hashes: HashMap<String, String>,
}

impl RepositoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, file: RepositoryFile) -> Self {
        self.files.insert(path.into(), file);
        self
    }

    pub fn with_directory(mut self, path: impl Into<String>) -> Self {
        self.directories.insert(path.into());
        self
    }

    pub fn with_baseline_hash(mut self, path: impl Into<String>, hash: impl Into<String>) -> Self {
        self.baseline_hashes.insert(path.into(), hash.into());
        self
    }
}
