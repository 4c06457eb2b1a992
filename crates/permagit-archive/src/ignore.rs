//! Names excluded from packing.

use std::collections::BTreeSet;
use std::path::Path;

/// Set of path component names skipped while packing.
///
/// Matching is by exact component name at any depth; `.gitignore` lines are
/// used verbatim after stripping leading and trailing slashes.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    names: BTreeSet<String>,
}

impl IgnoreList {
    /// Creates an ignore list from explicit names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        for name in names {
            list.insert(name);
        }
        list
    }

    /// Adds every usable line of `<root>/.gitignore`, if present.
    pub fn with_gitignore(mut self, root: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(root.join(".gitignore")) else {
            return self;
        };
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.insert(line);
        }
        self
    }

    fn insert(&mut self, name: impl Into<String>) {
        let name = name.into();
        let name = name.trim_matches('/');
        if !name.is_empty() {
            self.names.insert(name.to_string());
        }
    }

    /// Returns true if a path component with this name must be skipped.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Returns the number of ignored names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing is ignored.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
