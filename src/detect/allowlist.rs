//! Case-insensitive allowlist of terms that must never be treated as PII.

use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;

/// Immutable allowlist with O(1) case-insensitive membership.
///
/// Built once at startup (or on hot-reload) and shared by reference;
/// lookups never lock.
#[derive(Debug, Default, Clone)]
pub struct Allowlist {
    terms: HashSet<String>,
}

impl Allowlist {
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Load every file in `dir`, one term per line. `#` comments and blank
    /// lines are skipped. A missing directory yields an empty allowlist.
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let mut terms = HashSet::new();
        if !dir.is_dir() {
            return Ok(Self::default());
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())?;
            for line in content.lines() {
                let term = line.trim();
                if !term.is_empty() && !term.starts_with('#') {
                    terms.insert(term.to_lowercase());
                }
            }
        }
        Ok(Self { terms })
    }

    pub fn contains(&self, term: &str) -> bool {
        !self.terms.is_empty() && self.terms.contains(&term.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
