//! Column alias bookkeeping for one compilation.
//!
//! Every projected column gets a short `aliasN` name. The mapping is keyed by
//! a structured [`AliasKey`] rather than a concatenated string, so raw
//! identifiers containing separator characters cannot collide.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use super::StepLabel;
use crate::graph_catalog::{ForeignKey, TableRef};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AliasColumn {
    Id,
    Property(String),
    ForeignKey(ForeignKey),
}

impl fmt::Display for AliasColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AliasColumn::Id => write!(f, "ID"),
            AliasColumn::Property(p) => write!(f, "{}", p),
            AliasColumn::ForeignKey(fk) => write!(f, "{}", fk.column()),
        }
    }
}

/// Canonical identity of a projected column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasKey {
    pub depth: usize,
    pub table: TableRef,
    pub column: AliasColumn,
    /// Reduced label set of the owning node; empty for unlabelled nodes.
    pub labels: BTreeSet<StepLabel>,
}

/// Bidirectional key <-> alias map with a monotonically increasing counter.
#[derive(Debug, Clone, Default)]
pub struct AliasState {
    counter: usize,
    by_key: HashMap<AliasKey, String>,
    by_alias: HashMap<String, AliasKey>,
}

impl AliasState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for `key`, allocating the next one on first use.
    pub fn alias_for(&mut self, key: AliasKey) -> String {
        if let Some(alias) = self.by_key.get(&key) {
            return alias.clone();
        }
        self.counter += 1;
        let alias = format!("alias{}", self.counter);
        self.by_alias.insert(alias.clone(), key.clone());
        self.by_key.insert(key, alias.clone());
        alias
    }

    pub fn get(&self, key: &AliasKey) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn key_for(&self, alias: &str) -> Option<&AliasKey> {
        self.by_alias.get(alias)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Forget every alias and restart numbering at `alias1`.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.by_key.clear();
        self.by_alias.clear();
    }

    /// Alias -> key view handed to result decoding.
    pub fn snapshot(&self) -> BTreeMap<String, AliasKey> {
        self.by_alias
            .iter()
            .map(|(alias, key)| (alias.clone(), key.clone()))
            .collect()
    }
}
