use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::graph_catalog::ElementKind;
use crate::query_tree::Phase;
use crate::traversal::{RecordId, SortOrder, Value};

/// One vertex or edge decoded from a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementFragment {
    pub kind: ElementKind,
    pub record: RecordId,
    pub properties: BTreeMap<String, Value>,
    /// `as(..)` names attached to this hop.
    pub labels: BTreeSet<String>,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_vertex: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_vertex: Option<RecordId>,
}

impl ElementFragment {
    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

impl fmt::Display for ElementFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ElementKind::Vertex => "v",
            ElementKind::Edge => "e",
        };
        write!(f, "{}[{}]", prefix, self.record)
    }
}

/// One result path.
///
/// The first `shared_prefix` fragments of the full path equal those of the
/// previous row and are left out of `fragments`; see
/// [`ResultAssembler::paths`](super::ResultAssembler::paths).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathRow {
    pub phase: Phase,
    pub shared_prefix: usize,
    pub fragments: Vec<ElementFragment>,
    #[serde(skip)]
    pub sort_key: Vec<(Value, SortOrder)>,
}

impl PathRow {
    /// The element this row ends at. Never part of the shared prefix.
    pub fn terminal(&self) -> Option<&ElementFragment> {
        self.fragments.last()
    }
}

impl fmt::Display for PathRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.phase)?;
        if self.shared_prefix > 0 {
            write!(f, " (+{})", self.shared_prefix)?;
        }
        for fragment in &self.fragments {
            write!(f, " {}", fragment)?;
        }
        Ok(())
    }
}
