//! Namespace metadata: the descriptive record attached to each silo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive metadata for a namespace.
///
/// A namespace is an isolated knowledge silo owning exactly one vector index
/// and one sparse index. The metadata here is descriptive only; the indexes
/// and chunk store live in the engine's per-namespace state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceMetadata {
    /// Unique namespace name.
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Organizational tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Owning department, if any.
    #[serde(default)]
    pub department: String,

    /// Contact person or address, if any.
    #[serde(default)]
    pub contact: String,

    /// When the namespace was created.
    pub created_at: DateTime<Utc>,

    /// When the namespace content last changed.
    pub last_updated: DateTime<Utc>,
}

impl NamespaceMetadata {
    /// Create metadata for a new namespace with the current timestamp.
    pub fn new<S: Into<String>>(name: S) -> Self {
        let now = Utc::now();
        NamespaceMetadata {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            department: String::new(),
            contact: String::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Set the description.
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the owning department.
    pub fn with_department<S: Into<String>>(mut self, department: S) -> Self {
        self.department = department.into();
        self
    }

    /// Set the contact.
    pub fn with_contact<S: Into<String>>(mut self, contact: S) -> Self {
        self.contact = contact.into();
        self
    }

    /// Record a content mutation.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// A point-in-time snapshot of a namespace's contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceStats {
    /// The namespace's metadata at snapshot time.
    pub metadata: NamespaceMetadata,

    /// Number of distinct source documents represented.
    pub doc_count: usize,

    /// Number of indexed chunks.
    pub chunk_count: usize,

    /// Number of distinct terms in the sparse index.
    pub term_count: usize,
}

/// Aggregate statistics over every namespace in an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemOverview {
    /// Number of namespaces.
    pub namespace_count: usize,

    /// Total distinct source documents across namespaces.
    pub total_docs: usize,

    /// Total indexed chunks across namespaces.
    pub total_chunks: usize,

    /// Distinct departments that own at least one namespace, sorted.
    pub departments: Vec<String>,

    /// Per-namespace snapshots, ordered by namespace name.
    pub namespaces: Vec<NamespaceStats>,
}
