//! Administrative operations: backup, restore, clone, migrate, and overlap
//! analysis.
//!
//! These are offline-style operations driven by an operator rather than the
//! query path. Each one works on whole namespaces and preserves the
//! dual-index invariant of every namespace it touches.

use std::path::Path;

use chrono::{DateTime, Utc};
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::chunk::Chunk;
use crate::error::{PalisadeError, Result};
use crate::vector::similarity_from_distance;

use super::RetrievalEngine;
use super::state::NamespaceState;

const MANIFEST_FILE: &str = "manifest.json";

/// Nearest-neighbor similarity above which two chunks count as duplicated
/// content across namespaces.
const HIGH_OVERLAP_THRESHOLD: f32 = 0.8;

/// Record written alongside a backup's artifacts.
///
/// The manifest pins what the backup is supposed to contain; restore refuses
/// a backup whose artifacts disagree with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Unique id of this backup.
    pub backup_id: String,

    /// Namespace the backup was taken from.
    pub namespace: String,

    /// Chunk count at backup time.
    pub chunk_count: usize,

    /// Distinct source-document count at backup time.
    pub doc_count: usize,

    /// Embedding dimension of the vector index.
    pub dimension: usize,

    /// When the backup was taken.
    pub created_at: DateTime<Utc>,
}

/// Result of comparing the content of two namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapReport {
    /// Namespace the sample was drawn from.
    pub namespace_a: String,

    /// Namespace searched for nearest neighbors.
    pub namespace_b: String,

    /// Number of chunks actually sampled.
    pub sampled: usize,

    /// Mean nearest-neighbor similarity over the sample.
    pub average_similarity: f32,

    /// Highest nearest-neighbor similarity seen.
    pub max_similarity: f32,

    /// Sampled chunks whose nearest neighbor scored above the duplication
    /// threshold.
    pub high_overlap_count: usize,

    /// `high_overlap_count` as a percentage of the sample.
    pub high_overlap_percentage: f32,
}

impl RetrievalEngine {
    /// Back up a namespace into `dest`.
    ///
    /// The backup is taken under the namespace's read lock, so it is a
    /// consistent snapshot. Artifacts are written to a temporary sibling
    /// directory first and renamed into place, so `dest` is never observed
    /// half-written. `dest` must not already exist (an empty directory is
    /// tolerated and replaced).
    pub fn backup(&self, namespace: &str, dest: &Path) -> Result<BackupManifest> {
        let entry = self.entry(namespace)?;

        if dest.exists() {
            let occupied = std::fs::read_dir(dest)?.next().is_some();
            if occupied {
                return Err(PalisadeError::invalid_argument(format!(
                    "backup destination {} is not empty",
                    dest.display()
                )));
            }
            std::fs::remove_dir(dest)?;
        }
        let parent = dest.parent().ok_or_else(|| {
            PalisadeError::invalid_argument(format!(
                "backup destination {} has no parent directory",
                dest.display()
            ))
        })?;
        std::fs::create_dir_all(parent)?;

        let staging = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        std::fs::create_dir(&staging)?;

        let write: Result<BackupManifest> = (|| {
            let state = entry.read();
            let manifest = BackupManifest {
                backup_id: Uuid::new_v4().to_string(),
                namespace: namespace.to_string(),
                chunk_count: state.chunk_count(),
                doc_count: state.doc_count(),
                dimension: state.vector.dimension(),
                created_at: Utc::now(),
            };
            state.save_to_dir(&staging)?;
            let json = serde_json::to_string_pretty(&manifest)?;
            std::fs::write(staging.join(MANIFEST_FILE), json)?;
            Ok(manifest)
        })();

        match write {
            Ok(manifest) => {
                std::fs::rename(&staging, dest)?;
                info!(namespace, backup_id = %manifest.backup_id, dest = %dest.display(), "backup complete");
                Ok(manifest)
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }

    /// Restore a namespace from a backup directory.
    ///
    /// The backup's manifest names the namespace being restored. An existing
    /// namespace of that name is an error unless `overwrite` is set.
    /// Artifacts that fail their integrity checks, or that disagree with the
    /// manifest, reject the whole restore; the engine's current state is
    /// untouched on failure.
    pub fn restore(&self, backup_dir: &Path, overwrite: bool) -> Result<String> {
        let json = std::fs::read_to_string(backup_dir.join(MANIFEST_FILE)).map_err(|e| {
            PalisadeError::corrupt(format!("{}: missing manifest: {e}", backup_dir.display()))
        })?;
        let manifest: BackupManifest = serde_json::from_str(&json).map_err(|e| {
            PalisadeError::corrupt(format!("{}: bad manifest: {e}", backup_dir.display()))
        })?;

        if manifest.dimension != self.config.dimension {
            return Err(PalisadeError::dimension_mismatch(
                self.config.dimension,
                manifest.dimension,
            ));
        }

        let mut state = NamespaceState::load_from_dir(backup_dir)?;
        if state.chunk_count() != manifest.chunk_count {
            return Err(PalisadeError::corrupt(format!(
                "{}: manifest says {} chunks, artifacts hold {}",
                backup_dir.display(),
                manifest.chunk_count,
                state.chunk_count()
            )));
        }

        let name = manifest.namespace.clone();
        state.metadata.name = name.clone();
        {
            let mut registry = self.namespaces.write();
            if registry.contains_key(&name) && !overwrite {
                return Err(PalisadeError::namespace_exists(&name));
            }
            self.persist(&state)?;
            registry.insert(name.clone(), std::sync::Arc::new(parking_lot::RwLock::new(state)));
        }

        self.cache.invalidate_namespace(&name);
        info!(namespace = %name, backup_id = %manifest.backup_id, "restore complete");
        Ok(name)
    }

    /// Clone `src` into a new namespace `dst`.
    ///
    /// Content is copied verbatim, chunk ids included. The clone gets fresh
    /// metadata timestamps but inherits the source's description, tags,
    /// department, and contact.
    pub fn clone_namespace(&self, src: &str, dst: &str) -> Result<()> {
        super::validate_namespace_name(dst)?;
        let src_entry = self.entry(src)?;

        let mut registry = self.namespaces.write();
        if registry.contains_key(dst) {
            return Err(PalisadeError::namespace_exists(dst));
        }

        let mut cloned = src_entry.read().clone();
        let now = Utc::now();
        cloned.metadata.name = dst.to_string();
        cloned.metadata.created_at = now;
        cloned.metadata.last_updated = now;

        self.persist(&cloned)?;
        registry.insert(
            dst.to_string(),
            std::sync::Arc::new(parking_lot::RwLock::new(cloned)),
        );
        info!(src, dst, "cloned namespace");
        Ok(())
    }

    /// Migrate `src` into `dst`, consuming `src`.
    ///
    /// With `merge` unset this is a rename: `dst` must not exist and receives
    /// `src`'s content unchanged. With `merge` set, `dst` must already exist
    /// and `src`'s chunks are appended to it under freshly assigned ids, so
    /// ids stay unique within the merged namespace. Either way `src` is gone
    /// afterwards and cache entries for both names are invalidated.
    pub fn migrate(&self, src: &str, dst: &str, merge: bool) -> Result<usize> {
        if src == dst {
            return Err(PalisadeError::invalid_argument(
                "source and destination namespaces are the same",
            ));
        }
        super::validate_namespace_name(dst)?;

        let moved = {
            let mut registry = self.namespaces.write();
            if !registry.contains_key(src) {
                return Err(PalisadeError::namespace_not_found(src));
            }

            if merge {
                let dst_entry = registry
                    .get(dst)
                    .cloned()
                    .ok_or_else(|| PalisadeError::namespace_not_found(dst))?;
                let src_entry = registry
                    .get(src)
                    .cloned()
                    .ok_or_else(|| PalisadeError::namespace_not_found(src))?;

                let mut src_state = src_entry.write();
                let mut dst_state = dst_entry.write();
                let moved = self.merge_into(&src_state, &mut dst_state)?;
                dst_state.metadata.touch();
                self.persist(&dst_state)?;
                // The source is gone after the merge; tombstoning keeps a
                // writer holding a stale entry from re-persisting it once
                // its directory is removed below.
                src_state.tombstoned = true;
                drop(dst_state);
                drop(src_state);

                registry.remove(src);
                moved
            } else {
                if registry.contains_key(dst) {
                    return Err(PalisadeError::namespace_exists(dst));
                }
                let entry = registry
                    .get(src)
                    .cloned()
                    .ok_or_else(|| PalisadeError::namespace_not_found(src))?;
                let moved = {
                    let mut state = entry.write();
                    state.metadata.name = dst.to_string();
                    state.metadata.touch();
                    self.persist(&state)?;
                    state.chunk_count()
                };
                registry.remove(src);
                registry.insert(dst.to_string(), entry);
                moved
            }
        };

        if let Some(root) = self.root() {
            let src_dir = root.join(src);
            if src_dir.exists() {
                std::fs::remove_dir_all(&src_dir)?;
            }
        }
        self.cache.invalidate_namespace(src);
        self.cache.invalidate_namespace(dst);
        info!(src, dst, merge, moved, "migration complete");
        Ok(moved)
    }

    fn merge_into(&self, src: &NamespaceState, dst: &mut NamespaceState) -> Result<usize> {
        if src.vector.dimension() != dst.vector.dimension() {
            return Err(PalisadeError::dimension_mismatch(
                dst.vector.dimension(),
                src.vector.dimension(),
            ));
        }

        let mut src_ids: Vec<_> = src.chunks.keys().copied().collect();
        src_ids.sort_unstable();

        for old_id in src_ids {
            let chunk = &src.chunks[&old_id];
            let embedding = src.vector.get(old_id).cloned().ok_or_else(|| {
                PalisadeError::corrupt(format!(
                    "namespace {}: chunk {old_id} missing from vector index",
                    src.metadata.name
                ))
            })?;
            let terms = self.tokenizer.tokenize(&chunk.text)?;

            let new_id = dst.next_chunk_id;
            dst.vector.add(new_id, embedding)?;
            if let Err(e) = dst.sparse.add(new_id, &terms) {
                let _ = dst.vector.remove(new_id);
                return Err(e);
            }
            dst.chunks.insert(
                new_id,
                Chunk {
                    id: new_id,
                    text: chunk.text.clone(),
                    metadata: chunk.metadata.clone(),
                },
            );
            dst.next_chunk_id += 1;
        }
        Ok(src.chunks.len())
    }

    /// Estimate how much of `namespace_a`'s content is duplicated in
    /// `namespace_b`.
    ///
    /// Samples up to `sample_size` chunks from `namespace_a` and measures
    /// each one's nearest-neighbor similarity in `namespace_b`'s vector
    /// index. Both namespaces must be non-empty. Comparing a namespace with
    /// itself reports full overlap, since every chunk is its own nearest
    /// neighbor.
    pub fn overlap(
        &self,
        namespace_a: &str,
        namespace_b: &str,
        sample_size: usize,
    ) -> Result<OverlapReport> {
        if sample_size == 0 {
            return Err(PalisadeError::invalid_argument(
                "sample_size must be at least 1",
            ));
        }
        let entry_a = self.entry(namespace_a)?;
        let entry_b = self.entry(namespace_b)?;

        // A single namespace compared to itself takes one guard, so the
        // read lock is never acquired re-entrantly.
        let self_compare = namespace_a == namespace_b;
        let guard_a = entry_a.read();
        let guard_b = if self_compare {
            None
        } else {
            Some(entry_b.read())
        };
        let state_b: &NamespaceState = guard_b.as_deref().unwrap_or(&guard_a);

        if guard_a.chunk_count() == 0 {
            return Err(PalisadeError::invalid_argument(format!(
                "namespace {namespace_a} is empty"
            )));
        }
        if state_b.chunk_count() == 0 {
            return Err(PalisadeError::invalid_argument(format!(
                "namespace {namespace_b} is empty"
            )));
        }

        let mut ids: Vec<_> = guard_a.chunks.keys().copied().collect();
        ids.sort_unstable();
        let sampled = sample_size.min(ids.len());

        let mut rng = rand::rng();
        let picks = sample(&mut rng, ids.len(), sampled);

        let mut total = 0.0f32;
        let mut max_similarity = 0.0f32;
        let mut high_overlap_count = 0usize;
        for pick in picks {
            let id = ids[pick];
            let embedding = guard_a.vector.get(id).ok_or_else(|| {
                PalisadeError::corrupt(format!(
                    "namespace {namespace_a}: chunk {id} missing from vector index"
                ))
            })?;
            let nearest = state_b.vector.search(embedding, 1)?;
            let similarity = nearest
                .first()
                .map(|&(_, distance)| similarity_from_distance(distance))
                .unwrap_or(0.0);

            total += similarity;
            max_similarity = max_similarity.max(similarity);
            if similarity >= HIGH_OVERLAP_THRESHOLD {
                high_overlap_count += 1;
            }
        }

        Ok(OverlapReport {
            namespace_a: namespace_a.to_string(),
            namespace_b: namespace_b.to_string(),
            sampled,
            average_similarity: total / sampled as f32,
            max_similarity,
            high_overlap_count,
            high_overlap_percentage: 100.0 * high_overlap_count as f32 / sampled as f32,
        })
    }
}
