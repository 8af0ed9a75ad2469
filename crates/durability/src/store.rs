//! Index Store
//!
//! Owns the published snapshot pointer and the on-disk snapshot directories.
//!
//! ## Swap
//!
//! Readers call `snapshot()` and get an `Arc<IndexSnapshot>`; the read lock
//! is held only for the `Arc` clone. Writers serialize on a single commit
//! lock (`begin_write`) and install the next snapshot with one pointer swap,
//! so a reader sees either the old or the new snapshot in full.
//!
//! ## Crash Safety
//!
//! `persist` follows this pattern:
//! 1. Write every file into a fresh `staging-<uuid>/` directory, fsync each
//! 2. fsync the staging directory
//! 3. Rename it to `snap-<generation>/`, fsync the data directory
//! 4. Atomically replace `CURRENT` (temp + fsync + rename)
//! 5. Remove older snapshot directories
//!
//! `load` only follows `CURRENT`, so a crash before step 4 leaves the previous
//! snapshot live and the partial directory is removed on the next open.

use crate::manifest::IndexManifest;
use crate::paths::{self, StorePaths};
use crate::snapshot::{self, IndexSnapshot};
use ctse_core::codec;
use ctse_core::{AnnConfig, CtseError, CtseResult};
use ctse_search::LexicalSegment;
use ctse_vector::VectorSegment;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a `persist` call wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Persisted generation
    pub generation: u64,
    /// Snapshot directory now named by `CURRENT`
    pub directory: PathBuf,
    /// Segment files encoded and written
    pub segments_written: usize,
    /// Segment files reused from the previous snapshot directory
    pub segments_linked: usize,
}

/// Single-writer, multi-reader owner of the published index snapshot
pub struct IndexStore {
    paths: Option<StorePaths>,
    dimension: usize,
    params: AnnConfig,
    current: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
    /// Last generation known to be on disk; also serializes `persist`
    persisted: Mutex<Option<u64>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("data_dir", &self.data_dir())
            .field("dimension", &self.dimension)
            .field("generation", &self.current.read().generation())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl IndexStore {
    /// Store with no backing directory; `persist` is a no-op.
    pub fn in_memory(dimension: usize, params: AnnConfig) -> Self {
        IndexStore {
            paths: None,
            dimension,
            params,
            current: RwLock::new(Arc::new(IndexSnapshot::empty(dimension, params))),
            writer: Mutex::new(()),
            persisted: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Open (or create) a data directory and publish its current snapshot.
    ///
    /// Leftover staging directories and unreferenced snapshot directories
    /// are removed. A snapshot written with another embedding dimension is
    /// loaded lexical-only: every vector is dropped and every document is
    /// marked as missing its vector.
    pub fn open(dir: impl AsRef<Path>, dimension: usize, params: AnnConfig) -> CtseResult<Self> {
        let store_paths = StorePaths::from_root(dir);
        std::fs::create_dir_all(store_paths.root())?;
        let current_gen = read_current(&store_paths)?.map(|(generation, _)| generation);
        cleanup(&store_paths, current_gen);

        let mut store = IndexStore::in_memory(dimension, params);
        store.paths = Some(store_paths);

        if let Some(loaded) = store.load()? {
            let generation = loaded.generation();
            let docs = loaded.len();
            let loaded_dim = loaded.vectors().dimension();
            let snapshot = if loaded_dim != dimension {
                warn!(
                    target: "ctse::store",
                    persisted = loaded_dim,
                    configured = dimension,
                    "Embedding dimension changed, dropping vector index"
                );
                loaded.reset_vectors(
                    dimension,
                    params,
                    &format!("embedding dimension changed from {} to {}", loaded_dim, dimension),
                )
            } else {
                loaded
            };
            info!(
                target: "ctse::store",
                generation,
                documents = docs,
                missing_vectors = snapshot.missing_vector_count(),
                "Index snapshot loaded"
            );
            *store.persisted.get_mut() = Some(generation);
            *store.current.get_mut() = Arc::new(snapshot);
        } else {
            info!(target: "ctse::store", dir = %store.root_display(), "Opened empty index store");
        }
        Ok(store)
    }

    fn root_display(&self) -> String {
        self.data_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }

    /// Backing directory, if any
    pub fn data_dir(&self) -> Option<&Path> {
        self.paths.as_ref().map(|p| p.root())
    }

    /// Configured embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Graph parameters for new vector segments
    pub fn ann_params(&self) -> AnnConfig {
        self.params
    }

    /// True after `close`
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop serving snapshots. In-flight readers keep theirs.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!(target: "ctse::store", "Index store closed");
    }

    fn ensure_open(&self) -> CtseResult<()> {
        if self.is_closed() {
            Err(CtseError::IndexUnavailable("index store is closed".to_string()))
        } else {
            Ok(())
        }
    }

    /// The currently published snapshot
    ///
    /// # Errors
    ///
    /// `IndexUnavailable` once the store is closed.
    pub fn snapshot(&self) -> CtseResult<Arc<IndexSnapshot>> {
        self.ensure_open()?;
        Ok(Arc::clone(&self.current.read()))
    }

    /// Take the commit lock. The guard's base is the snapshot to build on.
    pub fn begin_write(&self) -> CtseResult<WriteGuard<'_>> {
        let lock = self.writer.lock();
        self.ensure_open()?;
        let base = Arc::clone(&self.current.read());
        Ok(WriteGuard {
            store: self,
            _lock: lock,
            base,
        })
    }

    /// Atomically publish `next`.
    ///
    /// # Errors
    ///
    /// `IndexUnavailable` if the store is closed or `next` is not newer than
    /// the published snapshot.
    pub fn swap(&self, next: IndexSnapshot) -> CtseResult<Arc<IndexSnapshot>> {
        let _lock = self.writer.lock();
        self.swap_locked(next)
    }

    fn swap_locked(&self, next: IndexSnapshot) -> CtseResult<Arc<IndexSnapshot>> {
        self.ensure_open()?;
        let next = Arc::new(next);
        let mut current = self.current.write();
        if next.generation() <= current.generation() {
            return Err(CtseError::IndexUnavailable(format!(
                "snapshot generation {} is not newer than published generation {}",
                next.generation(),
                current.generation()
            )));
        }
        debug!(
            target: "ctse::store",
            from = current.generation(),
            to = next.generation(),
            documents = next.len(),
            "Snapshot swapped"
        );
        *current = Arc::clone(&next);
        Ok(next)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Persist the published snapshot.
    pub fn persist_current(&self) -> CtseResult<Option<PersistOutcome>> {
        let snapshot = self.snapshot()?;
        self.persist(&snapshot)
    }

    /// Durably write `snapshot` and point `CURRENT` at it.
    ///
    /// Returns `None` for in-memory stores and when the generation (or a
    /// newer one) is already on disk.
    pub fn persist(&self, snapshot: &IndexSnapshot) -> CtseResult<Option<PersistOutcome>> {
        self.ensure_open()?;
        let Some(store_paths) = &self.paths else {
            return Ok(None);
        };
        let mut persisted = self.persisted.lock();
        if (*persisted).is_some_and(|g| g >= snapshot.generation()) {
            debug!(
                target: "ctse::store",
                generation = snapshot.generation(),
                "Snapshot already persisted"
            );
            return Ok(None);
        }
        let previous_dir = (*persisted).map(|g| store_paths.snapshot_dir(g));

        let staging = store_paths.new_staging_dir();
        std::fs::create_dir(&staging)?;
        let written = write_snapshot_files(&staging, snapshot, previous_dir.as_deref());
        let (segments_written, segments_linked) = match written {
            Ok(counts) => counts,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e);
            }
        };
        codec::sync_dir(&staging)?;

        let generation = snapshot.generation();
        let final_dir = store_paths.snapshot_dir(generation);
        if final_dir.exists() {
            std::fs::remove_dir_all(&final_dir)?;
        }
        std::fs::rename(&staging, &final_dir)?;
        codec::sync_dir(store_paths.root())?;

        let pointer = format!("{}\n", paths::snapshot_dir_name(generation));
        codec::write_atomic(&store_paths.current(), pointer.as_bytes())?;
        *persisted = Some(generation);

        cleanup(store_paths, Some(generation));
        info!(
            target: "ctse::store",
            generation,
            documents = snapshot.len(),
            segments_written,
            segments_linked,
            "Index snapshot persisted"
        );
        Ok(Some(PersistOutcome {
            generation,
            directory: final_dir,
            segments_written,
            segments_linked,
        }))
    }

    /// Read the snapshot named by `CURRENT`.
    ///
    /// Returns `None` for in-memory stores and empty directories.
    ///
    /// # Errors
    ///
    /// `Corruption` if `CURRENT` names a missing or inconsistent snapshot.
    pub fn load(&self) -> CtseResult<Option<IndexSnapshot>> {
        let Some(store_paths) = &self.paths else {
            return Ok(None);
        };
        let Some((_, dir)) = read_current(store_paths)? else {
            return Ok(None);
        };
        load_snapshot_dir(&dir, self.params).map(Some)
    }
}

/// Exclusive right to commit the next snapshot
pub struct WriteGuard<'a> {
    store: &'a IndexStore,
    _lock: MutexGuard<'a, ()>,
    base: Arc<IndexSnapshot>,
}

impl WriteGuard<'_> {
    /// Snapshot published when the guard was taken
    pub fn base(&self) -> &Arc<IndexSnapshot> {
        &self.base
    }

    /// Publish `next` and release the commit lock.
    pub fn commit(self, next: IndexSnapshot) -> CtseResult<Arc<IndexSnapshot>> {
        self.store.swap_locked(next)
    }
}

// ============================================================================
// Directory Helpers
// ============================================================================

/// `(generation, directory)` named by `CURRENT`
fn read_current(store_paths: &StorePaths) -> CtseResult<Option<(u64, PathBuf)>> {
    let pointer = store_paths.current();
    if !pointer.exists() {
        return Ok(None);
    }
    let name = std::fs::read_to_string(&pointer)?;
    let name = name.trim();
    let generation = paths::parse_snapshot_dir_name(name).ok_or_else(|| {
        CtseError::Corruption(format!("CURRENT holds an invalid snapshot name {:?}", name))
    })?;
    let dir = store_paths.root().join(name);
    if !dir.is_dir() {
        return Err(CtseError::Corruption(format!(
            "CURRENT names missing snapshot directory {}",
            dir.display()
        )));
    }
    Ok(Some((generation, dir)))
}

/// Remove staging directories and snapshot directories other than `keep`.
fn cleanup(store_paths: &StorePaths, keep: Option<u64>) {
    let Ok(entries) = std::fs::read_dir(store_paths.root()) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let stale = if paths::is_staging_dir_name(&name) {
            warn!(target: "ctse::store", dir = %name, "Removing incomplete staging directory");
            true
        } else {
            matches!(paths::parse_snapshot_dir_name(&name), Some(g) if Some(g) != keep)
        };
        if stale {
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                warn!(target: "ctse::store", dir = %name, error = %e, "Failed to remove directory");
            }
        }
    }
}

/// Write all files of `snapshot` into `dir`; returns `(written, linked)`.
fn write_snapshot_files(
    dir: &Path,
    snapshot: &IndexSnapshot,
    previous_dir: Option<&Path>,
) -> CtseResult<(usize, usize)> {
    let mut written = 0;
    let mut linked = 0;
    for segment in snapshot.lexical().segments() {
        let name = paths::lexical_segment_name(segment.segment_id());
        if reuse_file(previous_dir, &name, dir) {
            linked += 1;
        } else {
            segment.write_to_file(&dir.join(&name))?;
            written += 1;
        }
    }
    for segment in snapshot.vectors().segments() {
        let name = paths::vector_segment_name(segment.segment_id());
        if reuse_file(previous_dir, &name, dir) {
            linked += 1;
        } else {
            segment.write_to_file(&dir.join(&name))?;
            written += 1;
        }
    }
    snapshot::write_documents(&paths::documents_file(dir), snapshot.catalog())?;
    snapshot.manifest()?.write_to_file(&paths::manifest_file(dir))?;
    Ok((written, linked))
}

/// Hard-link (or copy) an immutable segment file from the previous snapshot.
fn reuse_file(previous_dir: Option<&Path>, name: &str, dir: &Path) -> bool {
    let Some(previous) = previous_dir else {
        return false;
    };
    let source = previous.join(name);
    if !source.is_file() {
        return false;
    }
    let target = dir.join(name);
    std::fs::hard_link(&source, &target).is_ok() || std::fs::copy(&source, &target).is_ok()
}

fn load_snapshot_dir(dir: &Path, params: AnnConfig) -> CtseResult<IndexSnapshot> {
    let manifest = IndexManifest::read_from_file(&paths::manifest_file(dir))?;
    let documents = snapshot::read_documents(&paths::documents_file(dir))?;

    let mut lexical = Vec::with_capacity(manifest.lexical_segments.len());
    for desc in &manifest.lexical_segments {
        let segment = LexicalSegment::read_from_file(&dir.join(&desc.file))?;
        if segment.segment_id() != desc.segment_id {
            return Err(CtseError::Corruption(format!(
                "{} holds segment {}",
                desc.file,
                segment.segment_id()
            )));
        }
        lexical.push(Arc::new(segment));
    }
    let mut vectors = Vec::with_capacity(manifest.vector_segments.len());
    for desc in &manifest.vector_segments {
        let segment = VectorSegment::read_from_file(&dir.join(&desc.file))?;
        if segment.segment_id() != desc.segment_id {
            return Err(CtseError::Corruption(format!(
                "{} holds segment {}",
                desc.file,
                segment.segment_id()
            )));
        }
        vectors.push(Arc::new(segment));
    }
    IndexSnapshot::from_persisted(&manifest, documents, lexical, vectors, params)
}
