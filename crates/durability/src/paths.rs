//! Data directory structure
//!
//! ```text
//! <data_dir>/
//! ├── CURRENT                 # name of the live snapshot directory
//! ├── snap-00000000000000000007/
//! │   ├── MANIFEST
//! │   ├── DOCUMENTS
//! │   ├── lex-000003.seg
//! │   └── vec-000004.seg
//! └── staging-<uuid>/         # in-progress persist, removed on open
//! ```

use std::path::{Path, PathBuf};

const SNAPSHOT_PREFIX: &str = "snap-";
const STAGING_PREFIX: &str = "staging-";

/// Paths inside a CTSE data directory
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    /// Paths rooted at `root`
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        StorePaths {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The CURRENT pointer file
    pub fn current(&self) -> PathBuf {
        self.root.join("CURRENT")
    }

    /// Directory of the snapshot for `generation`
    pub fn snapshot_dir(&self, generation: u64) -> PathBuf {
        self.root.join(snapshot_dir_name(generation))
    }

    /// A fresh staging directory
    pub fn new_staging_dir(&self) -> PathBuf {
        self.root
            .join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4()))
    }
}

/// `snap-<generation>`, zero padded so names sort by generation
pub fn snapshot_dir_name(generation: u64) -> String {
    format!("{}{:020}", SNAPSHOT_PREFIX, generation)
}

/// Generation encoded in a snapshot directory name
pub fn parse_snapshot_dir_name(name: &str) -> Option<u64> {
    name.strip_prefix(SNAPSHOT_PREFIX)?.parse().ok()
}

/// True for leftover staging directories
pub fn is_staging_dir_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

/// Manifest file inside a snapshot directory
pub fn manifest_file(dir: &Path) -> PathBuf {
    dir.join("MANIFEST")
}

/// Document catalog file inside a snapshot directory
pub fn documents_file(dir: &Path) -> PathBuf {
    dir.join("DOCUMENTS")
}

/// File name of a lexical segment
pub fn lexical_segment_name(segment_id: u64) -> String {
    format!("lex-{:06}.seg", segment_id)
}

/// File name of a vector segment
pub fn vector_segment_name(segment_id: u64) -> String {
    format!("vec-{:06}.seg", segment_id)
}
