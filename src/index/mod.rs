pub mod meta;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
pub use meta::{Contig, IndexMeta};

/// A built GEM index on disk. Read-only for the rest of the run and shared by
/// reference across every mapping stage.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    path: PathBuf,
    meta: Option<IndexMeta>,
}

impl IndexHandle {
    /// Point at an existing index. Metadata is picked up from the sidecar when
    /// the index was built by this tool; a foreign index works without it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(PipelineError::missing("GEM index", path).into());
        }
        let side = IndexMeta::sidecar_path(&path);
        let meta = if side.is_file() { Some(IndexMeta::load_from_file(&side)?) } else { None };
        Ok(Self { path, meta })
    }

    pub(crate) fn with_meta(path: PathBuf, meta: IndexMeta) -> Self {
        Self { path, meta: Some(meta) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> Option<&IndexMeta> {
        self.meta.as_ref()
    }

    /// Whether `name` is a sequence of this index. Unknown (`None`) when the
    /// index carries no metadata.
    pub fn has_contig(&self, name: &str) -> Option<bool> {
        self.meta.as_ref().map(|m| m.contig(name).is_some())
    }

    pub fn contig_len(&self, name: &str) -> Option<u64> {
        self.meta.as_ref().and_then(|m| m.contig(name)).map(|c| c.len)
    }
}

impl std::fmt::Display for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
