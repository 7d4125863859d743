use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::io::{self, fasta::FastaScanner};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub len: u64,
}

/// 索引构建元信息：参考序列文件、contig 列表、构建参数和时间。
/// 以 bincode 格式保存在索引旁边（`<index>.meta`）。
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub contigs: Vec<Contig>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

impl IndexMeta {
    pub fn sidecar_path(index: &Path) -> PathBuf {
        let mut s = index.as_os_str().to_os_string();
        s.push(".meta");
        PathBuf::from(s)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let mut f = io::create_writer(path)?;
        bincode::serialize_into(&mut f, self)
            .with_context(|| format!("cannot write index metadata '{}'", path.display()))?;
        f.flush()?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let f = io::open_reader(path)?;
        let meta: Self = bincode::deserialize_from(f)
            .with_context(|| format!("corrupt index metadata '{}'", path.display()))?;
        Ok(meta)
    }

    pub fn contig(&self, name: &str) -> Option<&Contig> {
        self.contigs.iter().find(|c| c.name == name)
    }
}

/// Scan a reference FASTA and list its contigs.
///
/// Fails when the file holds no sequence or only empty ones; the indexer
/// would otherwise produce an index nothing can map to.
pub fn scan_reference(reference: &Path) -> Result<Vec<Contig>> {
    let mut scanner = FastaScanner::new(io::open_reader(reference)?);
    let mut contigs = Vec::new();
    let mut ambiguous = 0u64;
    while let Some(entry) = scanner.next_entry()? {
        ambiguous += entry.ambiguous;
        contigs.push(Contig { name: entry.id, len: entry.len });
    }

    if contigs.is_empty() {
        anyhow::bail!("FASTA file '{}' contains no sequences", reference.display());
    }
    let total: u64 = contigs.iter().map(|c| c.len).sum();
    if total == 0 {
        anyhow::bail!("FASTA file '{}' contains only empty sequences", reference.display());
    }
    log::info!(
        "reference {}: {} sequences, {} bases ({} ambiguous)",
        reference.display(),
        contigs.len(),
        total,
        ambiguous
    );
    Ok(contigs)
}
