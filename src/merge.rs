use anyhow::Result;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::io::{self, map::MapRecord};
use crate::mapping::{MappingFile, Trim};

/// 一次合并的计数。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub reads: u64,
    pub mapped_in_primary: u64,
    /// 主结果中未比对、由补充结果补上的读段数
    pub rescued: u64,
    pub unmapped: u64,
}

/// 将主比对结果与后续轮次的结果合并。
///
/// - 输出的读段集合与顺序完全由主结果决定；
/// - 补充结果只为主结果中未比对的读段提供比对，按给定顺序第一个比对上的补充结果生效；
/// - 补充记录按 (id, 序列) 认领主结果中的读段：共享 id 的两个 mate 靠序列区分，
///   trim 过的补充结果先按其 trim 截取主结果序列再比较；
/// - 补充结果中有主结果不包含的读段时合并失败。
pub struct Merger {
    primary: MappingFile,
    supplements: Vec<MappingFile>,
}

struct Candidate {
    record: MapRecord,
    source: usize,
    claimed: bool,
}

impl Merger {
    pub fn new(primary: MappingFile) -> Self {
        Self { primary, supplements: Vec::new() }
    }

    pub fn with(mut self, supplement: MappingFile) -> Self {
        self.supplements.push(supplement);
        self
    }

    pub fn with_all(mut self, supplements: impl IntoIterator<Item = MappingFile>) -> Self {
        self.supplements.extend(supplements);
        self
    }

    pub fn merge(&self, out_path: &Path) -> Result<(MappingFile, MergeStats)> {
        let mut candidates = self.collect_candidates()?;

        let mut out = io::create_writer(out_path)?;
        let mut stats = MergeStats::default();
        for rec in self.primary.records()? {
            let mut rec = rec?;
            stats.reads += 1;
            let alt = match candidates.get_mut(&rec.id) {
                Some(group) => self.claim(group, &rec),
                None => None,
            };
            if rec.is_mapped() {
                stats.mapped_in_primary += 1;
            } else if let Some((mut alt, source)) = alt {
                if let Some(t) = self.supplements[source].trim() {
                    alt.pad_trimmed(t.left, t.right);
                }
                rec.counters = alt.counters;
                rec.mappings = alt.mappings;
                stats.rescued += 1;
            } else {
                stats.unmapped += 1;
            }
            rec.write_to(&mut out)?;
        }
        out.flush()?;

        let stray = candidates
            .into_iter()
            .find_map(|(read, group)| group.iter().find(|c| !c.claimed).map(|c| (read, c.source)));
        if let Some((read, source)) = stray {
            return Err(PipelineError::MergeUniverse {
                read,
                supplement: self.supplements[source].path().to_path_buf(),
            }
            .into());
        }

        log::info!(
            "merged {} reads into {}: {} mapped initially, {} rescued, {} unmapped",
            stats.reads,
            out_path.display(),
            stats.mapped_in_primary,
            stats.rescued,
            stats.unmapped
        );
        Ok((MappingFile::produced(PathBuf::from(out_path), None), stats))
    }

    /// 每个补充结果最多认领一条与 `primary` 同 id 且序列一致的记录；
    /// 返回第一条比对上的记录及其来源（仅当 `primary` 未比对时）。
    fn claim(&self, group: &mut [Candidate], primary: &MapRecord) -> Option<(MapRecord, usize)> {
        let mut alt = None;
        for (source, sup) in self.supplements.iter().enumerate() {
            let trim = sup.trim();
            let Some(c) = group.iter_mut().find(|c| !c.claimed && c.source == source && same_read(primary, &c.record, trim))
            else {
                continue;
            };
            c.claimed = true;
            if alt.is_none() && !primary.is_mapped() && c.record.is_mapped() {
                alt = Some((c.record.clone(), source));
            }
        }
        alt
    }

    /// 按 id 分组收集所有补充记录，组内保持文件顺序。
    fn collect_candidates(&self) -> Result<HashMap<String, Vec<Candidate>>> {
        let mut candidates: HashMap<String, Vec<Candidate>> = HashMap::new();
        for (source, sup) in self.supplements.iter().enumerate() {
            for rec in sup.records()? {
                let rec = rec?;
                candidates.entry(rec.id.clone()).or_default().push(Candidate { record: rec, source, claimed: false });
            }
        }
        Ok(candidates)
    }
}

/// `supplement` 是否是 `primary` 这条读段（可能经过 `trim` 截短）的比对记录。
fn same_read(primary: &MapRecord, supplement: &MapRecord, trim: Option<Trim>) -> bool {
    let (left, right) = trim.map_or((0, 0), |t| (t.left, t.right));
    let end = primary.sequence.len().saturating_sub(right);
    left <= end && primary.sequence.get(left..end) == Some(supplement.sequence.as_str())
}
