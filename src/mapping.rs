//! 比对结果与读段集合。
//!
//! [`MappingFile`] 是落盘的比对结果：每次调用 [`MappingFile::records`] 都会重新
//! 打开文件，得到一个新的单遍迭代器，因此同一结果可以被多个后续阶段重复消费。
//! [`ReadSet`] 描述阶段的输入读段：原始 FASTQ、两端交错合并，或者某个比对结果
//! 中未比对上的子集。

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::io::{self, fastq, fastq::FastqReader, fastq::FastqRecord, map::MapReader, map::MapRecord};

/// 比对前从读段两端去掉的碱基数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trim {
    pub left: usize,
    pub right: usize,
}

impl Trim {
    pub fn new(left: usize, right: usize) -> Self {
        Self { left, right }
    }

    pub fn is_noop(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// 以 GEM `.map` 文件落盘的比对结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingFile {
    path: PathBuf,
    trim: Option<Trim>,
}

impl MappingFile {
    /// 指向此前产出的结果，例如续跑时。
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(PipelineError::missing("mapping", path).into());
        }
        Ok(Self { path, trim: None })
    }

    pub(crate) fn produced(path: PathBuf, trim: Option<Trim>) -> Self {
        Self { path, trim: trim.filter(|t| !t.is_noop()) }
    }

    /// 标记该结果来自按 `trim` 截短的读段。
    pub fn with_trim(mut self, trim: Trim) -> Self {
        self.trim = Some(trim).filter(|t| !t.is_noop());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn trim(&self) -> Option<Trim> {
        self.trim
    }

    /// 从文件开头重新打开的单遍迭代器。
    pub fn records(&self) -> Result<MapRecords> {
        MapRecords::open(&self.path)
    }

    /// 该结果中未比对读段的过滤视图。
    pub fn unmapped(&self) -> ReadSet {
        ReadSet::Unmapped(self.clone())
    }
}

pub struct MapRecords {
    path: PathBuf,
    reader: MapReader<BufReader<File>>,
}

impl MapRecords {
    fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::missing("mapping", path).into());
        }
        Ok(Self { path: path.to_path_buf(), reader: MapReader::new(io::open_reader(path)?) })
    }
}

impl Iterator for MapRecords {
    type Item = Result<MapRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next_record() {
            Ok(rec) => rec.map(Ok),
            Err(e) => Some(Err(PipelineError::Format {
                path: self.path.clone(),
                line: self.reader.line(),
                message: e.to_string(),
            }
            .into())),
        }
    }
}

/// 阶段的输入读段。
#[derive(Debug, Clone)]
pub enum ReadSet {
    /// Plain FASTQ, single-end or already interleaved pairs.
    Fastq(PathBuf),
    /// Two mate files merged record by record.
    Interleave(PathBuf, PathBuf),
    /// Reads without alignment in a mapping result.
    Unmapped(MappingFile),
}

/// 读段集合写成工具输入文件的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub path: PathBuf,
    /// 写出了新的派生文件为 `true`，直接透传为 `false`
    pub derived: bool,
    pub reads: Option<u64>,
    pub skipped: u64,
}

impl ReadSet {
    pub fn fastq(path: impl Into<PathBuf>) -> Self {
        ReadSet::Fastq(path.into())
    }

    pub fn interleave(first: impl Into<PathBuf>, second: impl Into<PathBuf>) -> Self {
        ReadSet::Interleave(first.into(), second.into())
    }

    /// 底层文件缺失时返回 `MissingInput`。
    pub fn check_exists(&self) -> Result<()> {
        let paths: Vec<&Path> = match self {
            ReadSet::Fastq(p) => vec![p.as_path()],
            ReadSet::Interleave(a, b) => vec![a.as_path(), b.as_path()],
            ReadSet::Unmapped(m) => vec![m.path()],
        };
        for p in paths {
            if !p.is_file() {
                return Err(PipelineError::missing("read set", p).into());
            }
        }
        Ok(())
    }

    /// 惰性地逐条读出读段。
    pub fn reads(&self) -> Result<Box<dyn Iterator<Item = Result<FastqRecord>>>> {
        self.check_exists()?;
        let reads: Box<dyn Iterator<Item = Result<FastqRecord>>> = match self {
            ReadSet::Fastq(p) => Box::new(FastqReader::new(io::open_reader(p)?)),
            ReadSet::Interleave(a, b) => Box::new(Interleaved {
                first: FastqReader::new(io::open_reader(a)?),
                second: FastqReader::new(io::open_reader(b)?),
                pending: None,
            }),
            ReadSet::Unmapped(m) => Box::new(m.records()?.filter_map(|r| match r {
                Ok(rec) if rec.is_mapped() => None,
                Ok(rec) => Some(Ok(rec.to_fastq())),
                Err(e) => Some(Err(e)),
            })),
        };
        Ok(reads)
    }

    /// 将工具应看到的读段写到 `derived`，并应用 `trim`。
    ///
    /// 无需 trim 的普通 FASTQ 直接透传。
    pub fn materialize(&self, derived: &Path, trim: Option<Trim>) -> Result<Materialized> {
        let trim = trim.filter(|t| !t.is_noop());
        if let (ReadSet::Fastq(p), None) = (self, trim) {
            self.check_exists()?;
            return Ok(Materialized { path: p.clone(), derived: false, reads: None, skipped: 0 });
        }

        let mut out = io::create_writer(derived)?;
        let mut reads = 0u64;
        let mut skipped = 0u64;
        for rec in self.reads()? {
            let rec = rec?;
            let rec = match trim {
                Some(t) => match rec.trimmed(t.left, t.right) {
                    Some(r) => r,
                    None => {
                        skipped += 1;
                        continue;
                    }
                },
                None => rec,
            };
            fastq::write_record(&mut out, &rec)?;
            reads += 1;
        }
        out.flush()?;
        if skipped > 0 {
            log::warn!("{}: {} reads too short to trim were left out", derived.display(), skipped);
        }
        Ok(Materialized { path: derived.to_path_buf(), derived: true, reads: Some(reads), skipped })
    }
}

struct Interleaved<R: std::io::BufRead> {
    first: FastqReader<R>,
    second: FastqReader<R>,
    pending: Option<FastqRecord>,
}

impl<R: std::io::BufRead> Iterator for Interleaved<R> {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(mate) = self.pending.take() {
            return Some(Ok(mate));
        }
        match (self.first.next_record(), self.second.next_record()) {
            (Ok(Some(a)), Ok(Some(b))) => {
                self.pending = Some(b);
                Some(Ok(a))
            }
            (Ok(None), Ok(None)) => None,
            (Ok(_), Ok(_)) => Some(Err(anyhow!("mate files hold a different number of reads"))),
            (Err(e), _) | (_, Err(e)) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    const MAP: &str = "r1\tACGTACGT\tIIIIIIII\t0:1\tchr21:+:10:8\n\
r2\tTTTTGGGG\tIIIIIIII\t0:0\t-\n\
r3\tCCCCAAAA\t0\t-\n";

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn records_reopen_from_the_start() {
        let dir = TempDir::new().unwrap();
        let m = MappingFile::open(write(&dir, "a.map", MAP)).unwrap();
        let first: Vec<_> = m.records().unwrap().map(|r| r.unwrap().id).collect();
        let again: Vec<_> = m.records().unwrap().map(|r| r.unwrap().id).collect();
        assert_eq!(first, vec!["r1", "r2", "r3"]);
        assert_eq!(first, again);
    }

    #[test]
    fn unmapped_filter_selects_reads_without_alignment() {
        let dir = TempDir::new().unwrap();
        let m = MappingFile::open(write(&dir, "a.map", MAP)).unwrap();
        let ids: BTreeSet<String> = m.unmapped().reads().unwrap().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, ["r2", "r3"].iter().map(|s| s.to_string()).collect::<BTreeSet<String>>());
    }

    #[test]
    fn format_errors_carry_path_and_line() {
        let dir = TempDir::new().unwrap();
        let m = MappingFile::open(write(&dir, "bad.map", "r1\tACGT\tIIII\t0\t-\nbroken\n")).unwrap();
        let err = m.records().unwrap().nth(1).unwrap().unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::Format { line, .. }) => assert_eq!(*line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn materialize_passes_plain_fastq_through() {
        let dir = TempDir::new().unwrap();
        let fq = write(&dir, "reads.fastq", "@r1\nACGT\n+\nIIII\n");
        let out = dir.path().join("derived.fastq");
        let m = ReadSet::fastq(&fq).materialize(&out, None).unwrap();
        assert!(!m.derived);
        assert_eq!(m.path, fq);
        assert!(!out.exists());
    }

    #[test]
    fn materialize_trims_and_skips_short_reads() {
        let dir = TempDir::new().unwrap();
        let m = MappingFile::open(write(&dir, "a.map", "r1\tACGTACGT\tABCDEFGH\t0\t-\nr2\tAC\tII\t0\t-\n")).unwrap();
        let out = dir.path().join("trim.fastq");
        let done = m.unmapped().materialize(&out, Some(Trim::new(0, 3))).unwrap();
        assert!(done.derived);
        assert_eq!(done.reads, Some(1));
        assert_eq!(done.skipped, 1);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "@r1\nACGTA\n+\nABCDE\n");
    }

    #[test]
    fn interleave_alternates_mates() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "1.fastq", "@p1/1\nAC\n+\nII\n@p2/1\nGG\n+\nII\n");
        let b = write(&dir, "2.fastq", "@p1/2\nTT\n+\nII\n@p2/2\nCC\n+\nII\n");
        let ids: Vec<_> = ReadSet::interleave(&a, &b).reads().unwrap().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec!["p1/1", "p1/2", "p2/1", "p2/2"]);

        let short = write(&dir, "3.fastq", "@p1/2\nTT\n+\nII\n");
        let res: Result<Vec<_>> = ReadSet::interleave(&a, &short).reads().unwrap().collect();
        assert!(res.is_err());
    }

    #[test]
    fn missing_read_set_is_reported() {
        let err = ReadSet::fastq("/nonexistent/reads.fastq").check_exists().unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::MissingInput { .. })));
    }
}
