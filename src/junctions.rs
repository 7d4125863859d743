use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Write};
use std::path::Path;

use crate::error::PipelineError;
use crate::index::IndexHandle;
use crate::io::{self, gtf::GtfReader};

/// 剪接位点的一侧（1-based 坐标）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Site {
    pub chr: String,
    pub strand: char,
    pub pos: u64,
}

impl Site {
    pub fn new(chr: impl Into<String>, strand: char, pos: u64) -> Self {
        Self { chr: chr.into(), strand, pos }
    }
}

/// donor/acceptor 位点对。相等性覆盖两侧位点，因此集合中每个剪接事件只出现一次。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Junction {
    pub donor: Site,
    pub acceptor: Site,
}

impl Junction {
    pub fn new(donor: Site, acceptor: Site) -> Self {
        Self { donor, acceptor }
    }

    /// 两个位点之间的基因组距离；跨染色体时为 `None`。
    pub fn distance(&self) -> Option<u64> {
        if self.donor.chr != self.acceptor.chr {
            return None;
        }
        Some(self.donor.pos.abs_diff(self.acceptor.pos))
    }

    /// 解析 GEM junctions 文件的一行：`chr strand pos chr strand pos`。
    pub fn parse(line: &str) -> Result<Self> {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != 6 {
            return Err(anyhow!("expected 6 tab-separated columns, found {}", cols.len()));
        }
        let site = |chr: &str, strand: &str, pos: &str| -> Result<Site> {
            let strand = match strand {
                "+" => '+',
                "-" => '-',
                other => return Err(anyhow!("invalid strand '{}'", other)),
            };
            let pos = pos.parse().map_err(|_| anyhow!("invalid position '{}'", pos))?;
            Ok(Site::new(chr, strand, pos))
        };
        Ok(Junction::new(site(cols[0], cols[1], cols[2])?, site(cols[3], cols[4], cols[5])?))
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.donor.chr, self.donor.strand, self.donor.pos, self.acceptor.chr, self.acceptor.strand, self.acceptor.pos
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JunctionSet {
    set: BTreeSet<Junction>,
}

impl JunctionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, j: Junction) -> bool {
        self.set.insert(j)
    }

    pub fn contains(&self, j: &Junction) -> bool {
        self.set.contains(j)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Junction> {
        self.set.iter()
    }

    /// 与 `other` 取并集。
    pub fn merge(&mut self, other: &JunctionSet) {
        self.set.extend(other.set.iter().cloned());
    }

    /// 同一染色体上两位点距离不超过 `max_distance` 的 junction。
    pub fn filter_by_distance(&self, max_distance: u64) -> JunctionSet {
        self.set.iter().filter(|j| j.distance().is_some_and(|d| d <= max_distance)).cloned().collect()
    }

    /// GTF 中每个转录本相邻 exon 之间的内含子。
    pub fn from_gtf(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::missing("annotation", path).into());
        }
        Self::from_gtf_reader(io::open_reader(path)?)
            .with_context(|| format!("cannot read annotation '{}'", path.display()))
    }

    pub fn from_gtf_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut gtf = GtfReader::new(reader);
        let mut transcripts: HashMap<(String, char, String), Vec<(u64, u64)>> = HashMap::new();
        loop {
            let exon = match gtf.next_exon() {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(e) => return Err(e.context(format!("line {}", gtf.line()))),
            };
            transcripts
                .entry((exon.seqname, exon.strand, exon.transcript_id))
                .or_default()
                .push((exon.start, exon.end));
        }

        let mut out = JunctionSet::new();
        for ((chr, strand, _), mut exons) in transcripts {
            exons.sort_unstable();
            for pair in exons.windows(2) {
                let (prev_end, next_start) = (pair[0].1, pair[1].0);
                // overlapping or touching exons have no intron between them
                if next_start <= prev_end.saturating_add(1) {
                    continue;
                }
                let (donor, acceptor) = if strand == '-' { (next_start, prev_end) } else { (prev_end, next_start) };
                out.insert(Junction::new(Site::new(chr.as_str(), strand, donor), Site::new(chr.as_str(), strand, acceptor)));
            }
        }
        Ok(out)
    }

    /// 读取 GEM junctions 文件。
    pub fn read(path: &Path) -> Result<Self> {
        let reader = io::open_reader(path)?;
        let mut out = JunctionSet::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let j = Junction::parse(line).map_err(|e| PipelineError::Format {
                path: path.to_path_buf(),
                line: i + 1,
                message: e.to_string(),
            })?;
            out.insert(j);
        }
        Ok(out)
    }

    /// 以 GEM junctions 格式落盘，返回写出的条数。
    /// 索引中不存在的序列、或超出序列末端的位点会被跳过。
    pub fn write(&self, path: &Path, index: &IndexHandle) -> Result<usize> {
        let fits = |s: &Site| match index.contig_len(&s.chr) {
            Some(len) => s.pos >= 1 && s.pos <= len,
            None => index.has_contig(&s.chr) != Some(false),
        };
        let mut out = io::create_writer(path)?;
        let mut written = 0usize;
        for j in self.set.iter().filter(|j| fits(&j.donor) && fits(&j.acceptor)) {
            j.write_to(&mut out)?;
            written += 1;
        }
        out.flush()?;
        let dropped = self.len() - written;
        if dropped > 0 {
            log::warn!("{} junctions outside the sequences of index {} were dropped", dropped, index);
        }
        Ok(written)
    }
}

impl FromIterator<Junction> for JunctionSet {
    fn from_iter<I: IntoIterator<Item = Junction>>(iter: I) -> Self {
        Self { set: iter.into_iter().collect() }
    }
}

impl Extend<Junction> for JunctionSet {
    fn extend<I: IntoIterator<Item = Junction>>(&mut self, iter: I) {
        self.set.extend(iter);
    }
}

impl IntoIterator for JunctionSet {
    type Item = Junction;
    type IntoIter = std::collections::btree_set::IntoIter<Junction>;

    fn into_iter(self) -> Self::IntoIter {
        self.set.into_iter()
    }
}
