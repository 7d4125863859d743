//! GEM `.map` text records.
//!
//! Each line is `id \t sequence \t quality \t counters \t mappings`; the quality
//! column is absent when the mapper ran with qualities ignored. A read with no
//! alignment carries `-` in the mapping column.

use anyhow::{anyhow, Result};
use std::io::{BufRead, Write};

use crate::io::fastq::FastqRecord;

pub const NO_MAPPING: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRecord {
    pub id: String,
    pub sequence: String,
    pub quality: Option<String>,
    pub counters: String,
    pub mappings: String,
}

impl MapRecord {
    pub fn parse(line: &str) -> Result<Self> {
        let cols: Vec<&str> = line.split('\t').collect();
        let (id, sequence, quality, counters, mappings) = match cols.as_slice() {
            [id, seq, qual, counters, maps] => (*id, *seq, Some(*qual), *counters, *maps),
            [id, seq, counters, maps] => (*id, *seq, None, *counters, *maps),
            _ => return Err(anyhow!("expected 4 or 5 tab-separated columns, found {}", cols.len())),
        };
        if id.is_empty() {
            return Err(anyhow!("empty read identifier"));
        }
        Ok(MapRecord {
            id: id.to_string(),
            sequence: sequence.to_string(),
            quality: quality.map(str::to_string),
            counters: counters.to_string(),
            mappings: mappings.to_string(),
        })
    }

    pub fn is_mapped(&self) -> bool {
        let m = self.mappings.trim();
        !(m.is_empty() || m == NO_MAPPING)
    }

    pub fn alignments(&self) -> impl Iterator<Item = &str> {
        let m = if self.is_mapped() { self.mappings.as_str() } else { "" };
        m.split(',').filter(|a| !a.is_empty())
    }

    /// The read as it would be fed back to a mapper. Missing qualities become `I`.
    pub fn to_fastq(&self) -> FastqRecord {
        let seq = self.sequence.as_bytes().to_vec();
        let qual = match &self.quality {
            Some(q) if q.len() == seq.len() => q.as_bytes().to_vec(),
            _ => vec![b'I'; seq.len()],
        };
        FastqRecord { id: self.id.clone(), desc: None, seq, qual }
    }

    /// Rewrite every alignment of this record so it covers bases that were
    /// trimmed off before mapping. GEM marks trimmed bases as `(n)`; on the
    /// reverse strand the read's start sits at the alignment's end.
    pub fn pad_trimmed(&mut self, left: usize, right: usize) {
        if !self.is_mapped() || (left == 0 && right == 0) {
            return;
        }
        let padded: Vec<String> = self
            .alignments()
            .map(|aln| {
                let mut parts = aln.splitn(4, ':');
                match (parts.next(), parts.next(), parts.next(), parts.next()) {
                    (Some(chr), Some(strand), Some(pos), Some(cigar)) => {
                        let (head, tail) = if strand == "-" { (right, left) } else { (left, right) };
                        format!("{}:{}:{}:{}{}{}", chr, strand, pos, trim_op(head), cigar, trim_op(tail))
                    }
                    _ => aln.to_string(),
                }
            })
            .collect();
        self.mappings = padded.join(",");
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match &self.quality {
            Some(q) => writeln!(out, "{}\t{}\t{}\t{}\t{}", self.id, self.sequence, q, self.counters, self.mappings),
            None => writeln!(out, "{}\t{}\t{}\t{}", self.id, self.sequence, self.counters, self.mappings),
        }
    }
}

fn trim_op(n: usize) -> String {
    if n == 0 {
        String::new()
    } else {
        format!("({})", n)
    }
}

pub struct MapReader<R: BufRead> {
    reader: R,
    buf: String,
    line: usize,
}

impl<R: BufRead> MapReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), line: 0 }
    }

    /// Current 1-based line number, for error reporting.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn next_record(&mut self) -> Result<Option<MapRecord>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let line = self.buf.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            return MapRecord::parse(line).map(Some);
        }
    }
}
