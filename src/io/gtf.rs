use anyhow::{anyhow, Result};
use std::io::BufRead;

/// An `exon` line of a GTF annotation (1-based, closed coordinates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtfExon {
    pub seqname: String,
    pub strand: char,
    pub start: u64,
    pub end: u64,
    pub transcript_id: String,
}

pub struct GtfReader<R: BufRead> {
    reader: R,
    buf: String,
    line: usize,
}

impl<R: BufRead> GtfReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), line: 0 }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Next exon, skipping comments and every other feature type.
    pub fn next_exon(&mut self) -> Result<Option<GtfExon>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let line = self.buf.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 9 {
                return Err(anyhow!("expected 9 tab-separated columns, found {}", cols.len()));
            }
            if cols[2] != "exon" {
                continue;
            }
            let start: u64 = cols[3].parse().map_err(|_| anyhow!("invalid start '{}'", cols[3]))?;
            let end: u64 = cols[4].parse().map_err(|_| anyhow!("invalid end '{}'", cols[4]))?;
            if end < start {
                return Err(anyhow!("exon end {} before start {}", end, start));
            }
            let strand = match cols[6] {
                "+" => '+',
                "-" => '-',
                other => return Err(anyhow!("invalid strand '{}'", other)),
            };
            let transcript_id = attribute(cols[8], "transcript_id")
                .ok_or_else(|| anyhow!("exon without transcript_id"))?
                .to_string();
            return Ok(Some(GtfExon { seqname: cols[0].to_string(), strand, start, end, transcript_id }));
        }
    }
}

/// Value of `key` in a GTF attribute column (`key "value"; ...`).
pub fn attribute<'a>(attrs: &'a str, key: &str) -> Option<&'a str> {
    attrs.split(';').find_map(|field| {
        let mut kv = field.trim().splitn(2, char::is_whitespace);
        match (kv.next(), kv.next()) {
            (Some(k), Some(v)) if k == key => Some(v.trim().trim_matches('"')),
            _ => None,
        }
    })
}
