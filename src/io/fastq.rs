use anyhow::{anyhow, Result};
use std::io::{BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

impl FastqRecord {
    /// Drop `left` bases from the start and `right` bases from the end.
    /// Returns `None` when nothing would be left of the read.
    pub fn trimmed(&self, left: usize, right: usize) -> Option<FastqRecord> {
        let n = self.seq.len();
        if left + right >= n {
            return None;
        }
        let end = n - right;
        Some(FastqRecord {
            id: self.id.clone(),
            desc: self.desc.clone(),
            seq: self.seq[left..end].to_vec(),
            qual: self.qual[left.min(self.qual.len())..end.min(self.qual.len())].to_vec(),
        })
    }
}

pub struct FastqReader<R: BufRead> {
    reader: R,
    buf: String,
    line: usize,
    done: bool,
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), line: 0, done: false }
    }

    fn read_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let n = self.reader.read_line(&mut self.buf)?;
        self.line += 1;
        Ok(n > 0)
    }

    pub fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        if self.done {
            return Ok(None);
        }

        // skip blank lines between records
        loop {
            if !self.read_line()? {
                self.done = true;
                return Ok(None);
            }
            if !self.buf.trim().is_empty() {
                break;
            }
        }
        let header = self
            .buf
            .strip_prefix('@')
            .ok_or_else(|| anyhow!("line {}: FASTQ header not starting with '@'", self.line))?
            .trim_end()
            .to_string();
        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        if !self.read_line()? {
            return Err(anyhow!("line {}: unexpected EOF after header of '{}'", self.line, id));
        }
        let seq = self.buf.trim_end().as_bytes().to_vec();

        if !self.read_line()? || !self.buf.starts_with('+') {
            return Err(anyhow!("line {}: missing '+' line for '{}'", self.line, id));
        }

        if !self.read_line()? {
            return Err(anyhow!("line {}: missing quality line for '{}'", self.line, id));
        }
        let qual = self.buf.trim_end().as_bytes().to_vec();
        if qual.len() != seq.len() {
            return Err(anyhow!("line {}: seq/qual length mismatch for '{}'", self.line, id));
        }

        Ok(Some(FastqRecord { id, desc, seq, qual }))
    }
}

impl<R: BufRead> Iterator for FastqReader<R> {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

pub fn write_record<W: Write>(out: &mut W, rec: &FastqRecord) -> std::io::Result<()> {
    out.write_all(b"@")?;
    out.write_all(rec.id.as_bytes())?;
    if let Some(desc) = &rec.desc {
        out.write_all(b" ")?;
        out.write_all(desc.as_bytes())?;
    }
    out.write_all(b"\n")?;
    out.write_all(&rec.seq)?;
    out.write_all(b"\n+\n")?;
    out.write_all(&rec.qual)?;
    out.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_interleaved_pairs() {
        let data = b"@r1/1 x\nACGT\n+\nIIII\n@r1/2\nTTGG\n+r1/2\nIIHH\n\n";
        let reads: Vec<_> = FastqReader::new(Cursor::new(&data[..])).collect::<Result<_>>().unwrap();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].id, "r1/1");
        assert_eq!(reads[0].desc.as_deref(), Some("x"));
        assert_eq!(reads[1].id, "r1/2");
        assert_eq!(reads[1].qual, b"IIHH");
    }

    #[test]
    fn reject_length_mismatch() {
        let data = b"@r1\nACGT\n+\nIII\n";
        let mut r = FastqReader::new(Cursor::new(&data[..]));
        let err = r.next_record().unwrap_err();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn reject_missing_header() {
        let mut r = FastqReader::new(Cursor::new(&b"r1\nACGT\n+\nIIII\n"[..]));
        assert!(r.next_record().is_err());
    }

    #[test]
    fn trim_right_end() {
        let rec = FastqRecord { id: "r".into(), desc: None, seq: b"AACCGGTT".to_vec(), qual: b"ABCDEFGH".to_vec() };
        let t = rec.trimmed(0, 3).unwrap();
        assert_eq!(t.seq, b"AACCG");
        assert_eq!(t.qual, b"ABCDE");
        let t = rec.trimmed(2, 2).unwrap();
        assert_eq!(t.seq, b"CCGG");
        assert!(rec.trimmed(4, 4).is_none());
    }

    #[test]
    fn write_then_read_back() {
        let rec = FastqRecord { id: "r9".into(), desc: Some("1:N".into()), seq: b"ACG".to_vec(), qual: b"III".to_vec() };
        let mut out = Vec::new();
        write_record(&mut out, &rec).unwrap();
        assert_eq!(out, b"@r9 1:N\nACG\n+\nIII\n");
        let back = FastqReader::new(Cursor::new(out)).next_record().unwrap().unwrap();
        assert_eq!(back, rec);
    }
}
