use anyhow::Result;
use std::io::BufRead;

/// One reference sequence, described without keeping its bases in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaEntry {
    pub id: String,
    pub desc: Option<String>,
    /// residues on the sequence lines (whitespace excluded)
    pub len: u64,
    /// residues that are not A/C/G/T
    pub ambiguous: u64,
}

/// Streaming FASTA scanner used for the pre-flight reference summary.
///
/// A full chromosome is never buffered: sequence lines are counted as they
/// are read, so scanning a whole genome stays cheap.
pub struct FastaScanner<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    pending_header: Option<String>,
}

impl<R: BufRead> FastaScanner<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), done: false, pending_header: None }
    }

    pub fn next_entry(&mut self) -> Result<Option<FastaEntry>> {
        if self.done {
            return Ok(None);
        }

        let header = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                self.buf.clear();
                if self.reader.read_line(&mut self.buf)? == 0 {
                    self.done = true;
                    return Ok(None);
                }
                if let Some(rest) = self.buf.strip_prefix('>') {
                    break rest.trim().to_string();
                }
            },
        };

        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let mut len = 0u64;
        let mut ambiguous = 0u64;
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                self.done = true;
                break;
            }
            if let Some(rest) = self.buf.strip_prefix('>') {
                self.pending_header = Some(rest.trim().to_string());
                break;
            }
            for &b in self.buf.as_bytes() {
                match b.to_ascii_uppercase() {
                    b'\n' | b'\r' | b' ' | b'\t' => {}
                    b'A' | b'C' | b'G' | b'T' => len += 1,
                    _ => {
                        len += 1;
                        ambiguous += 1;
                    }
                }
            }
        }

        Ok(Some(FastaEntry { id, desc, len, ambiguous }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn scan_simple_fasta() {
        let data = b">chr1 first\nACgTNN\n>chr2\nAAA\n";
        let mut r = FastaScanner::new(Cursor::new(&data[..]));

        let e1 = r.next_entry().unwrap().unwrap();
        assert_eq!(e1.id, "chr1");
        assert_eq!(e1.desc.as_deref(), Some("first"));
        assert_eq!(e1.len, 6);
        assert_eq!(e1.ambiguous, 2);

        let e2 = r.next_entry().unwrap().unwrap();
        assert_eq!(e2.id, "chr2");
        assert_eq!(e2.desc, None);
        assert_eq!(e2.len, 3);

        assert!(r.next_entry().unwrap().is_none());
    }

    #[test]
    fn scan_wrapped_lines_with_crlf() {
        let data = b"\n>chr21 desc\r\nAC g t\r\n acgt\r\n>chrM \r\n\r\n";
        let mut r = FastaScanner::new(Cursor::new(&data[..]));

        let e1 = r.next_entry().unwrap().unwrap();
        assert_eq!(e1.id, "chr21");
        assert_eq!(e1.len, 8);
        assert_eq!(e1.ambiguous, 0);

        let e2 = r.next_entry().unwrap().unwrap();
        assert_eq!(e2.id, "chrM");
        assert_eq!(e2.len, 0);

        assert!(r.next_entry().unwrap().is_none());
    }

    #[test]
    fn scan_without_header_is_empty() {
        let mut r = FastaScanner::new(Cursor::new(&b"ACGT\n"[..]));
        assert!(r.next_entry().unwrap().is_none());
    }
}
