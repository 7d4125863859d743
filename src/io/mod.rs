pub mod fasta;
pub mod fastq;
pub mod gtf;
pub mod map;

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub fn open_reader(path: &Path) -> Result<BufReader<File>> {
    let fh = File::open(path).with_context(|| format!("cannot open '{}'", path.display()))?;
    Ok(BufReader::new(fh))
}

pub fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let fh = File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?;
    Ok(BufWriter::new(fh))
}
