#![allow(dead_code)]

use anyhow::Result;
use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use gem_pipeline::error::PipelineError;
use gem_pipeline::index::IndexHandle;
use gem_pipeline::io::fastq::FastqReader;
use gem_pipeline::io::open_reader;
use gem_pipeline::pipeline::PipelineLayout;
use gem_pipeline::toolkit::{BamOpt, ExtractOpt, MapOpt, PairAlignOpt, SplitMapOpt, Toolkit, ValidateMode};

/// One toolkit invocation as seen by the fake.
#[derive(Debug, Clone)]
pub struct Call {
    pub stage: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub read_ids: Vec<String>,
}

/// In-process stand-in for the GEM binaries.
///
/// A read is aligned at `chr21:+:100` by the stage whose label prefixes its id
/// (`init_`, `denovo_`, `split_`, `trim_`, `trimsplit_`). Entries of
/// `by_sequence` take precedence: a read starting with the given bases is
/// aligned by that stage at that position. Everything else stays unmapped.
#[derive(Default)]
pub struct FakeToolkit {
    pub calls: RefCell<Vec<Call>>,
    pub fail_stage: Option<&'static str>,
    pub by_sequence: Vec<(&'static str, &'static str, u64)>,
}

impl FakeToolkit {
    pub fn failing_at(stage: &'static str) -> Self {
        Self { fail_stage: Some(stage), ..Default::default() }
    }

    pub fn aligning_by_sequence(rules: Vec<(&'static str, &'static str, u64)>) -> Self {
        Self { by_sequence: rules, ..Default::default() }
    }

    pub fn stages(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.stage.clone()).collect()
    }

    pub fn call(&self, stage: &str) -> Call {
        self.calls.borrow().iter().find(|c| c.stage == stage).cloned().unwrap_or_else(|| panic!("no call to {}", stage))
    }

    fn record(&self, stage: &str, input: &Path, output: &Path, read_ids: Vec<String>) -> Result<()> {
        self.calls.borrow_mut().push(Call {
            stage: stage.to_string(),
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            read_ids,
        });
        if self.fail_stage == Some(stage) {
            return Err(PipelineError::Toolkit { tool: format!("fake-{}", stage), status: Some(2), stderr: "forced failure".into() }
                .into());
        }
        Ok(())
    }

    fn align(&self, stage: &str, input: &Path, output: &Path) -> Result<()> {
        let reads: Vec<_> = FastqReader::new(open_reader(input)?).collect::<Result<_>>()?;
        self.record(stage, input, output, reads.iter().map(|r| r.id.clone()).collect())?;
        let prefix = format!("{}_", stage);
        let mut out = fs::File::create(output)?;
        for r in reads {
            let seq = String::from_utf8_lossy(&r.seq);
            let qual = String::from_utf8_lossy(&r.qual);
            let pos = match self.by_sequence.iter().find(|(bases, _, _)| seq.starts_with(bases)) {
                Some((_, s, pos)) if *s == stage => Some(*pos),
                Some(_) => None,
                None if r.id.starts_with(&prefix) => Some(100),
                None => None,
            };
            if let Some(pos) = pos {
                writeln!(out, "{}\t{}\t{}\t0:1\tchr21:+:{}:{}", r.id, seq, qual, pos, r.seq.len())?;
            } else {
                writeln!(out, "{}\t{}\t{}\t0:0\t-", r.id, seq, qual)?;
            }
        }
        Ok(())
    }

    fn copy(&self, stage: &str, input: &Path, output: &Path) -> Result<()> {
        self.record(stage, input, output, Vec::new())?;
        fs::copy(input, output)?;
        Ok(())
    }
}

fn is_trim_stage(output: &Path) -> bool {
    output.file_name().map_or(false, |n| n.to_string_lossy().contains("_trim_"))
}

impl Toolkit for FakeToolkit {
    fn build_index(&self, reference: &Path, output: &Path, _threads: usize) -> Result<()> {
        self.record("index", reference, output, Vec::new())?;
        fs::write(output, b"GEM-INDEX")?;
        Ok(())
    }

    fn map(&self, reads: &Path, _index: &IndexHandle, output: &Path, _opt: &MapOpt) -> Result<()> {
        self.align(if is_trim_stage(output) { "trim" } else { "init" }, reads, output)
    }

    fn split_map(&self, reads: &Path, _index: &IndexHandle, output: &Path, opt: &SplitMapOpt<'_>) -> Result<()> {
        assert!(opt.junctions_file.map_or(false, Path::is_file), "split-map needs the junctions file");
        self.align(if is_trim_stage(output) { "trimsplit" } else { "split" }, reads, output)
    }

    fn extract_junctions(
        &self,
        reads: &Path,
        _index: &IndexHandle,
        output: &Path,
        junctions_out: &Path,
        _opt: &ExtractOpt,
    ) -> Result<()> {
        self.align("denovo", reads, output)?;
        fs::write(junctions_out, "chr21\t+\t1000\tchr21\t+\t2000\nchr21\t+\t10\tchr21\t+\t900000\n")?;
        Ok(())
    }

    fn pair_align(&self, input: &Path, _index: &IndexHandle, output: &Path, _opt: &PairAlignOpt) -> Result<()> {
        self.copy("pair", input, output)
    }

    fn validate(&self, input: &Path, _index: &IndexHandle, output: &Path, _mode: ValidateMode, _threads: usize) -> Result<()> {
        self.copy("validate", input, output)
    }

    fn gem_to_sam(&self, input: &Path, _index: &IndexHandle, output: &Path, _threads: usize) -> Result<()> {
        self.record("sam", input, output, Vec::new())?;
        let body = fs::read_to_string(input)?;
        fs::write(output, format!("@HD\tVN:1.0\n{}", body))?;
        Ok(())
    }

    fn sam_to_bam(&self, input: &Path, output: &Path, _opt: &BamOpt) -> Result<()> {
        self.record("bam", input, output, Vec::new())?;
        fs::write(output, b"BAM\x01")?;
        Ok(())
    }
}

pub const GTF: &str = "\
chr21\ttest\texon\t100\t200\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n\
chr21\ttest\texon\t300\t400\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n\
chr21\ttest\texon\t3000\t3100\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T2\";\n\
chr21\ttest\texon\t3500\t3600\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T2\";\n";

pub const READ_IDS: [&str; 6] = ["init_1", "denovo_1", "split_1", "trim_1", "trimsplit_1", "none_1"];

/// `data/` with a 5 kb chr21, an annotation and one 30 bp read per stage.
pub fn demo_layout(base: &Path) -> PipelineLayout {
    let data = base.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("chr21.fa"), format!(">chr21\n{}\n", "ACGT".repeat(1250))).unwrap();
    fs::write(data.join("chr21.gtf"), GTF).unwrap();
    let mut fq = String::new();
    for id in READ_IDS {
        fq.push_str(&format!("@{}\n{}\n+\n{}\n", id, "ACGTTGCA".repeat(4).get(..30).unwrap(), "I".repeat(30)));
    }
    fs::write(data.join("data_chr21.fastq"), fq).unwrap();
    PipelineLayout::demo(base)
}
