use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::{BamOpt, ExtractOpt, MapOpt, PairAlignOpt, SplitMapOpt, Toolkit, ValidateMode};
use crate::error::PipelineError;
use crate::index::IndexHandle;

/// Executables of the GEM toolkit and samtools. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub gem_indexer: PathBuf,
    pub gem_mapper: PathBuf,
    pub gem_rna_mapper: PathBuf,
    pub gem_2_gem: PathBuf,
    pub gem_2_sam: PathBuf,
    pub samtools: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            gem_indexer: "gem-indexer".into(),
            gem_mapper: "gem-mapper".into(),
            gem_rna_mapper: "gem-rna-mapper".into(),
            gem_2_gem: "gem-2-gem".into(),
            gem_2_sam: "gem-2-sam".into(),
            samtools: "samtools".into(),
        }
    }
}

/// Runs the GEM binaries as child processes, streaming stage inputs through
/// stdin and stage outputs from stdout.
#[derive(Debug, Clone)]
pub struct GemToolkit {
    tools: ToolPaths,
    quality_offset: u8,
}

impl Default for GemToolkit {
    fn default() -> Self {
        Self::new(ToolPaths::default(), 33)
    }
}

/// Argument list builder; keeps paths as `OsString`.
#[derive(Default)]
struct Args(Vec<OsString>);

impl Args {
    fn arg(mut self, a: impl Into<OsString>) -> Self {
        self.0.push(a.into());
        self
    }

    fn opt(self, flag: &str, value: impl ToString) -> Self {
        self.arg(flag).arg(value.to_string())
    }

    fn path(self, flag: &str, value: &Path) -> Self {
        self.arg(flag).arg(value.as_os_str())
    }
}

impl GemToolkit {
    pub fn new(tools: ToolPaths, quality_offset: u8) -> Self {
        Self { tools, quality_offset }
    }

    fn quality(&self) -> String {
        format!("offset-{}", self.quality_offset)
    }

    fn index_args(&self, index: &IndexHandle, threads: usize) -> Args {
        Args::default().path("-I", index.path()).opt("-q", self.quality()).opt("-T", threads.max(1))
    }

    /// Spawn `program`, wait for it and turn a non-zero exit into `PipelineError::Toolkit`.
    fn run(&self, program: &Path, args: Args, stdin: Option<&Path>, stdout: Option<&Path>) -> Result<()> {
        let tool = program.file_name().map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());
        let mut cmd = Command::new(program);
        cmd.args(&args.0);
        cmd.stdin(match stdin {
            Some(p) => Stdio::from(File::open(p).map_err(|_| PipelineError::missing("stage input", p))?),
            None => Stdio::null(),
        });
        cmd.stdout(match stdout {
            Some(p) => Stdio::from(File::create(p)?),
            None => Stdio::null(),
        });
        cmd.stderr(Stdio::piped());

        log::debug!(
            "running {} {}{}{}",
            program.display(),
            args.0.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" "),
            stdin.map(|p| format!(" < {}", p.display())).unwrap_or_default(),
            stdout.map(|p| format!(" > {}", p.display())).unwrap_or_default(),
        );

        let output = cmd.output().map_err(|source| PipelineError::Spawn { tool: tool.clone(), source })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // the last lines carry the actual error for every GEM tool
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let stderr = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            return Err(PipelineError::Toolkit { tool, status: output.status.code(), stderr }.into());
        }
        Ok(())
    }
}

impl Toolkit for GemToolkit {
    fn build_index(&self, reference: &Path, output: &Path, threads: usize) -> Result<()> {
        // gem-indexer appends `.gem` to the prefix it is given
        let prefix = if output.extension().is_some_and(|e| e == "gem") { output.with_extension("") } else { output.to_path_buf() };
        let args = Args::default().path("-i", reference).path("-o", &prefix).opt("-T", threads.max(1));
        self.run(&self.tools.gem_indexer, args, None, None)
    }

    fn map(&self, reads: &Path, index: &IndexHandle, output: &Path, opt: &MapOpt) -> Result<()> {
        let mut args = self.index_args(index, opt.threads);
        if let Some(m) = opt.mismatches {
            args = args.opt("-m", m);
        }
        if let Some(d) = opt.delta {
            args = args.opt("-s", d);
        }
        self.run(&self.tools.gem_mapper, args, Some(reads), Some(output))
    }

    fn split_map(&self, reads: &Path, index: &IndexHandle, output: &Path, opt: &SplitMapOpt<'_>) -> Result<()> {
        let mut args = self.index_args(index, opt.threads);
        if let Some(m) = opt.mismatches {
            args = args.opt("-m", m);
        }
        if let Some(j) = opt.junctions_file {
            args = args.path("--junctions-file", j);
        }
        self.run(&self.tools.gem_rna_mapper, args, Some(reads), Some(output))
    }

    fn extract_junctions(
        &self,
        reads: &Path,
        index: &IndexHandle,
        output: &Path,
        junctions_out: &Path,
        opt: &ExtractOpt,
    ) -> Result<()> {
        let mut args = self.index_args(index, opt.threads);
        if let Some(m) = opt.mismatches {
            args = args.opt("-m", m);
        }
        args = args.path("--extract-junctions", junctions_out);
        self.run(&self.tools.gem_rna_mapper, args, Some(reads), Some(output))
    }

    fn pair_align(&self, input: &Path, index: &IndexHandle, output: &Path, opt: &PairAlignOpt) -> Result<()> {
        let args = self
            .index_args(index, opt.threads)
            .arg("-p")
            .opt("--min-insert-size", opt.min_insert_size)
            .opt("--max-insert-size", opt.max_insert_size);
        self.run(&self.tools.gem_mapper, args, Some(input), Some(output))
    }

    fn validate(&self, input: &Path, index: &IndexHandle, output: &Path, mode: ValidateMode, threads: usize) -> Result<()> {
        let args = Args::default().path("-I", index.path()).opt("-T", threads.max(1));
        let args = match mode {
            ValidateMode::Validate => args.arg("--validate"),
            ValidateMode::Score => args.arg("--score"),
            ValidateMode::ValidateAndScore => args.arg("--validate").arg("--score"),
        };
        self.run(&self.tools.gem_2_gem, args, Some(input), Some(output))
    }

    fn gem_to_sam(&self, input: &Path, index: &IndexHandle, output: &Path, threads: usize) -> Result<()> {
        let args = self.index_args(index, threads).arg("-l");
        self.run(&self.tools.gem_2_sam, args, Some(input), Some(output))
    }

    fn sam_to_bam(&self, input: &Path, output: &Path, opt: &BamOpt) -> Result<()> {
        let args = if opt.sorted { Args::default().arg("sort") } else { Args::default().arg("view").arg("-b") };
        let args = args.opt("-@", opt.threads.max(1)).path("-o", output).arg(input.as_os_str());
        self.run(&self.tools.samtools, args, None, None)
    }
}
