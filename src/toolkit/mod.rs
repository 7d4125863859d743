//! 外部比对工具的调用接口。
//!
//! 每个阶段都是一次同步调用：调用返回时输出文件已经写完。
//! 线程数只是转发给外部工具，编排层本身不做并行。

pub mod gem;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::index::IndexHandle;

pub use gem::{GemToolkit, ToolPaths};

#[derive(Debug, Clone, PartialEq)]
pub struct MapOpt {
    /// maximum mismatches as a fraction of the read length
    pub mismatches: Option<f64>,
    /// strata explored past the best one
    pub delta: Option<u32>,
    pub threads: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitMapOpt<'a> {
    pub junctions_file: Option<&'a Path>,
    pub mismatches: Option<f64>,
    pub threads: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOpt {
    pub mismatches: Option<f64>,
    pub threads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairAlignOpt {
    pub min_insert_size: u64,
    pub max_insert_size: u64,
    pub threads: usize,
}

/// What the post-processing pass does to the paired mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ValidateMode {
    #[default]
    Validate,
    Score,
    ValidateAndScore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BamOpt {
    pub sorted: bool,
    pub threads: usize,
}

/// The external toolkit as seen by the pipeline. Inputs and outputs are
/// files; an implementation must have written `output` when it returns `Ok`.
pub trait Toolkit {
    fn build_index(&self, reference: &Path, output: &Path, threads: usize) -> Result<()>;

    fn map(&self, reads: &Path, index: &IndexHandle, output: &Path, opt: &MapOpt) -> Result<()>;

    fn split_map(&self, reads: &Path, index: &IndexHandle, output: &Path, opt: &SplitMapOpt<'_>) -> Result<()>;

    /// Split-map and report the de-novo junctions it used to `junctions_out`.
    fn extract_junctions(
        &self,
        reads: &Path,
        index: &IndexHandle,
        output: &Path,
        junctions_out: &Path,
        opt: &ExtractOpt,
    ) -> Result<()>;

    fn pair_align(&self, input: &Path, index: &IndexHandle, output: &Path, opt: &PairAlignOpt) -> Result<()>;

    fn validate(&self, input: &Path, index: &IndexHandle, output: &Path, mode: ValidateMode, threads: usize) -> Result<()>;

    fn gem_to_sam(&self, input: &Path, index: &IndexHandle, output: &Path, threads: usize) -> Result<()>;

    fn sam_to_bam(&self, input: &Path, output: &Path, opt: &BamOpt) -> Result<()>;
}
