//! 流水线各阶段的入口。
//!
//! 每个函数先检查输入，写出工具要读的读段文件，调用一次工具链，
//! 最后返回落盘的结果。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::index::{meta, IndexHandle, IndexMeta};
use crate::junctions::JunctionSet;
use crate::mapping::{MappingFile, ReadSet, Trim};
use crate::toolkit::{BamOpt, ExtractOpt, MapOpt, PairAlignOpt, SplitMapOpt, Toolkit, ValidateMode};

/// 产出 `output` 的阶段所写的派生读段文件路径。
pub fn derived_reads_path(output: &Path) -> PathBuf {
    output.with_extension("fastq")
}

fn require(what: &'static str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::missing(what, path).into())
    }
}

fn check_index(index: &IndexHandle) -> Result<()> {
    require("GEM index", index.path())
}

/// 为 `reference` 在 `target` 处构建 GEM 索引。
///
/// 参考序列缺失时直接失败，不会调用工具链。
pub fn index<T: Toolkit + ?Sized>(toolkit: &T, reference: &Path, target: &Path, threads: usize) -> Result<IndexHandle> {
    require("reference", reference)?;
    let contigs = meta::scan_reference(reference)?;
    log::info!("creating index {} from {}", target.display(), reference.display());

    toolkit.build_index(reference, target, threads)?;
    require("GEM index", target).context("indexer finished without writing the index")?;

    let meta = IndexMeta {
        reference_file: Some(reference.display().to_string()),
        contigs,
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    };
    meta.save_to_file(&IndexMeta::sidecar_path(target))?;
    Ok(IndexHandle::with_meta(target.to_path_buf(), meta))
}

/// 普通比对，可选先对读段做 trim。
pub fn map<T: Toolkit + ?Sized>(
    toolkit: &T,
    reads: &ReadSet,
    index: &IndexHandle,
    output: &Path,
    opt: &MapOpt,
    trim: Option<Trim>,
) -> Result<MappingFile> {
    check_index(index)?;
    let input = reads.materialize(&derived_reads_path(output), trim)?;
    log::info!("mapping {} -> {}", input.path.display(), output.display());
    toolkit.map(&input.path, index, output, opt)?;
    produced(output, trim)
}

/// 利用 junction 的 split 比对，可选先对读段做 trim。
pub fn split_map<T: Toolkit + ?Sized>(
    toolkit: &T,
    reads: &ReadSet,
    index: &IndexHandle,
    output: &Path,
    opt: &SplitMapOpt<'_>,
    trim: Option<Trim>,
) -> Result<MappingFile> {
    check_index(index)?;
    if let Some(j) = opt.junctions_file {
        require("junctions file", j)?;
    }
    let input = reads.materialize(&derived_reads_path(output), trim)?;
    log::info!("split-mapping {} -> {}", input.path.display(), output.display());
    toolkit.split_map(&input.path, index, output, opt)?;
    produced(output, trim)
}

/// split 比对以发现新的 junction，并与 `merge_with` 合并。
///
/// 工具报告的 junction 先写到 `output` 旁边（`<output>.junctions`），再读回。
pub fn extract_junctions<T: Toolkit + ?Sized>(
    toolkit: &T,
    reads: &ReadSet,
    index: &IndexHandle,
    output: &Path,
    opt: &ExtractOpt,
    merge_with: Option<&JunctionSet>,
) -> Result<(MappingFile, JunctionSet)> {
    check_index(index)?;
    let input = reads.materialize(&derived_reads_path(output), None)?;
    let junctions_out = output.with_extension("junctions");
    log::info!("extracting de-novo junctions from {}", input.path.display());
    toolkit.extract_junctions(&input.path, index, output, &junctions_out, opt)?;

    let mut junctions = if junctions_out.is_file() { JunctionSet::read(&junctions_out)? } else { JunctionSet::new() };
    log::info!("{} de-novo junctions found", junctions.len());
    if let Some(extra) = merge_with {
        junctions.merge(extra);
    }
    Ok((produced(output, None)?, junctions))
}

pub fn pair_align<T: Toolkit + ?Sized>(
    toolkit: &T,
    input: &MappingFile,
    index: &IndexHandle,
    output: &Path,
    opt: &PairAlignOpt,
) -> Result<MappingFile> {
    check_index(index)?;
    require("mapping", input.path())?;
    log::info!("pair-aligning {} -> {}", input.path().display(), output.display());
    toolkit.pair_align(input.path(), index, output, opt)?;
    produced(output, None)
}

pub fn validate<T: Toolkit + ?Sized>(
    toolkit: &T,
    input: &MappingFile,
    index: &IndexHandle,
    output: &Path,
    mode: ValidateMode,
    threads: usize,
) -> Result<MappingFile> {
    check_index(index)?;
    require("mapping", input.path())?;
    log::info!("{:?} {} -> {}", mode, input.path().display(), output.display());
    toolkit.validate(input.path(), index, output, mode, threads)?;
    produced(output, None)
}

pub fn gem_to_sam<T: Toolkit + ?Sized>(
    toolkit: &T,
    input: &MappingFile,
    index: &IndexHandle,
    output: &Path,
    threads: usize,
) -> Result<PathBuf> {
    check_index(index)?;
    require("mapping", input.path())?;
    log::info!("converting {} to SAM", input.path().display());
    toolkit.gem_to_sam(input.path(), index, output, threads)?;
    require("SAM output", output)?;
    Ok(output.to_path_buf())
}

pub fn sam_to_bam<T: Toolkit + ?Sized>(toolkit: &T, sam: &Path, output: &Path, opt: &BamOpt) -> Result<PathBuf> {
    require("SAM file", sam)?;
    log::info!("converting {} to {}BAM {}", sam.display(), if opt.sorted { "sorted " } else { "" }, output.display());
    toolkit.sam_to_bam(sam, output, opt)?;
    require("BAM output", output)?;
    Ok(output.to_path_buf())
}

fn produced(output: &Path, trim: Option<Trim>) -> Result<MappingFile> {
    require("stage output", output)?;
    Ok(MappingFile::produced(output.to_path_buf(), trim))
}
