//! 完整的 RNA-seq 比对流水线：
//!
//! index → 初始比对 → GTF 剪接位点 + de-novo 剪接位点 → split-map
//! → 3' 端截短后重新比对 / split-map → 合并 → 配对 → 校验打分 → SAM → BAM。
//!
//! 每个阶段的输入是上一阶段未比对上的读段，所有中间结果都落盘。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::PipelineError;
use crate::index::IndexHandle;
use crate::junctions::JunctionSet;
use crate::mapping::{MappingFile, ReadSet, Trim};
use crate::merge::{MergeStats, Merger};
use crate::stages;
use crate::toolkit::{BamOpt, ExtractOpt, MapOpt, PairAlignOpt, SplitMapOpt, ToolPaths, Toolkit, ValidateMode};

/// Run parameters. Loadable from JSON; missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// threads handed to every tool
    pub threads: usize,
    /// delete early-stage artifacts once the merged mapping exists
    pub remove_files: bool,
    pub initial_mismatches: f64,
    pub initial_delta: u32,
    pub denovo_mismatches: f64,
    pub split_mismatches: f64,
    pub trim: Trim,
    pub max_junction_distance: u64,
    pub min_insert_size: u64,
    pub max_insert_size: u64,
    pub validate_mode: ValidateMode,
    pub sam_threads: usize,
    pub sorted_bam: bool,
    pub quality_offset: u8,
    pub tools: ToolPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            remove_files: false,
            initial_mismatches: 0.07,
            initial_delta: 1,
            denovo_mismatches: 0.04,
            split_mismatches: 0.06,
            trim: Trim::new(0, 20),
            max_junction_distance: 500_000,
            min_insert_size: 0,
            max_insert_size: 100_000,
            validate_mode: ValidateMode::Validate,
            sam_threads: 4,
            sorted_bam: true,
            quality_offset: 33,
            tools: ToolPaths::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("cannot read config '{}'", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config '{}'", path.display()))
    }
}

/// Where the inputs live and what every artifact is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub reference: PathBuf,
    pub annotation: PathBuf,
    pub reads: ReadsInput,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadsInput {
    /// one file, pairs interleaved
    Multiplexed(PathBuf),
    Pair(PathBuf, PathBuf),
}

impl PipelineLayout {
    /// Layout of the chr21 demo data set below `base_dir` (`data/` and `results/`).
    pub fn demo(base_dir: &Path) -> Self {
        let data_dir = base_dir.join("data");
        Self {
            reference: data_dir.join("chr21.fa"),
            annotation: data_dir.join("chr21.gtf"),
            reads: ReadsInput::Multiplexed(data_dir.join("data_chr21.fastq")),
            results_dir: base_dir.join("results"),
            data_dir,
            name: "chr21_mapping".to_string(),
        }
    }

    fn stem(&self) -> PathBuf {
        self.results_dir.join(&self.name)
    }

    fn artifact(&self, suffix: &str) -> PathBuf {
        let mut s = self.stem().into_os_string();
        s.push(suffix);
        PathBuf::from(s)
    }

    pub fn index(&self) -> PathBuf {
        let genome = self.reference.file_stem().map_or_else(|| "genome".into(), |s| s.to_string_lossy().into_owned());
        self.results_dir.join(format!("{}.gem", genome))
    }

    pub fn initial(&self) -> PathBuf {
        self.artifact("_initial.map")
    }

    pub fn denovo(&self) -> PathBuf {
        self.artifact("_denovo.map")
    }

    pub fn junctions(&self) -> PathBuf {
        self.artifact(".junctions")
    }

    pub fn initial_split(&self) -> PathBuf {
        self.artifact("_initial_split.map")
    }

    pub fn trimmed(&self, trim: Trim) -> PathBuf {
        self.artifact(&format!("_trim_{}.map", trim_label(trim)))
    }

    pub fn trimmed_split(&self, trim: Trim) -> PathBuf {
        self.artifact(&format!("_trim_{}_split.map", trim_label(trim)))
    }

    pub fn merged(&self) -> PathBuf {
        self.artifact("_merged.map")
    }

    pub fn paired(&self) -> PathBuf {
        self.artifact("_paired.map")
    }

    pub fn scored(&self) -> PathBuf {
        self.artifact(".map")
    }

    pub fn sam(&self) -> PathBuf {
        self.artifact(".sam")
    }

    pub fn bam(&self) -> PathBuf {
        self.artifact(".bam")
    }

    /// Inputs that must exist before anything runs.
    pub fn check_inputs(&self) -> Result<()> {
        if !self.data_dir.is_dir() {
            return Err(PipelineError::missing("demo data directory", &self.data_dir).into());
        }
        let mut required: Vec<(&'static str, &Path)> =
            vec![("reference", self.reference.as_path()), ("annotation", self.annotation.as_path())];
        match &self.reads {
            ReadsInput::Multiplexed(p) => required.push(("reads", p.as_path())),
            ReadsInput::Pair(a, b) => {
                required.push(("first mate reads", a.as_path()));
                required.push(("second mate reads", b.as_path()));
            }
        }
        for (what, p) in required {
            if !p.is_file() {
                return Err(PipelineError::missing(what, p).into());
            }
        }
        Ok(())
    }
}

fn trim_label(trim: Trim) -> String {
    match (trim.left, trim.right) {
        (0, r) => r.to_string(),
        (l, 0) => l.to_string(),
        (l, r) => format!("{}_{}", l, r),
    }
}

/// Result paths and timings of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub index: PathBuf,
    pub merged: PathBuf,
    pub paired: PathBuf,
    pub scored: PathBuf,
    pub sam: PathBuf,
    pub bam: PathBuf,
    pub junctions: usize,
    pub merge: MergeStats,
    pub removed: Vec<PathBuf>,
    pub stages: Vec<(&'static str, Duration)>,
}

pub struct Pipeline<'a, T: Toolkit + ?Sized> {
    toolkit: &'a T,
    config: PipelineConfig,
    layout: PipelineLayout,
}

impl<'a, T: Toolkit + ?Sized> Pipeline<'a, T> {
    pub fn new(toolkit: &'a T, config: PipelineConfig, layout: PipelineLayout) -> Self {
        Self { toolkit, config, layout }
    }

    fn reads(&self) -> ReadSet {
        match &self.layout.reads {
            ReadsInput::Multiplexed(p) => ReadSet::fastq(p),
            ReadsInput::Pair(a, b) => ReadSet::interleave(a, b),
        }
    }

    /// Run every stage in order. The first failing stage aborts the run.
    pub fn run(&self) -> Result<RunReport> {
        let cfg = &self.config;
        let layout = &self.layout;
        let kit = self.toolkit;
        let threads = cfg.threads;
        let trim = Some(cfg.trim).filter(|t| !t.is_noop());

        layout.check_inputs()?;
        std::fs::create_dir_all(&layout.results_dir)
            .with_context(|| format!("cannot create results directory '{}'", layout.results_dir.display()))?;

        let mut timer = StageTimer::default();

        let index = timer.time("index", || stages::index(kit, &layout.reference, &layout.index(), threads))?;

        let initial = timer.time("initial mapping", || {
            let opt = MapOpt { mismatches: Some(cfg.initial_mismatches), delta: Some(cfg.initial_delta), threads };
            stages::map(kit, &self.reads(), &index, &layout.initial(), &opt, None)
        })?;

        log::info!("loading GTF junctions from {}", layout.annotation.display());
        let annotated = JunctionSet::from_gtf(&layout.annotation)?;
        log::info!("{} annotated junction sites", annotated.len());

        let (denovo, junctions) = timer.time("de-novo junctions", || {
            let opt = ExtractOpt { mismatches: Some(cfg.denovo_mismatches), threads };
            stages::extract_junctions(kit, &initial.unmapped(), &index, &layout.denovo(), &opt, Some(&annotated))
        })?;

        let junctions_file = layout.junctions();
        let kept = junctions.filter_by_distance(cfg.max_junction_distance);
        let written = kept.write(&junctions_file, &index)?;
        log::info!(
            "wrote {} of {} junctions within {} bp to {}",
            written,
            junctions.len(),
            cfg.max_junction_distance,
            junctions_file.display()
        );

        let initial_split = timer.time("initial split-map", || {
            let opt = SplitMapOpt { junctions_file: Some(&junctions_file), mismatches: Some(cfg.split_mismatches), threads };
            stages::split_map(kit, &denovo.unmapped(), &index, &layout.initial_split(), &opt, None)
        })?;

        let trimmed = timer.time("trimmed mapping", || {
            let opt = MapOpt { mismatches: None, delta: None, threads };
            stages::map(kit, &initial_split.unmapped(), &index, &layout.trimmed(cfg.trim), &opt, trim)
        })?;

        // the trimmed result already holds trimmed reads, so no second trim here
        let trimmed_split = timer.time("trimmed split-map", || {
            let opt = SplitMapOpt { junctions_file: Some(&junctions_file), mismatches: None, threads };
            stages::split_map(kit, &trimmed.unmapped(), &index, &layout.trimmed_split(cfg.trim), &opt, None)
        })?;
        let trimmed_split = match trim {
            Some(t) => trimmed_split.with_trim(t),
            None => trimmed_split,
        };

        let (merged, merge_stats) = timer.time("merge", || {
            Merger::new(initial.clone())
                .with(denovo.clone())
                .with(initial_split.clone())
                .with(trimmed.clone())
                .with(trimmed_split.clone())
                .merge(&layout.merged())
        })?;

        let mut removed = Vec::new();
        if cfg.remove_files {
            log::info!("removing intermediate files");
            let stage_outputs = [&initial, &denovo, &initial_split, &trimmed, &trimmed_split];
            let mut doomed: Vec<PathBuf> = vec![junctions_file.clone(), layout.denovo().with_extension("junctions")];
            for m in stage_outputs {
                doomed.push(m.path().to_path_buf());
                doomed.push(stages::derived_reads_path(m.path()));
            }
            removed = remove_intermediates(&doomed)?;
        }

        let paired = timer.time("pair-align", || {
            let opt = PairAlignOpt { min_insert_size: cfg.min_insert_size, max_insert_size: cfg.max_insert_size, threads };
            stages::pair_align(kit, &merged, &index, &layout.paired(), &opt)
        })?;

        let scored = timer.time("validate", || stages::validate(kit, &paired, &index, &layout.scored(), cfg.validate_mode, threads))?;

        let sam = timer.time("gem-2-sam", || stages::gem_to_sam(kit, &scored, &index, &layout.sam(), cfg.sam_threads))?;
        let bam = timer.time("sam-2-bam", || {
            stages::sam_to_bam(kit, &sam, &layout.bam(), &BamOpt { sorted: cfg.sorted_bam, threads: cfg.sam_threads })
        })?;

        log::info!("done: {}", bam.display());
        Ok(RunReport {
            index: index.path().to_path_buf(),
            merged: merged.path().to_path_buf(),
            paired: paired.path().to_path_buf(),
            scored: scored.path().to_path_buf(),
            sam,
            bam,
            junctions: written,
            merge: merge_stats,
            removed,
            stages: timer.finish(),
        })
    }
}

/// Re-open an index built by an earlier run instead of rebuilding it.
pub fn reuse_index(layout: &PipelineLayout) -> Result<IndexHandle> {
    IndexHandle::open(layout.index())
}

/// Re-open the merged mapping of an earlier run.
pub fn reuse_merged(layout: &PipelineLayout) -> Result<MappingFile> {
    MappingFile::open(layout.merged())
}

fn remove_intermediates(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for p in paths {
        if p.is_file() {
            std::fs::remove_file(p).with_context(|| format!("cannot remove '{}'", p.display()))?;
            log::debug!("removed {}", p.display());
            removed.push(p.clone());
        }
    }
    Ok(removed)
}

#[derive(Default)]
struct StageTimer {
    stages: Vec<(&'static str, Duration)>,
}

impl StageTimer {
    fn time<R>(&mut self, name: &'static str, f: impl FnOnce() -> Result<R>) -> Result<R> {
        log::info!("running {}", name);
        let start = Instant::now();
        let out = f().with_context(|| format!("stage '{}' failed", name))?;
        let took = start.elapsed();
        log::info!("{} finished in {:.1}s", name, took.as_secs_f64());
        self.stages.push((name, took));
        Ok(out)
    }

    fn finish(self) -> Vec<(&'static str, Duration)> {
        self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_layout_names() {
        let layout = PipelineLayout::demo(Path::new("/work"));
        let trim = Trim::new(0, 20);
        assert_eq!(layout.index(), Path::new("/work/results/chr21.gem"));
        assert_eq!(layout.initial(), Path::new("/work/results/chr21_mapping_initial.map"));
        assert_eq!(layout.junctions(), Path::new("/work/results/chr21_mapping.junctions"));
        assert_eq!(layout.trimmed(trim), Path::new("/work/results/chr21_mapping_trim_20.map"));
        assert_eq!(layout.trimmed_split(trim), Path::new("/work/results/chr21_mapping_trim_20_split.map"));
        assert_eq!(layout.trimmed(Trim::new(5, 10)), Path::new("/work/results/chr21_mapping_trim_5_10.map"));
        assert_eq!(layout.scored(), Path::new("/work/results/chr21_mapping.map"));
        assert_eq!(layout.bam(), Path::new("/work/results/chr21_mapping.bam"));
    }

    #[test]
    fn config_defaults_and_partial_json() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.threads, 4);
        assert_eq!(cfg.trim, Trim::new(0, 20));
        assert_eq!(cfg.max_junction_distance, 500_000);

        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"threads": 8, "remove_files": true, "validate_mode": "validate-and-score"}"#).unwrap();
        assert_eq!(cfg.threads, 8);
        assert!(cfg.remove_files);
        assert_eq!(cfg.validate_mode, ValidateMode::ValidateAndScore);
        assert_eq!(cfg.max_insert_size, 100_000);
        assert_eq!(cfg.tools, ToolPaths::default());
    }

    #[test]
    fn missing_data_dir_is_missing_input() {
        let layout = PipelineLayout::demo(Path::new("/nonexistent/base"));
        let err = layout.check_inputs().unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::MissingInput { .. })));
    }
}
