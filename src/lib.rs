//! # gem-pipeline
//!
//! 驱动 GEM 比对工具集完成 RNA-seq 读段比对的流水线。
//!
//! 本 crate 不实现比对算法本身：索引构建、近似匹配、剪接位点推断、配对、
//! 打分以及 SAM/BAM 编码都交给外部工具。这里负责的是：
//!
//! - **阶段编排**：按固定顺序调用各阶段，前一阶段未比对上的读段作为下一阶段输入
//! - **剪接位点**：从 GTF 注释提取、与 de-novo 结果合并、按距离过滤并写出
//! - **结果合并**：以初始比对为全集，用后续各轮结果补齐未比对上的读段
//! - **落盘结果**：每个阶段的输出都是文件，可以重新打开、重复读取
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use gem_pipeline::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
//! use gem_pipeline::toolkit::GemToolkit;
//!
//! let layout = PipelineLayout::demo(std::path::Path::new("."));
//! let config = PipelineConfig::default();
//! let toolkit = GemToolkit::new(config.tools.clone(), config.quality_offset);
//! let report = Pipeline::new(&toolkit, config, layout).run()?;
//! println!("BAM written to {}", report.bam.display());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — FASTA / FASTQ / GEM map / GTF 文件读写
//! - [`index`] — 索引句柄与构建元信息
//! - [`mapping`] — 可重复打开的比对结果、读段集合、未比对过滤
//! - [`junctions`] — 剪接位点集合
//! - [`merge`] — 多轮比对结果合并
//! - [`toolkit`] — 外部工具接口及 GEM 实现
//! - [`stages`] — 各阶段入口
//! - [`pipeline`] — 完整流水线

pub mod error;
pub mod io;
pub mod index;
pub mod mapping;
pub mod junctions;
pub mod merge;
pub mod toolkit;
pub mod stages;
pub mod pipeline;

pub use error::PipelineError;
