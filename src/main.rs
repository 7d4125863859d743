use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use gem_pipeline::error;
use gem_pipeline::junctions::JunctionSet;
use gem_pipeline::pipeline::{Pipeline, PipelineConfig, PipelineLayout, ReadsInput};
use gem_pipeline::stages;
use gem_pipeline::toolkit::{GemToolkit, ValidateMode};

#[derive(Parser, Debug)]
#[command(name = "gem-pipeline", author, version, about = "RNA-seq mapping pipeline driving the GEM toolkit", arg_required_else_help = true)]
struct Cli {
    /// Log every tool command line
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the GEM index of a reference
    Index {
        /// Reference FASTA file
        reference: PathBuf,
        /// Index file to create (defaults to the reference name with a .gem extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 't', long = "threads", default_value_t = 4)]
        threads: usize,
    },
    /// Count the junction sites of a GTF annotation
    Junctions {
        /// GTF annotation
        gtf: Option<PathBuf>,
    },
    /// Run the complete mapping pipeline
    Run {
        /// Directory holding data/ and results/
        #[arg(short = 'b', long = "base-dir", default_value = ".")]
        base_dir: PathBuf,
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
        #[arg(long = "results-dir")]
        results_dir: Option<PathBuf>,
        /// Reference FASTA (default: <data-dir>/chr21.fa)
        #[arg(long)]
        reference: Option<PathBuf>,
        /// GTF annotation (default: <data-dir>/chr21.gtf)
        #[arg(long)]
        annotation: Option<PathBuf>,
        /// Reads, interleaved pairs (default: <data-dir>/data_chr21.fastq)
        #[arg(long)]
        reads: Option<PathBuf>,
        /// Second mate file; interleaved with --reads
        #[arg(long, requires = "reads")]
        mate: Option<PathBuf>,
        /// Name prefix of the result files
        #[arg(long)]
        name: Option<String>,
        /// JSON file with pipeline parameters
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short = 't', long = "threads")]
        threads: Option<usize>,
        /// Delete intermediate mappings after the merge
        #[arg(long = "remove-files")]
        remove_files: bool,
        #[arg(long = "validate-mode", value_enum)]
        validate_mode: Option<ValidateMode>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .format_timestamp(None)
        .format_target(false)
        .init();

    let result = match cli.command {
        Commands::Index { reference, output, threads } => run_index(&reference, output, threads),
        Commands::Junctions { gtf } => match gtf {
            Some(gtf) => run_junctions(&gtf),
            None => {
                eprintln!("Please specify the gtf file to read");
                return ExitCode::from(1);
            }
        },
        Commands::Run {
            base_dir,
            data_dir,
            results_dir,
            reference,
            annotation,
            reads,
            mate,
            name,
            config,
            threads,
            remove_files,
            validate_mode,
        } => {
            let mut layout = PipelineLayout::demo(&base_dir);
            if let Some(d) = data_dir {
                layout = relocate_data(layout, d);
            }
            if let Some(r) = results_dir {
                layout.results_dir = r;
            }
            if let Some(r) = reference {
                layout.reference = r;
            }
            if let Some(a) = annotation {
                layout.annotation = a;
            }
            match (reads, mate) {
                (Some(a), Some(b)) => layout.reads = ReadsInput::Pair(a, b),
                (Some(a), None) => layout.reads = ReadsInput::Multiplexed(a),
                _ => {}
            }
            if let Some(n) = name {
                layout.name = n;
            }
            run_pipeline(layout, config.as_deref(), threads, remove_files, validate_mode)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::from(error::exit_code(&e).clamp(1, 255) as u8)
        }
    }
}

/// Move the default inputs under `data_dir`.
fn relocate_data(mut layout: PipelineLayout, data_dir: PathBuf) -> PipelineLayout {
    let rebase = |p: &Path| data_dir.join(p.file_name().unwrap_or_default());
    layout.reference = rebase(&layout.reference);
    layout.annotation = rebase(&layout.annotation);
    if let ReadsInput::Multiplexed(p) = &layout.reads {
        layout.reads = ReadsInput::Multiplexed(rebase(p));
    }
    layout.data_dir = data_dir;
    layout
}

fn run_index(reference: &Path, output: Option<PathBuf>, threads: usize) -> Result<()> {
    let target = output.unwrap_or_else(|| reference.with_extension("gem"));
    println!("Creating index for {}", reference.display());
    println!("GEM index is created in {}", target.display());
    let toolkit = GemToolkit::default();
    let index = stages::index(&toolkit, reference, &target, threads)?;
    println!("Created index {}", index);
    Ok(())
}

fn run_junctions(gtf: &Path) -> Result<()> {
    let junctions = JunctionSet::from_gtf(gtf)?;
    println!("{} Possible Junction Sites", junctions.len());
    Ok(())
}

fn run_pipeline(
    layout: PipelineLayout,
    config: Option<&Path>,
    threads: Option<usize>,
    remove_files: bool,
    validate_mode: Option<ValidateMode>,
) -> Result<()> {
    let mut cfg = match config {
        Some(p) => PipelineConfig::load(p)?,
        None => PipelineConfig::default(),
    };
    if let Some(t) = threads {
        cfg.threads = t;
    }
    if remove_files {
        cfg.remove_files = true;
    }
    if let Some(m) = validate_mode {
        cfg.validate_mode = m;
    }

    let toolkit = GemToolkit::new(cfg.tools.clone(), cfg.quality_offset);
    let report = Pipeline::new(&toolkit, cfg, layout).run()?;

    for (stage, took) in &report.stages {
        println!("{:<20} {:>8.1}s", stage, took.as_secs_f64());
    }
    println!("junctions: {}", report.junctions);
    println!(
        "reads: {} ({} mapped initially, {} rescued, {} unmapped)",
        report.merge.reads, report.merge.mapped_in_primary, report.merge.rescued, report.merge.unmapped
    );
    println!("BAM: {}", report.bam.display());
    Ok(())
}
