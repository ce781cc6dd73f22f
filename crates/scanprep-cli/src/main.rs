// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanprep — scan cleanup for OCR-bound documents.
//
// Entry point. Initialises logging, loads configuration, builds the pipeline
// around a directory-backed blob store and dispatches the subcommand.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scanprep_core::config::PipelineConfig;
use scanprep_core::error::Result;
use scanprep_core::types::DispatchMode;
use scanprep_pipeline::{
    LocalBlobStore, PdftoppmRasterizer, Pipeline, PipelineLayout, StageReports,
};

#[derive(Parser)]
#[command(name = "scanprep")]
#[command(about = "Order, merge, de-watermark and enhance scanned document pages")]
struct Cli {
    /// JSON configuration file; omitted fields take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of the blob store
    #[arg(long, global = true, default_value = "scanprep-store")]
    store: PathBuf,

    /// Process pages one at a time on the main thread
    #[arg(long, global = true)]
    sequential: bool,

    /// Worker pool size for parallel dispatch
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the PDFs in a directory, in page order, into one document
    Merge {
        dir: PathBuf,

        /// File name of the merged output (also excluded from the inputs)
        #[arg(long)]
        output_name: Option<String>,
    },
    /// Rasterize a PDF into one PNG per page
    Rasterize {
        pdf: PathBuf,

        /// Directory for the page images
        #[arg(long)]
        out: PathBuf,

        /// Resolution in dots per inch
        #[arg(long)]
        dpi: Option<u32>,
    },
    /// Remove watermarks from and enhance every page image in a directory
    Clean {
        input_dir: PathBuf,

        #[arg(long)]
        watermark_out: PathBuf,

        #[arg(long)]
        enhanced_out: PathBuf,
    },
    /// Rasterize, clean and enhance a PDF end to end
    Run {
        pdf: PathBuf,

        /// Working directory for intermediate page images
        #[arg(long, default_value = "scanprep-work")]
        work_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "scanprep failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if cli.sequential {
        config.batch.mode = DispatchMode::Sequential;
    }
    if let Some(workers) = cli.workers {
        config.batch.workers = Some(workers);
    }
    Ok(config)
}

fn build_pipeline(cli: &Cli, config: PipelineConfig, work_dir: &Path) -> Result<Pipeline> {
    let store = Arc::new(LocalBlobStore::new(&cli.store)?);
    Pipeline::new(config, store, Arc::new(PdftoppmRasterizer::new()), work_dir)
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(&cli)?;

    match &cli.command {
        Commands::Merge { dir, output_name } => {
            if let Some(name) = output_name {
                config.merge_sentinel = name.clone();
            }
            let pipeline = build_pipeline(&cli, config, dir)?;
            let outcome = pipeline.merge(dir)?;
            println!(
                "merged {} files ({} pages) into {}",
                outcome.summary.inputs.len(),
                outcome.summary.pages,
                outcome.summary.output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Rasterize { pdf, out, dpi } => {
            if let Some(dpi) = dpi {
                config.dpi = *dpi;
            }
            let pipeline = build_pipeline(&cli, config, out)?.with_layout(PipelineLayout {
                converted: out.clone(),
                ..PipelineLayout::under(out)
            });
            let pages = pipeline.rasterize(pdf)?;
            for page in &pages {
                println!("{}", page.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Clean {
            input_dir,
            watermark_out,
            enhanced_out,
        } => {
            let pipeline = build_pipeline(&cli, config, input_dir)?.with_layout(PipelineLayout {
                converted: input_dir.clone(),
                watermark_removed: watermark_out.clone(),
                text_enhanced: enhanced_out.clone(),
            });
            let reports = pipeline.clean_directory()?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
            Ok(exit_code_for(&reports))
        }
        Commands::Run { pdf, work_dir } => {
            let pipeline = build_pipeline(&cli, config, work_dir)?;
            let report = pipeline.run(pdf)?;
            println!("{}", report.to_json()?);
            Ok(exit_code_for(&report.stages))
        }
    }
}

/// Non-zero when any page failed in either stage.
fn exit_code_for(reports: &StageReports) -> ExitCode {
    let failed = reports.watermark.summary().failed + reports.enhancement.summary().failed;
    if failed > 0 {
        tracing::warn!(failed, "Some pages failed");
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
