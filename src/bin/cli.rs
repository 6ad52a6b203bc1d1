// src/bin/cli.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `assemble`, `sample`, and `epoch` over a contour data root.
//!
//! Examples:
//! ```bash
//! dicomflow-cli --data-dir final_data assemble
//! dicomflow-cli --data-dir final_data assemble --dicom SCD0000101/48.dcm
//! dicomflow-cli --data-dir final_data sample -j 32
//! dicomflow-cli -v epoch -b 8 -j 16 --seed 7 --epochs 2
//! DICOMFLOW_DATA_DIR=final_data dicomflow-cli epoch --timeout 30s
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use futures::StreamExt;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dicomflow::constants::ENV_DATA_DIR;
use dicomflow::data_loader::ItemSource;
use dicomflow::{dicom_loader, DicomDirectory, LoaderOptions};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Data root holding link.csv, dicoms/ and contourfiles/.
    #[arg(long = "data-dir", value_name = "DIR", env = ENV_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pair every slice with its contour files and report the count.
    Assemble {
        /// Print the datum for this slice (e.g. SCD0000101/48.dcm).
        #[arg(long)]
        dicom: Option<String>,
    },

    /// Run the sampler over every datum in order; report how many produced a sample.
    Sample {
        /// Transforms in flight (0 = hardware default).
        #[arg(short = 'j', long = "jobs")]
        jobs: Option<usize>,
    },

    /// Run full shuffled epochs and check batch counts and shapes.
    Epoch {
        #[arg(short = 'b', long = "batch-size")]
        batch_size: Option<usize>,

        /// Transforms in flight (0 = hardware default).
        #[arg(short = 'j', long = "jobs")]
        jobs: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value_t = 1)]
        epochs: u64,

        /// Per-item transform timeout, e.g. `30s` or `2m`.
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Capture `log` records from dependencies
    tracing_log::LogTracer::init().ok();

    if !cli.data_dir.is_dir() {
        bail!("data directory {} does not exist", cli.data_dir.display());
    }

    match cli.cmd {
        Command::Assemble { dicom } => assemble_cmd(cli.data_dir, dicom)?,
        Command::Sample { jobs } => sample_cmd(cli.data_dir, jobs).await?,
        Command::Epoch { batch_size, jobs, seed, epochs, timeout } => {
            let mut opts = LoaderOptions::from_env();
            if let Some(n) = batch_size {
                opts = opts.with_batch_size(n);
            }
            if let Some(n) = jobs {
                opts = opts.num_workers(n);
            }
            if let Some(s) = seed {
                opts = opts.with_seed(s);
            }
            if let Some(t) = timeout {
                opts = opts.with_timeout(t.as_secs_f64());
            }
            epoch_cmd(cli.data_dir, opts, epochs).await?
        }
    }

    Ok(())
}

fn assemble_cmd(root: PathBuf, dicom: Option<String>) -> Result<()> {
    let data = DicomDirectory::new(root).assemble()?;
    safe_println!("total datums parsed: {}", data.len());

    if let Some(target) = dicom {
        let Some(datum) = data.iter().find(|d| d.dicom == target) else {
            bail!("no datum for {}", target);
        };
        safe_println!("dicom:     {}", datum.dicom);
        safe_println!("i_contour: {}", datum.i_contour.as_deref().unwrap_or("-"));
        safe_println!("o_contour: {}", datum.o_contour.as_deref().unwrap_or("-"));
    }
    Ok(())
}

async fn sample_cmd(root: PathBuf, jobs: Option<usize>) -> Result<()> {
    let mut opts = LoaderOptions::from_env();
    if let Some(n) = jobs {
        opts = opts.num_workers(n);
    }
    let loader = dicom_loader(root, opts)?;

    let t0 = Instant::now();
    let mut outcomes = loader.map_in_order()?;
    let (mut total, mut valid) = (0usize, 0usize);
    while let Some(outcome) = outcomes.next().await {
        total += 1;
        if outcome?.is_some() {
            valid += 1;
        }
    }
    info!("sampled {} datums in {:?}", total, t0.elapsed());

    safe_println!("total resultant samples: {}", total);
    safe_println!("total valid datums: {}", valid);
    Ok(())
}

async fn epoch_cmd(root: PathBuf, opts: LoaderOptions, epochs: u64) -> Result<()> {
    let loader = dicom_loader(root, opts)?;
    let batch_size = loader.options().batch_size;
    safe_println!(
        "expected batches per epoch: {}",
        loader.dataset().len().checked_div(batch_size).unwrap_or(0)
    );

    for _ in 0..epochs {
        let t0 = Instant::now();
        let mut epoch = loader.stream()?;
        let mut count = 0usize;
        while let Some(batch) = epoch.next().await {
            let batch = batch.with_context(|| format!("epoch {}", epoch.index()))?;
            if count == 0 {
                safe_println!(
                    "epoch {} first batch: images {:?}, targets {:?}",
                    epoch.index(),
                    batch.images.shape(),
                    batch.targets.shape()
                );
            }
            count += 1;
        }
        safe_println!(
            "epoch {} (seed {}): {} batches in {:.2?}",
            epoch.index(),
            epoch.seed(),
            count,
            t0.elapsed()
        );
    }
    Ok(())
}
