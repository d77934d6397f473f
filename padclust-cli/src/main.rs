//! padclust CLI
//!
//! Clusters raw-stream files and writes the clusters as CSV or binary.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand};
use log::info;
use padclust_algorithms::EventContext;
use padclust_core::{ClusterStatistics, Pass, RawEvent, RawSample, Transform};
use padclust_io::{
    ClusterFileWriter, OutputFormat, RawFileReader, RawFileWriter, RunConfig,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    PadclustIo(#[from] padclust_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] padclust_core::Error),
}

/// Cluster finder for pad-row readout.
#[derive(Parser)]
#[command(name = "padclust")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a raw-stream file
    Process {
        /// Input raw-stream file
        input: PathBuf,

        /// Output file (.csv or .bin)
        #[arg(short, long)]
        output: PathBuf,

        /// JSON run configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Force overlap unfolding on
        #[arg(long, conflicts_with = "no_unfold")]
        unfold: bool,

        /// Force overlap unfolding off
        #[arg(long)]
        no_unfold: bool,

        /// Second clustering pass
        #[arg(long)]
        second_pass: bool,

        /// Process modules in parallel
        #[arg(short, long)]
        parallel: bool,
    },

    /// Show information about a raw-stream file
    Info {
        /// Input raw-stream file
        input: PathBuf,
    },

    /// Write a synthetic event of Gaussian deposits
    Synth {
        /// Output raw-stream file
        #[arg(short, long)]
        output: PathBuf,

        /// JSON run configuration (geometry and pedestal)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Deposits per row
        #[arg(long, default_value = "4")]
        deposits: u16,

        /// Peak amplitude (ADC counts)
        #[arg(long, default_value = "400.0")]
        amplitude: f32,

        /// Deposit width (samples)
        #[arg(long, default_value = "0.7")]
        sigma: f32,

        /// Number of modules to fill
        #[arg(long, default_value = "2")]
        modules: u16,
    },
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    Ok(match path {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    })
}

fn print_statistics(stats: &ClusterStatistics) {
    println!("Samples loaded: {}", stats.samples_loaded);
    println!("Seeds: {}", stats.seeds);
    println!(
        "Clusters: {} ({} plain, {} unfolded, {} edge)",
        stats.emitted(),
        stats.plain,
        stats.unfolded,
        stats.edge
    );
    println!("Rejected candidates: {}", stats.rejected);
    println!("Modules processed: {}", stats.modules_processed);
    if !stats.modules_skipped.is_empty() {
        println!("Modules skipped: {:?}", stats.modules_skipped);
    }
}

/// Gaussian deposits spread along each row, drifting with the row index.
///
/// With `calc_pedestal` the full time series of every hit pad is written on
/// top of the calibrated pedestal; otherwise only samples of 3 counts and
/// more are written.
fn synth_event(
    config: &RunConfig,
    n_modules: u16,
    deposits: u16,
    amplitude: f32,
    sigma: f32,
) -> RawEvent {
    let geometry = &config.geometry;
    let with_pedestal = config.clusterer.calc_pedestal;
    let pedestal = config.calibration.pedestal.unwrap_or(0.0);
    let n_time_bins = usize::from(geometry.n_time_bins);
    let two_sigma2 = 2.0 * sigma * sigma;
    let mut event = RawEvent::new();

    for module in 0..n_modules.min(geometry.n_modules) {
        let slope = 0.37 * f32::from(module + 1);
        for row in 0..geometry.n_rows {
            let n_pads = geometry.pads_first_row + geometry.pads_increment * (row / 2);
            let mut signal = vec![0.0f32; usize::from(n_pads) * n_time_bins];
            for k in 0..deposits {
                let f = (f32::from(k) + 0.5) / f32::from(deposits);
                let pad = f * f32::from(n_pads) + 0.3 * (f32::from(row) * 0.5).sin();
                let time = (0.1 + 0.8 * f) * f32::from(geometry.n_time_bins)
                    + slope * f32::from(row);
                let scale = 0.6 + 0.4 * (f32::from(k + row) * 1.7).sin().abs();
                for (i, s) in signal.iter_mut().enumerate() {
                    let dp = (i / n_time_bins) as f32 - pad;
                    let dt = (i % n_time_bins) as f32 - time;
                    *s += amplitude * scale * (-(dp * dp + dt * dt) / two_sigma2).exp();
                }
            }

            for (pad, series) in signal.chunks_exact(n_time_bins).enumerate() {
                let pad = pad as u16;
                let link = pad / 16;
                if with_pedestal {
                    if series.iter().all(|&s| s < 3.0) {
                        continue;
                    }
                    for (time, &s) in series.iter().enumerate() {
                        let adc = (s + pedestal).round().clamp(0.0, f32::from(u16::MAX)) as u16;
                        event.push(module, link, RawSample::new(row, pad, time as u16, adc));
                    }
                } else {
                    for (time, &s) in series.iter().enumerate() {
                        if s >= 3.0 {
                            let adc = s.round().min(f32::from(u16::MAX)) as u16;
                            event.push(module, link, RawSample::new(row, pad, time as u16, adc));
                        }
                    }
                }
            }
        }
    }
    event
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Commands::Process {
            input,
            output,
            config,
            unfold,
            no_unfold,
            second_pass,
            parallel,
        } => {
            let start = Instant::now();
            let mut config = load_config(config.as_deref())?;
            if unfold {
                config.clusterer.unfold = true;
            }
            if no_unfold {
                config.clusterer.unfold = false;
            }
            let pass = if second_pass { Pass::Second } else { Pass::First };

            let reader = RawFileReader::open(&input)?;
            let event = reader.read_event();
            info!("{} samples read from {}", event.len(), input.display());

            let calibration = config.calibration_set();
            let mut transform = config.transform();
            transform.prepare(config.stamp())?;
            let ctx = EventContext::new(&calibration, &transform);
            let clusterer = config.clusterer()?;

            let mut writer = ClusterFileWriter::create(&output, OutputFormat::from_path(&output))?;
            let stats = if parallel {
                let (clusters, stats) = clusterer.par_run_raw(&ctx, &event, pass);
                clusters.drain_into(&mut writer)?;
                stats
            } else {
                let mut state = clusterer.create_state();
                clusterer.run_raw(&mut state, &ctx, &event, pass, &mut writer)?
            };
            let written = writer.finish()?;

            println!(
                "Processed {} in {:.2}s",
                input.display(),
                start.elapsed().as_secs_f64()
            );
            print_statistics(&stats);
            println!("Wrote {} clusters to {}", written, output.display());
        }

        Commands::Info { input } => {
            let reader = RawFileReader::open(&input)?;
            let file_size = reader.file_size();
            let summary = reader.summary();

            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                file_size,
                file_size as f64 / 1_000_000.0
            );
            println!("Records: {}", summary.records);
            for (module, m) in &summary.modules {
                println!(
                    "  module {:>3}: {} samples, {} links, {} rows, max amplitude {}",
                    module, m.samples, m.links, m.rows, m.max_amplitude
                );
            }
        }

        Commands::Synth {
            output,
            config,
            deposits,
            amplitude,
            sigma,
            modules,
        } => {
            let config = load_config(config.as_deref())?;
            let event = synth_event(&config, modules, deposits, amplitude, sigma);
            let mut writer = RawFileWriter::create(&output)?;
            writer.write_event(&event)?;
            writer.flush()?;
            println!(
                "Wrote {} samples to {}",
                writer.records(),
                output.display()
            );
        }
    }

    Ok(())
}
