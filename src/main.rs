mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod offset;
mod pipeline;
mod worker;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

use cli::{Cli, Command, MetadataArgs, PadArgs};
use config::{Config, MetadataConfig};
use encode::ffmpeg::{Ffmpeg, MediaTool};
use offset::header::normalize_format_tag;
use pipeline::{OutputClaims, PadOptions, TempoSource};
use worker::{JobEvent, WorkerPool};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    let mut config = Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(cfg) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            config = cfg;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    if let Some(strategy) = cli.strategy {
        config.analysis.strategy = strategy;
    }

    match cli.command {
        Command::Tempo { files } => {
            for file in &files {
                let bpm = audio::tempo::estimate(file, &config.analysis);
                println!("{}\t{:.2} BPM", file.display(), bpm);
            }
            Ok(())
        }
        Command::FixHeader { files } => fix_headers(&files),
        Command::Mp3 { files, bitrate } => {
            Ffmpeg::check_installed()?;
            let bitrate = bitrate.unwrap_or(config.output.mp3_bitrate.clone());
            let tool: Arc<dyn MediaTool> = Arc::new(Ffmpeg::new(&bitrate));
            let pool = WorkerPool::new(config.output.jobs)?;
            let rx = pool.dispatch(files.clone(), move |input| {
                let output = pipeline::convert_mp3(input, tool.as_ref())?;
                Ok(format!("MP3 saved as: {}", output.display()))
            });
            report(rx, files.len())
        }
        Command::Pad(args) => pad(args, config),
    }
}

fn pad(args: PadArgs, config: Config) -> Result<()> {
    Ffmpeg::check_installed()?;

    let options = PadOptions {
        tempo: match args.bpm {
            Some(text) => TempoSource::Manual(text),
            None => TempoSource::Estimate,
        },
        beats: args.beats,
        naming: (config.output.rename && !args.no_rename)
            .then(|| merge_metadata(config.metadata.clone(), args.metadata)),
        fix_header: config.output.fix_header && !args.no_fix_header,
        mp3: args.mp3,
    };

    let jobs = args.jobs.unwrap_or(config.output.jobs);
    let pool = WorkerPool::new(jobs)?;
    log::info!("Processing {} file(s) on {} worker(s)", args.files.len(), pool.threads());

    let tool: Arc<dyn MediaTool> = Arc::new(Ffmpeg::new(&config.output.mp3_bitrate));
    let analysis = config.analysis;
    let claims = OutputClaims::default();

    let total = args.files.len();
    let rx = pool.dispatch(args.files, move |input| {
        let outcome = pipeline::pad_file(input, &options, &analysis, tool.as_ref(), &claims)?;
        let mut summary = format!(
            "Added {}s of silence, saved as: {}",
            outcome.plan.duration_arg(),
            outcome.output.display()
        );
        if outcome.defaults_used {
            summary.push_str(" (defaults substituted)");
        }
        if outcome.header_patched {
            summary.push_str(" (format tag fixed)");
        }
        if let Some(mp3) = outcome.mp3 {
            summary.push_str(&format!(", MP3: {}", mp3.display()));
        }
        Ok(summary)
    });
    report(rx, total)
}

/// CLI metadata flags override the configured defaults.
fn merge_metadata(mut base: MetadataConfig, args: MetadataArgs) -> MetadataConfig {
    if let Some(v) = args.track_type { base.track_type = v; }
    if let Some(v) = args.key { base.key = v; }
    if let Some(v) = args.limit { base.limit = v; }
    if args.bpm_label.is_some() { base.bpm_label = args.bpm_label; }
    if let Some(v) = args.bit_depth { base.bit_depth = v; }
    if let Some(v) = args.sample_rate_label { base.sample_rate = v; }
    if let Some(v) = args.dither { base.dither = v; }
    if let Some(v) = args.dedicated_to { base.dedicated_to = v; }
    base
}

fn fix_headers(files: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for file in files {
        match normalize_format_tag(file) {
            Ok(true) => println!("{}\tfixed", file.display()),
            Ok(false) => println!("{}\tunchanged", file.display()),
            Err(e) => {
                log::error!("{}", e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} file(s) could not be patched", failed, files.len());
    }
    Ok(())
}

/// Drain job events into the log and a progress bar; error if any job failed.
fn report(rx: crossbeam_channel::Receiver<JobEvent>, total: usize) -> Result<()> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let mut failed = 0;
    for event in rx {
        match event {
            JobEvent::Started { id, input } => {
                log::debug!("[{}] started {}", id, input.display());
            }
            JobEvent::Finished { id, input, summary } => {
                pb.suspend(|| log::info!("[{}] {}: {}", id, input.display(), summary));
                pb.inc(1);
            }
            JobEvent::Failed { id, input, error } => {
                pb.suspend(|| log::error!("[{}] {}: OPERATION FAILED: {}", id, input.display(), error));
                failed += 1;
                pb.inc(1);
            }
        }
    }
    pb.finish_and_clear();

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed", failed, total);
    }
    log::info!("All {} file(s) done", total);
    Ok(())
}
