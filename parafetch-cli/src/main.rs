//! parafetch - parallel ranged HTTP downloader
//!
//! Thin command-line front end over the `parafetch` library.

mod cli;
mod error;
mod progress;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use indicatif::{HumanBytes, HumanDuration};
use parafetch::config::{config_file_path, ConfigFile};
use parafetch::{logging, DownloadSpec, Downloader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::Args;
use crate::error::CliError;
use crate::progress::ProgressSink;
use crate::settings::Settings;

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            e.report();
            e.exit_code()
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let file = load_config(&args)?;
    let settings = Settings::resolve(&args, &file);

    let _log_guard = logging::init(&settings.log)?;
    debug!(?settings, "Resolved settings");

    if args.save_config {
        save_config(&args, &file)?;
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Interrupted, stopping download...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let mut spec = DownloadSpec::new(args.url.as_str()).with_config(settings.download);
    if let Some(output) = &args.output {
        spec = spec.with_output(output);
    }

    if settings.show_progress {
        let sink = ProgressSink::stderr();
        let on_progress = sink.clone();
        spec = spec
            .on_progress(move |fraction| on_progress.update(fraction))
            .on_complete(move |success, _| sink.finish(success));
    }

    println!("Downloading {}", spec.url);
    println!("  Output: {}", spec.output_path().display());

    let downloader = Downloader::with_reqwest(&spec);
    let report = downloader.run(&spec, &cancel)?;

    println!(
        "Downloaded {} in {} chunks to {} ({}, {}/s)",
        HumanBytes(report.total_bytes),
        report.chunks,
        report.path.display(),
        HumanDuration(report.elapsed),
        HumanBytes(report.bytes_per_second() as u64)
    );

    Ok(())
}

/// Load `--config` if given, otherwise the default file.
///
/// An explicit file must exist unless it is about to be written.
fn load_config(args: &Args) -> Result<ConfigFile, CliError> {
    match &args.config {
        Some(path) if !path.exists() && !args.save_config => Err(CliError::Config(format!(
            "config file not found: {}",
            path.display()
        ))),
        Some(path) => Ok(ConfigFile::load_from(path)?),
        None => Ok(ConfigFile::load()?),
    }
}

/// Write this command line's download flags into the config file.
fn save_config(args: &Args, file: &ConfigFile) -> Result<(), CliError> {
    let saved = settings::remember(args, file);
    match &args.config {
        Some(path) => {
            saved.save_to(path)?;
            println!("Saved settings to {}", path.display());
        }
        None => {
            saved.save()?;
            if let Some(path) = config_file_path() {
                println!("Saved settings to {}", path.display());
            }
        }
    }
    Ok(())
}
