use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use batch_converter::cli::{Cli, Command};
use batch_converter::io::{collect_all, read_descriptor, write_file};
use batch_converter::report::{print_history, print_stats, print_summary};
use batch_converter_core::batch::{Converter, ConverterParts};
use batch_converter_core::config::ConversionConfig;
use batch_converter_core::format::OutputFormat;
use batch_converter_core::notify::LogNotifier;
use batch_converter_core::store::JsonFileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match &cli.command {
        Command::Convert {
            inputs,
            output,
            recursive,
            no_archive,
            ..
        } => {
            let config = cli.command.to_config().unwrap_or_default();
            handle_convert(&cli.state, inputs, output, *recursive, !*no_archive, config).await
        }
        Command::History { clear } => handle_history(&cli.state, *clear),
        Command::Stats => handle_stats(&cli.state),
    }
}

fn open_converter(state: &Path, config: ConversionConfig) -> Result<Converter> {
    let store = JsonFileStore::open(state)
        .with_context(|| format!("Failed to open state file {}", state.display()))?;
    Ok(Converter::new(
        config,
        ConverterParts::new(Arc::new(store), Arc::new(LogNotifier)),
    ))
}

async fn handle_convert(
    state: &Path,
    inputs: &[PathBuf],
    output: &Path,
    recursive: bool,
    write_archive: bool,
    config: ConversionConfig,
) -> Result<()> {
    let target: OutputFormat = config.target;
    let files = collect_all(inputs, recursive).context("Failed to collect input files")?;

    if files.is_empty() {
        println!("No supported files found.");
        return Ok(());
    }

    let mut descriptors = Vec::with_capacity(files.len());
    for path in &files {
        match read_descriptor(path) {
            Ok(desc) => descriptors.push(desc),
            Err(e) => log::error!("{}", e),
        }
    }

    let mut converter = open_converter(state, config)?;
    let intake = converter.add_files(descriptors);
    if intake.rejected() > 0 {
        println!("Skipped {} unsupported or duplicate file(s).", intake.rejected());
    }
    if converter.queue().is_empty() {
        println!("No supported files found.");
        return Ok(());
    }

    println!(
        "Converting {} file(s) to {}...",
        converter.queue().len(),
        target.extension().to_uppercase()
    );

    let pb = ProgressBar::new(converter.queue().len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█▓░"),
    );

    let run = converter
        .convert_all(|p| {
            pb.set_position(p.completed as u64);
            pb.set_message(format!("{:.0}%", p.percent));
        })
        .await;
    pb.finish_with_message("Done!");

    let bundle = converter.bundle(&run);
    for download in &bundle.downloads {
        write_file(&output.join(&download.name), &download.bytes)?;
    }
    if write_archive {
        if let Some(archive) = &bundle.archive {
            let path = output.join(&archive.name);
            write_file(&path, &archive.bytes)?;
            println!("Archive: {}", path.display());
        } else if let Some(err) = &bundle.archive_error {
            println!("Archive not written: {}", err);
        }
    }

    print_summary(&run);
    Ok(())
}

fn handle_history(state: &Path, clear: bool) -> Result<()> {
    let converter = open_converter(state, ConversionConfig::default())?;
    if clear {
        converter
            .history()
            .clear()
            .context("Failed to clear history")?;
        println!("History cleared.");
        return Ok(());
    }
    let records = converter
        .history()
        .records()
        .context("Failed to read history")?;
    print_history(&records);
    Ok(())
}

fn handle_stats(state: &Path) -> Result<()> {
    let converter = open_converter(state, ConversionConfig::default())?;
    let stats = converter
        .stats()
        .counters()
        .context("Failed to read usage stats")?;
    print_stats(&stats);
    Ok(())
}
