//! Run a sync against the configured library

use crate::host::{CommandTranscoder, DirectoryLibrary, FolderArtwork};
use crate::system_config;
use anyhow::{Context, Result};
use engine::{Callbacks, Mirror, RunReport, RunStatus};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

/// Exit status after Ctrl-C, as shells report SIGINT
const EXIT_CANCELLED: u8 = 130;

pub async fn run(config_path: Option<&Path>, dry_run: bool, workers: Option<usize>) -> Result<ExitCode> {
    // 1. Load and validate configuration
    let mut config = system_config::load(config_path)?;
    if let Some(workers) = workers {
        config.sync.workers = workers;
    }
    config.validate().context("Invalid configuration")?;

    // 2. Scan the library
    let library = Arc::new(DirectoryLibrary::new(
        &config.library.source,
        config.library.extensions.clone(),
        config.sync.conversion.clone(),
    ));
    let found = library.scan()?;

    // 3. Wire up host capabilities
    let mut mirror = Mirror::new(config.sync.clone(), library);
    match &config.transcoder.command {
        Some(command) => {
            let transcoder = CommandTranscoder::new(command).context("transcoder.command is empty")?;
            mirror = mirror.with_transcoder(Arc::new(transcoder));
        }
        None if !config.sync.conversion.filetypes.is_empty() => {
            warn!("No transcoder configured; convertible files will be skipped");
        }
        None => {}
    }
    if config.sync.cover.enabled {
        let artwork = FolderArtwork::spawn(config.artwork.names.clone())
            .context("Failed to start artwork lookup thread")?;
        mirror = mirror.with_artwork(Arc::new(artwork));
    }
    let mirror = Arc::new(mirror);

    if dry_run {
        println!("{}", "Dry run: no files will be touched".yellow());
    }

    // 4. Run on a blocking thread, cancelling on Ctrl-C
    let bar = progress_bar(dry_run)?;
    let callbacks = callbacks(&bar);
    let mut task = {
        let mirror = Arc::clone(&mirror);
        tokio::task::spawn_blocking(move || mirror.run(dry_run, &callbacks))
    };

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            bar.println(format!("{}", "Cancelling...".yellow()));
            let canceller = Arc::clone(&mirror);
            tokio::task::spawn_blocking(move || canceller.cancel())
                .await
                .context("Cancel task panicked")?;
            task.await
        }
    };
    bar.finish_and_clear();
    let report = joined.context("Sync task panicked")??;

    // 5. Summary
    print_report(&report, found, &config.sync.root);

    let code = match report.status {
        RunStatus::Cancelled => ExitCode::from(EXIT_CANCELLED),
        RunStatus::Completed if report.execution.failed > 0 => ExitCode::FAILURE,
        RunStatus::Completed => ExitCode::SUCCESS,
    };
    Ok(code)
}

fn progress_bar(dry_run: bool) -> Result<ProgressBar> {
    // Dry runs print every planned action through the log instead
    if dry_run {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg:12} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("=> "),
    );
    bar.set_message("Planning");
    Ok(bar)
}

fn callbacks(bar: &ProgressBar) -> Callbacks {
    let gathered = bar.clone();
    let queued = bar.clone();
    let complete = bar.clone();
    let finished = bar.clone();

    Callbacks {
        on_sources_gathered: Some(Box::new(move |count| {
            gathered.set_message(format!("Planning {}", count));
        })),
        on_job_queued: Some(Box::new(move |_job| queued.inc_length(1))),
        on_queueing_complete: Some(Box::new(move |count| {
            complete.set_length(count as u64);
            complete.set_message("Syncing");
        })),
        on_job_finished: Some(Box::new(move |job, success| {
            if !success {
                finished.println(format!("{} {}", "✗".red(), job.spec()));
            }
            finished.inc(1);
        })),
    }
}

fn print_report(report: &RunReport, found: usize, root: &Path) {
    let queue = &report.queue;
    let execution = &report.execution;

    println!();
    match (report.dry, report.status) {
        (true, _) => println!("{}", "Dry run summary".bold()),
        (false, RunStatus::Completed) => println!("{}", "Sync complete".bold()),
        (false, RunStatus::Cancelled) => println!("{}", "Sync cancelled".yellow().bold()),
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("Destination:   {}", root.display().to_string().cyan());
    if !report.dry {
        println!("Generation:    {}", report.generation);
    }
    println!("Library:       {} files ({} distinct)", found, queue.sources);
    println!("Up to date:    {}", queue.skipped);
    println!("Queued:        {}", queue.queued);

    if queue.missing_sources > 0 {
        println!("Missing:       {}", queue.missing_sources.to_string().yellow());
    }
    if queue.conversion_unavailable > 0 {
        println!(
            "Not converted: {} {}",
            queue.conversion_unavailable.to_string().yellow(),
            "(no transcoder configured)".dimmed()
        );
    }
    if queue.cover_lookups > 0 {
        println!(
            "Covers:        {} lookups, {} timed out",
            queue.cover_lookups, queue.cover_timeouts
        );
    }
    if queue.unreferenced > 0 {
        println!("Unreferenced:  {}", queue.unreferenced);
    }

    if report.dry {
        println!("Planned:       {}", execution.succeeded);
        return;
    }

    println!();
    println!("  {} {}", "✓".green(), format!("{} succeeded", execution.succeeded).green());
    if execution.failed > 0 {
        println!("  {} {}", "✗".red(), format!("{} failed", execution.failed).red());
    }
    if execution.aborted > 0 {
        println!("  {} {}", "○".yellow(), format!("{} aborted", execution.aborted).yellow());
    }
}
