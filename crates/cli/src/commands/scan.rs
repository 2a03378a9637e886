use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use photoindex_core::domain::ScanMode;
use photoindex_core::exiftool::{check_installed, ExifTool};
use photoindex_core::{FileOutcome, Library, ScanOptions, ScanProgress};
use tracing::debug;

fn active_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {prefix:.dim} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("  {bar:30.green} {prefix:.green} {msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn root_display_name(root: &std::path::Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string())
}

pub fn run(
    library: &Library,
    folder: Option<PathBuf>,
    mode: ScanMode,
    thumbnails: bool,
    regions: bool,
) -> Result<()> {
    let program = library.exiftool_path()?;
    let version = check_installed(&program)
        .with_context(|| format!("`{program}` is required; install exiftool or run `photoindex tool <path>`"))?;
    debug!(%program, %version, "metadata tool found");

    let tool = ExifTool::spawn_lazy(&program);
    let options = ScanOptions {
        mode,
        root_filter: folder,
        thumbnails,
        regions,
        ..Default::default()
    };

    let mp = MultiProgress::new();
    let mut active_pb: Option<ProgressBar> = None;

    let report = library.scan(
        &tool,
        &options,
        Some(&mut |progress| match progress {
            ScanProgress::RootStart { root, file_count } => {
                if let Some(pb) = active_pb.take() {
                    pb.finish_and_clear();
                    mp.remove(&pb);
                }
                mp.println(format!(
                    "  Scanning {} ({} files, {} mode)",
                    root_display_name(&root),
                    file_count,
                    mode
                ))
                .ok();

                let pb = mp.add(ProgressBar::new(file_count as u64));
                pb.set_style(active_style());
                pb.set_prefix("Indexing");
                pb.enable_steady_tick(Duration::from_millis(80));
                active_pb = Some(pb);
            }
            ScanProgress::FileProcessed { path, outcome } => {
                if let Some(ref pb) = active_pb {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    if outcome == FileOutcome::Error {
                        mp.println(format!("  ! {}", path.display())).ok();
                    }
                    pb.set_message(name);
                    pb.inc(1);
                }
            }
            ScanProgress::Removed { path } => {
                mp.println(format!("  - {}", path.display())).ok();
            }
            ScanProgress::BatchComplete { batch } => {
                if let Some(pb) = active_pb.take() {
                    pb.set_style(done_style());
                    pb.set_prefix("done");
                    pb.finish_with_message(format!(
                        "{} in {}",
                        batch.counters,
                        batch.summary.as_deref().unwrap_or("-")
                    ));
                }
                if batch.warning {
                    mp.println("  Warning: file counts do not add up, some files may have been missed.")
                        .ok();
                }
            }
            ScanProgress::RootFailed { root, message } => {
                if let Some(pb) = active_pb.take() {
                    pb.abandon_with_message("interrupted");
                }
                mp.println(format!("  ! {} ended early: {message}", root_display_name(&root)))
                    .ok();
            }
        }),
    )?;

    if report.batches.is_empty() && report.failures.is_empty() {
        match &options.root_filter {
            Some(folder) => println!("No registered root matches {}.", folder.display()),
            None => println!("No roots registered. Add one with `photoindex roots add <path>`."),
        }
    }

    tool.shutdown()?;
    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} root(s) could not be scanned completely; rerun `photoindex scan` to resume",
            report.failures.len()
        );
    }
    Ok(())
}

/// Store a program path, or print the configured one with its version.
pub fn tool(library: &Library, program: Option<String>) -> Result<()> {
    if let Some(program) = program {
        library.set_exiftool_path(&program)?;
    }
    let program = library.exiftool_path()?;
    match check_installed(&program) {
        Ok(version) => println!("{program} (version {version})"),
        Err(e) => println!("{program}: {e}"),
    }
    Ok(())
}
