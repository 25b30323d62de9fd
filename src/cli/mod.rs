//! # CLI Module
//!
//! Command-line interface for the photo catalog.
//!
//! ## Usage
//! ```bash
//! # Scan every configured group
//! photo-catalog scan --config scan_targets.yaml
//!
//! # Scan one group, verbose
//! photo-catalog scan --config scan_targets.yaml --group backup --verbose
//!
//! # Compare two catalogued directories
//! photo-catalog compare /lib/EventA /backup/EventA
//!
//! # Classify a whole backup drive against the library
//! photo-catalog classify /lib /mnt/backup --output json
//!
//! # Create sample data to play with
//! photo-catalog generate-test-data --dir ./test_data --clean
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photo_catalog::config::{default_database_path, ScanTargetsConfig};
use photo_catalog::core::catalog::{SessionSelector, SqliteCatalog};
use photo_catalog::core::comparator::{
    ClassificationReport, ClassificationRun, DirectoryComparator, DirectoryComparison, MatchPolicy,
};
use photo_catalog::core::fixtures::generate_sample_library;
use photo_catalog::core::metadata::ExtractorChain;
use photo_catalog::core::session::{CancellationToken, ScanOrchestrator, SessionReport};
use photo_catalog::error::{CatalogError, Result, SessionError};
use photo_catalog::events::{CompareEvent, Event, EventChannel, ScanEvent, SessionEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Photo Catalog - find what your backups already hold
#[derive(Parser, Debug)]
#[command(name = "photo-catalog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan configured target directories into the catalog
    Scan {
        /// Scan targets YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Only scan this target group
        #[arg(short, long)]
        group: Option<String>,

        /// Catalog database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Only scan the top level of each target
        #[arg(long)]
        no_recursive: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compare two catalogued directories
    Compare {
        /// Reference directory
        reference: PathBuf,

        /// Candidate directory
        candidate: PathBuf,

        /// Scan targets YAML file, for the catalog path and export patterns
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Catalog database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Require capture times to agree when both files have one
        #[arg(long)]
        strict_metadata: bool,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Classify every directory under a reference root against candidate roots
    Classify {
        /// Reference root, usually the primary library
        reference: PathBuf,

        /// Candidate roots, usually backup drives
        #[arg(required = true)]
        candidates: Vec<PathBuf>,

        /// Scan targets YAML file, for the catalog path and export patterns
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Catalog database path
        #[arg(long)]
        db: Option<PathBuf>,

        /// Require capture times to agree when both files have one
        #[arg(long)]
        strict_metadata: bool,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Generate a sample photo library
    GenerateTestData {
        /// Where to create the library
        #[arg(long, default_value = "test_data")]
        dir: PathBuf,

        /// Remove the directory first if it exists
        #[arg(long)]
        clean: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            config,
            group,
            db,
            workers,
            no_recursive,
            verbose,
        } => {
            photo_catalog::init_tracing(verbose);
            run_scan(&config, group.as_deref(), db, workers, no_recursive, verbose)
        }
        Commands::Compare {
            reference,
            candidate,
            config,
            db,
            strict_metadata,
            output,
        } => {
            photo_catalog::init_tracing(false);
            let setup = CompareSetup::load(config.as_deref(), db, strict_metadata)?;
            run_compare(&reference, &candidate, &setup, output)
        }
        Commands::Classify {
            reference,
            candidates,
            config,
            db,
            strict_metadata,
            output,
        } => {
            photo_catalog::init_tracing(false);
            let setup = CompareSetup::load(config.as_deref(), db, strict_metadata)?;
            run_classify(&reference, &candidates, &setup, output)
        }
        Commands::GenerateTestData { dir, clean } => {
            photo_catalog::init_tracing(false);
            run_generate(&dir, clean)
        }
    }
}

fn run_scan(
    config_path: &Path,
    group: Option<&str>,
    db: Option<PathBuf>,
    workers: Option<usize>,
    no_recursive: bool,
    verbose: bool,
) -> Result<()> {
    let term = Term::stderr();
    let config = ScanTargetsConfig::load(config_path)?;

    let mut request = config.scan_request(group)?;
    if let Some(workers) = workers {
        request.concurrency = workers;
    }
    if no_recursive {
        request.recursive = false;
    }

    let db_path = db.unwrap_or_else(|| config.database_path());
    let store = Arc::new(SqliteCatalog::open(&db_path)?);

    term.write_line(&format!(
        "{} {}",
        style("Photo Catalog").bold().cyan(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim()
    ))
    .ok();
    term.write_line(&format!(
        "  {} {}",
        style("Catalog:").dim(),
        db_path.display()
    ))
    .ok();
    term.write_line("").ok();

    let orchestrator = ScanOrchestrator::builder(store)
        .extractor(ExtractorChain::standard())
        .build();
    install_interrupt_handler(orchestrator.cancellation_token())?;

    let (sender, receiver) = EventChannel::new();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {pos} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let progress = pb.clone();
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Session(SessionEvent::StateChanged { state }) => {
                    progress.set_message(format!("{}", state));
                }
                Event::Scan(ScanEvent::TargetStarted { path, group }) => {
                    progress.println(format!(
                        "{} {} {}",
                        style("→").cyan(),
                        path.display(),
                        style(format!("[{}]", group)).dim()
                    ));
                }
                Event::Scan(ScanEvent::Progress(p)) => {
                    progress.set_position(p.files_processed);
                    if verbose {
                        progress.set_message(format!(
                            "{:.1} files/s {}",
                            p.files_per_second,
                            p.current_path.display()
                        ));
                    }
                }
                Event::Scan(ScanEvent::FileFailed { path, message }) if verbose => {
                    progress.println(format!(
                        "  {} {}: {}",
                        style("!").yellow(),
                        path.display(),
                        message
                    ));
                }
                Event::Session(SessionEvent::Completed { .. })
                | Event::Session(SessionEvent::Failed { .. }) => {
                    progress.finish_and_clear();
                }
                _ => {}
            }
        }
    });

    let result = orchestrator.run_with_events(&request, &sender);

    drop(sender);
    event_thread.join().ok();
    pb.finish_and_clear();

    let report = result?;
    print_session(&term, &report);

    if report.is_completed() {
        Ok(())
    } else {
        Err(SessionError::Fatal {
            session_id: report.session.id.clone(),
            cause: report.failure_cause().unwrap_or("unknown").to_string(),
        }
        .into())
    }
}

/// Ctrl-C and SIGTERM interrupt the session instead of killing the process,
/// so it is finalized as failed with its counters flushed
fn install_interrupt_handler(token: CancellationToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if !token.is_cancelled() {
            warn!("Interrupt received, finishing the session");
        }
        token.cancel();
    })
    .map_err(|e| CatalogError::Io(std::io::Error::other(e)))
}

fn print_session(term: &Term, report: &SessionReport) {
    let session = &report.session;
    let counts = &session.counts;

    let headline = if report.is_completed() {
        format!("{} Scan Complete", style("✓").green().bold())
    } else {
        format!(
            "{} Scan Failed: {}",
            style("✗").red().bold(),
            report.failure_cause().unwrap_or("unknown")
        )
    };
    term.write_line(&headline).ok();
    term.write_line("").ok();

    term.write_line(&format!("  {} {}", style("Session:").dim(), session.id))
        .ok();
    term.write_line(&format!(
        "  {} files catalogued ({} failed, {} skipped) in {:.1}s",
        style(counts.files_succeeded).cyan(),
        style(counts.files_failed).yellow(),
        counts.files_skipped,
        session.metrics.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} directories, {}",
        style(counts.directories_processed).cyan(),
        style(format_bytes(counts.bytes_processed)).yellow()
    ))
    .ok();
    if session.metrics.extraction_fallbacks > 0 || session.metrics.extraction_failures > 0 {
        term.write_line(&format!(
            "  {} metadata fallbacks, {} files without metadata",
            session.metrics.extraction_fallbacks, session.metrics.extraction_failures
        ))
        .ok();
    }

    term.write_line("").ok();
    for target in &report.targets {
        term.write_line(&format!(
            "  {} {} {} files, {} directories",
            style(format!("[{}]", target.group)).dim(),
            target.path.display(),
            target.files_processed,
            target.directories
        ))
        .ok();
    }
}

/// Catalog and comparator shared by `compare` and `classify`
struct CompareSetup {
    store: SqliteCatalog,
    comparator: DirectoryComparator,
}

impl CompareSetup {
    fn load(config: Option<&Path>, db: Option<PathBuf>, strict_metadata: bool) -> Result<Self> {
        let config = config.map(ScanTargetsConfig::load).transpose()?;

        let db_path = db.unwrap_or_else(|| {
            config
                .as_ref()
                .map(ScanTargetsConfig::database_path)
                .unwrap_or_else(default_database_path)
        });

        let policy = if strict_metadata {
            MatchPolicy::CorroborateCaptureTime
        } else {
            MatchPolicy::NameAndSize
        };
        let mut comparator = DirectoryComparator::new().with_policy(policy);
        if let Some(config) = &config {
            comparator = comparator.with_export_patterns(&config.settings.export_patterns)?;
        }

        Ok(Self {
            store: SqliteCatalog::open(&db_path)?,
            comparator,
        })
    }
}

fn run_compare(
    reference: &Path,
    candidate: &Path,
    setup: &CompareSetup,
    output: OutputFormat,
) -> Result<()> {
    let result = setup.comparator.compare_directories(
        &setup.store,
        reference,
        candidate,
        &SessionSelector::Latest,
    )?;

    match output {
        OutputFormat::Pretty => print_comparison(&Term::stdout(), &result),
        OutputFormat::Json => print_json(&result)?,
    }
    Ok(())
}

fn print_comparison(term: &Term, result: &DirectoryComparison) {
    let c = &result.comparison;
    term.write_line(&format!(
        "{} {} {}",
        result.reference.path.display(),
        style("vs").dim(),
        result.candidate.path.display()
    ))
    .ok();
    term.write_line(&format!(
        "  {} {}%",
        style(c.class).yellow().bold(),
        c.match_percentage
    ))
    .ok();
    term.write_line(&format!(
        "  {} matched of {} reference / {} candidate files ({} extra, {} missing, {} in export folders)",
        c.matched, c.reference_count, c.candidate_count, c.extra, c.missing, c.excluded
    ))
    .ok();
}

fn run_classify(
    reference: &Path,
    candidates: &[PathBuf],
    setup: &CompareSetup,
    output: OutputFormat,
) -> Result<()> {
    let run = ClassificationRun::new(&setup.store, setup.comparator.clone());

    let (sender, receiver) = EventChannel::new();
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );

    let progress = pb.clone();
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Compare(CompareEvent::Started { pairs, .. }) => {
                    progress.set_length(pairs as u64);
                }
                Event::Compare(CompareEvent::PairClassified { reference, .. }) => {
                    progress.inc(1);
                    progress.set_message(reference.display().to_string());
                }
                Event::Compare(CompareEvent::Completed { .. }) => progress.finish_and_clear(),
                _ => {}
            }
        }
    });

    let result = run.run_with_events(reference, candidates, &sender);
    drop(sender);
    event_thread.join().ok();
    pb.finish_and_clear();

    let report = result?;
    match output {
        OutputFormat::Pretty => print_classification(&Term::stdout(), &report),
        OutputFormat::Json => print_json(&report)?,
    }
    Ok(())
}

fn print_classification(term: &Term, report: &ClassificationReport) {
    term.write_line(&format!(
        "{} {} pairs compared, {} duplicates",
        style("✓").green().bold(),
        report.pairs_compared(),
        style(report.relations.len()).cyan()
    ))
    .ok();
    term.write_line(&format!("  {} {}", style("Run:").dim(), report.run_id))
        .ok();
    term.write_line("").ok();

    if !report.relations.is_empty() {
        term.write_line(&format!("{}", style("Duplicates:").bold().underlined()))
            .ok();
        for pair in &report.relations {
            term.write_line(&format!(
                "  {:<14} {:>4}%  {} -> {}",
                style(pair.comparison.class).yellow(),
                pair.comparison.match_percentage,
                pair.reference.display(),
                pair.candidate.display()
            ))
            .ok();
        }
        term.write_line("").ok();
    }

    if !report.unique_directories.is_empty() {
        term.write_line(&format!(
            "{}",
            style("Only in the reference:").bold().underlined()
        ))
        .ok();
        for path in &report.unique_directories {
            term.write_line(&format!("  {}", path.display())).ok();
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CatalogError::Io(std::io::Error::other(e)))?;
    println!("{}", json);
    Ok(())
}

fn run_generate(dir: &Path, clean: bool) -> Result<()> {
    let term = Term::stderr();
    let library = generate_sample_library(dir, clean)?;

    term.write_line(&format!(
        "{} Created {} files in {} directories ({})",
        style("✓").green().bold(),
        library.files,
        library.directories,
        format_bytes(library.bytes)
    ))
    .ok();
    term.write_line(&format!(
        "  Scan it with: photo-catalog scan --config {}",
        library.config_path.display()
    ))
    .ok();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
