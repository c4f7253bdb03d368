//! imgdupe - duplicate image finder
//!
//! Builds a content-addressed SQLite index of a source-of-truth image tree
//! and classifies the images of a second tree as duplicates, ambiguous
//! near-matches or new files to migrate.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod index;
pub mod logging;
pub mod output;
pub mod progress;
pub mod reorganize;
pub mod scanner;
pub mod signal;

use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use cli::{ClassifyArgs, Cli, Commands, IndexArgs, ReorganizeArgs, ReportArgs, WalkArgs};
use config::Config;
use duplicates::{ClassificationReport, Policy, ScanConfig};
use error::ExitCode;
use index::{DuplicateIndex, IndexStats};
use output::{DupesReport, IndexReport, ReportKind, TextSummary};
use progress::{Progress, ProgressCallback};
use reorganize::{ReorganizeReport, Reorganizer};
use scanner::WalkerConfig;
use signal::ShutdownHandler;

/// Settings shared by every command once CLI flags and config are merged.
struct AppContext {
    config: Config,
    shutdown: ShutdownHandler,
    progress: Option<Arc<dyn ProgressCallback>>,
    quiet: bool,
    color: bool,
}

/// Run the application for parsed arguments.
///
/// # Errors
///
/// Returns an error for fatal conditions: invalid configuration, a missing
/// source or target directory, an index that cannot be opened, or an
/// interrupted scan.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    if let Some(table) = cli.table {
        config.table = table;
    }
    if let Some(threads) = cli.io_threads {
        config.io_threads = usize::from(threads);
    }

    let show_progress = !(cli.quiet || cli.no_progress);
    let ctx = AppContext {
        config,
        shutdown: signal::install_handler(),
        progress: show_progress.then(|| Arc::new(Progress::new(false)) as Arc<dyn ProgressCallback>),
        quiet: cli.quiet,
        color: !cli.no_color && std::io::stdout().is_terminal(),
    };

    match cli.command {
        Commands::Index(args) => run_index(ctx, args),
        Commands::Classify(args) => run_classify(ctx, args),
        Commands::Reorganize(args) => run_reorganize(ctx, args),
    }
}

fn apply_walk_args(config: &mut Config, walk: WalkArgs) {
    config.follow_symlinks |= walk.follow_symlinks;
    config.skip_hidden |= walk.skip_hidden;
    config.ignore_patterns.extend(walk.ignore_patterns);
}

fn apply_scan_args(config: &mut Config, fast: bool, no_perceptual: bool, report: &ReportArgs) {
    if fast {
        config.policy = Policy::Fast;
    }
    if no_perceptual {
        config.compute_perceptual = false;
    }
    if let Some(ref dir) = report.report_dir {
        config.report_dir.clone_from(dir);
    }
}

fn walker_config(config: &Config) -> WalkerConfig {
    WalkerConfig::new(
        config.follow_symlinks,
        config.skip_hidden,
        config.ignore_patterns.clone(),
    )
}

fn scan_config(ctx: &AppContext) -> ScanConfig {
    let mut scan = ScanConfig::default()
        .with_io_threads(ctx.config.io_threads)
        .with_policy(ctx.config.policy)
        .with_perceptual(ctx.config.compute_perceptual)
        .with_walker_config(walker_config(&ctx.config))
        .with_shutdown_flag(ctx.shutdown.get_flag());
    if let Some(ref progress) = ctx.progress {
        scan = scan.with_progress_callback(Arc::clone(progress));
    }
    scan
}

fn open_index(config: &Config) -> anyhow::Result<DuplicateIndex> {
    config.validate()?;
    if let Some(parent) = config.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create index directory {}", parent.display()))?;
    }
    let index = DuplicateIndex::open(&config.database, &config.table)?;
    log::debug!(
        "Using index {} (table {})",
        config.database.display(),
        index.table()
    );
    Ok(index)
}

/// Success when something was found, `PartialSuccess` when files failed.
fn scan_exit_code(report: &ClassificationReport, found: bool) -> ExitCode {
    if report.failed_count() > 0 {
        ExitCode::PartialSuccess
    } else if found {
        ExitCode::Success
    } else {
        ExitCode::NothingFound
    }
}

fn build(
    ctx: &AppContext,
    source: &Path,
    index: &DuplicateIndex,
) -> anyhow::Result<(ClassificationReport, IndexStats)> {
    let (report, stats) = duplicates::build_index(source, index, scan_config(ctx))
        .with_context(|| format!("Indexing {} failed", source.display()))?;
    log::info!(
        "Index holds {} images ({} types, {} bytes)",
        stats.total_images,
        stats.image_types,
        stats.total_size
    );
    Ok((report, stats))
}

fn run_index(mut ctx: AppContext, args: IndexArgs) -> anyhow::Result<ExitCode> {
    apply_walk_args(&mut ctx.config, args.walk);
    apply_scan_args(&mut ctx.config, args.fast, args.no_perceptual, &args.report);
    duplicates::check_root(&args.source)?;

    let index = open_index(&ctx.config)?;
    let (report, stats) = build(&ctx, &args.source, &index)?;
    let code = scan_exit_code(&report, stats.total_images > 0);

    if !args.report.no_report {
        let json = IndexReport::new(&report, &stats, code);
        output::write_report(&ctx.config.report_dir, ReportKind::GenDatabase, today(), &json)?;
    }
    if !ctx.quiet {
        let mut stdout = std::io::stdout().lock();
        TextSummary::new(ctx.color, args.report.detailed).write_index(&mut stdout, &report, &stats)?;
        stdout.flush()?;
    }
    Ok(code)
}

fn run_classify(mut ctx: AppContext, args: ClassifyArgs) -> anyhow::Result<ExitCode> {
    apply_walk_args(&mut ctx.config, args.walk);
    apply_scan_args(&mut ctx.config, args.fast, args.no_perceptual, &args.report);

    // Both trees must exist before the source is ingested
    duplicates::check_root(&args.target)?;
    if let Some(source) = args.source.as_deref().filter(|_| !args.skip_index) {
        duplicates::check_root(source)?;
    }

    if args.skip_index && !ctx.config.database.exists() {
        log::warn!(
            "Index {} does not exist yet; every image will be reported as new",
            ctx.config.database.display()
        );
    }
    let index = open_index(&ctx.config)?;

    match (args.skip_index, args.source.as_deref()) {
        (false, Some(source)) => {
            build(&ctx, source, &index)?;
        }
        _ => log::info!("Skipping index rebuild"),
    }

    let report = duplicates::classify(&args.target, &index, scan_config(&ctx))
        .with_context(|| format!("Classifying {} failed", args.target.display()))?;
    let found = report.duplicate_count() + report.ambiguous_count() > 0;
    let code = scan_exit_code(&report, found);

    if !args.report.no_report {
        let json = DupesReport::new(&report, ctx.config.policy, code);
        output::write_report(&ctx.config.report_dir, ReportKind::FindDupes, today(), &json)?;
    }
    if !ctx.quiet {
        let mut stdout = std::io::stdout().lock();
        TextSummary::new(ctx.color, args.report.detailed).write_classification(
            &mut stdout,
            &report,
            ctx.config.policy,
        )?;
        stdout.flush()?;
    }
    Ok(code)
}

fn run_reorganize(mut ctx: AppContext, args: ReorganizeArgs) -> anyhow::Result<ExitCode> {
    apply_walk_args(&mut ctx.config, args.walk);

    let mut reorganizer = Reorganizer::new()
        .with_walker_config(walker_config(&ctx.config))
        .with_shutdown_flag(ctx.shutdown.get_flag());
    if let Some(ref progress) = ctx.progress {
        reorganizer = reorganizer.with_progress_callback(Arc::clone(progress));
    }

    let report = reorganizer
        .reorganize(&args.source, &args.dest)
        .with_context(|| format!("Reorganizing {} failed", args.source.display()))?;

    if !ctx.quiet {
        print_reorganize_summary(&report)?;
    }
    Ok(if !report.failed.is_empty() {
        ExitCode::PartialSuccess
    } else if report.copied.is_empty() {
        ExitCode::NothingFound
    } else {
        ExitCode::Success
    })
}

fn print_reorganize_summary(report: &ReorganizeReport) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "Reorganize complete")?;
    writeln!(stdout, "  Copied:         {}", report.copied.len())?;
    writeln!(stdout, "  No date:        {}", report.undated.len())?;
    writeln!(stdout, "  Not images:     {}", report.not_images.len())?;
    writeln!(stdout, "  Already there:  {}", report.existing.len())?;
    writeln!(stdout, "  Failed:         {}", report.failed.len())?;
    writeln!(stdout, "  Elapsed:        {:.2}s", report.elapsed.as_secs_f64())
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
