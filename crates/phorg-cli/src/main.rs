use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

use phorg_core::{
    sweep, CancellationToken, Config, ExifExtractor, ExiftoolExtractor, KeepPolicy, MetadataExtractor,
    NoMetadata, OrganizeOptions, Progress, SweepOptions, TransferMode,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Extractor {
    /// Built-in EXIF reader
    Exif,
    /// External `exiftool` binary (reads shutter counts from maker notes)
    Exiftool,
    /// No metadata; dates come from file names and timestamps only
    None,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Keep {
    /// Most recently modified copy
    Newest,
    /// Least recently modified copy
    Oldest,
    /// Name without a `_N` suffix, then the longest name
    LongestName,
}

impl From<Keep> for KeepPolicy {
    fn from(keep: Keep) -> Self {
        match keep {
            Keep::Newest => KeepPolicy::Newest,
            Keep::Oldest => KeepPolicy::Oldest,
            Keep::LongestName => KeepPolicy::LongestName,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List groups of identical files under DIR, optionally deleting extras
    Dedup {
        dir: PathBuf,

        /// Delete every copy except the one picked by --keep
        #[arg(long)]
        remove: bool,

        /// Which copy survives
        #[arg(long, value_enum, default_value_t = Keep::Newest)]
        keep: Keep,

        /// Rename `.jpeg` files to `.jpg` first
        #[arg(long)]
        fix_extensions: bool,

        /// Do not ask before deleting
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Parser)]
#[command(
    name = "phorg",
    version,
    about = "Sort photos into a date-partitioned tree with canonical names",
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory to organize
    #[arg(required_unless_present = "print_config")]
    input: Option<PathBuf>,

    /// Output root
    #[arg(required_unless_present = "print_config")]
    output: Option<PathBuf>,

    /// JSON config file (missing keys keep their defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Copy files instead of moving them
    #[arg(long)]
    copy: bool,

    /// Decide and report, but do not touch any file
    #[arg(long)]
    dry_run: bool,

    /// Leave duplicate files in the input directory
    #[arg(long)]
    keep_duplicates: bool,

    /// Do not register files already in the output before the run
    #[arg(long)]
    no_seed: bool,

    /// Keep input directories that end up empty
    #[arg(long)]
    no_prune: bool,

    /// Metadata backend
    #[arg(long, value_enum, default_value_t = Extractor::Exif)]
    extractor: Extractor,

    /// Write the full run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the effective config as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn build_extractor(kind: Extractor, config: &Config) -> Arc<dyn MetadataExtractor> {
    let tags = config.shutter_count_tags.clone();
    match kind {
        Extractor::Exif => Arc::new(ExifExtractor::new(tags)),
        Extractor::Exiftool => Arc::new(ExiftoolExtractor::new(
            tags,
            Duration::from_secs(config.extraction_timeout_secs),
        )),
        Extractor::None => Arc::new(NoMetadata),
    }
}

fn run_dedup(dir: PathBuf, remove: bool, keep: Keep, fix_extensions: bool, yes: bool) -> anyhow::Result<()> {
    let t_total = Instant::now();
    let options = SweepOptions {
        keep: keep.into(),
        fix_extensions,
    };
    let mut report = sweep::find_duplicates(&dir, &options)?;
    if report.groups.is_empty() {
        eprintln!("No duplicate files found ({} scanned)", report.scanned);
        return Ok(());
    }

    for group in &report.groups {
        println!("\nDuplicate files (sha256 {}, {} bytes):", group.hash, group.size);
        for (i, file) in group.files.iter().enumerate() {
            let role = if i == 0 { "keep " } else { "extra" };
            let modified = file
                .modified
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("  [{role}] {} (modified {modified})", file.path.display());
        }
    }

    if remove {
        let confirmed = yes
            || Confirm::new()
                .with_prompt(format!("Remove {} duplicate files?", report.extra_count()))
                .default(false)
                .interact()?;
        if !confirmed {
            eprintln!("Nothing removed");
            return Ok(());
        }
        sweep::remove_extras(&mut report);
    }

    eprintln!("Done! {} ({:.2}s)", report.summary(), t_total.elapsed().as_secs_f64());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Some(Command::Dedup {
        dir,
        remove,
        keep,
        fix_extensions,
        yes,
    }) = cli.command
    {
        return run_dedup(dir, remove, keep, fix_extensions, yes);
    }
    let t_total = Instant::now();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let (Some(input), Some(output)) = (cli.input, cli.output) else {
        anyhow::bail!("INPUT and OUTPUT are required");
    };

    let extractor = build_extractor(cli.extractor, &config);
    let mut options = OrganizeOptions::new(input, output)
        .with_mode(if cli.copy { TransferMode::Copy } else { TransferMode::Move })
        .with_config(config);
    options.dry_run = cli.dry_run;
    options.keep_duplicates = cli.keep_duplicates;
    options.seed_from_output = !cli.no_seed;
    options.prune_empty_dirs = !cli.no_prune;

    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupted, finishing current files...");
            token.cancel();
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    let progress_bar = bar.clone();
    let progress = move |p: Progress| {
        progress_bar.set_length(p.total);
        progress_bar.set_position(p.done.min(p.total));
        progress_bar.set_message(p.stage.describe());
    };

    let result = phorg_core::organize(&options, extractor, &progress, Some(&token));
    bar.finish_and_clear();
    let report = result?;

    for problem in report.problems() {
        log::warn!(
            "{}: {}",
            problem.source.display(),
            problem.reason.as_deref().unwrap_or("unknown")
        );
    }
    if let Some(path) = &cli.report {
        report.write_json(path)?;
        eprintln!("Report written to {}", path.display());
    }

    log::info!("By category: {}", report.category_breakdown());
    eprintln!(
        "Done! {} ({} pre-existing, {} empty dirs pruned) ({:.2}s)",
        report.summary(),
        report.seeded,
        report.pruned_dirs,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
