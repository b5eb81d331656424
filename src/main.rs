//! mediascan - media inventory and storage-capacity scanner.
//!
//! Usage:
//!   mediascan scan [ROOTS]...   Stream file records and volume capacity
//!   mediascan probe FILE        Probe a single file
//!   mediascan mounts            List mounted volumes
//!   mediascan --help            Show help

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use mediascan_core::{FileInfo, MountPoint, ScanEvent, ScanOptions, ScanSummary, ScanWarning};
use mediascan_probe::{MEDIA_EXTENSIONS, probe_file};
use mediascan_scan::{MediaScanner, list_mounts};

#[derive(Parser)]
#[command(
    name = "mediascan",
    version,
    about = "Media inventory and storage-capacity scanner",
    long_about = "mediascan walks directory trees, reads container metadata from \
                  every file it finds and reports the capacity of each volume \
                  those files live on."
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan directories and stream results
    Scan {
        /// Roots to scan
        #[arg(default_value = ".")]
        roots: Vec<PathBuf>,

        /// Number of concurrent probe workers
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Only scan files with this extension (repeatable)
        #[arg(short, long = "include", value_name = "EXT")]
        include: Vec<String>,

        /// Skip files with this extension (repeatable)
        #[arg(short = 'x', long = "exclude", value_name = "EXT")]
        exclude: Vec<String>,

        /// Only scan well-known media extensions
        #[arg(short, long)]
        media_only: bool,

        /// Follow symbolic links
        #[arg(short = 'L', long)]
        follow_symlinks: bool,

        /// Skip hidden files and directories
        #[arg(long)]
        no_hidden: bool,

        /// Maximum directory depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Per-file probe timeout in seconds
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<f64>,

        /// Load scan options from a JSON file; flags override it
        #[arg(short, long, value_name = "FILE")]
        options: Option<PathBuf>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Probe a single file
    Probe {
        /// File to probe
        file: PathBuf,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// List mounted volumes and their capacity
    Mounts {
        /// Print volumes as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Scan flags gathered from the command line.
struct ScanArgs {
    jobs: Option<usize>,
    include: Vec<String>,
    exclude: Vec<String>,
    media_only: bool,
    follow_symlinks: bool,
    no_hidden: bool,
    depth: Option<usize>,
    timeout: Option<f64>,
    options: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan {
            roots,
            jobs,
            include,
            exclude,
            media_only,
            follow_symlinks,
            no_hidden,
            depth,
            timeout,
            options,
            json,
        } => {
            let args = ScanArgs {
                jobs,
                include,
                exclude,
                media_only,
                follow_symlinks,
                no_hidden,
                depth,
                timeout,
                options,
            };
            let options = build_options(args)?;
            run_scan(roots, options, json)?;
        }
        Command::Probe { file, json } => {
            run_probe(&file, json)?;
        }
        Command::Mounts { json } => {
            run_mounts(json)?;
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays clean for results.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Merge an optional options file with command-line flags.
fn build_options(args: ScanArgs) -> Result<ScanOptions> {
    let base = match &args.options {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<ScanOptions>(&text)
                .with_context(|| format!("Invalid options file {}", path.display()))?
        }
        None => ScanOptions::default(),
    };

    let mut include: BTreeSet<String> = base.include_extensions;
    include.extend(args.include);
    if args.media_only {
        include.extend(MEDIA_EXTENSIONS.iter().map(|e| e.to_string()));
    }
    let mut exclude: BTreeSet<String> = base.exclude_extensions;
    exclude.extend(args.exclude);

    let probe_timeout = match args.timeout {
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => bail!("Invalid timeout: {secs}"),
        None => base.probe_timeout,
    };

    let options = ScanOptions::builder()
        .max_concurrency(args.jobs.unwrap_or(base.max_concurrency))
        .include_extensions(include)
        .exclude_extensions(exclude)
        .follow_symlinks(args.follow_symlinks || base.follow_symlinks)
        .include_hidden(base.include_hidden && !args.no_hidden)
        .max_depth(args.depth.or(base.max_depth))
        .ignore_patterns(base.ignore_patterns)
        .probe_timeout(probe_timeout)
        .event_buffer(base.event_buffer)
        .build()
        .context("Invalid scan options")?;

    Ok(options)
}

/// Run a scan and print events as they arrive.
fn run_scan(roots: Vec<PathBuf>, options: ScanOptions, json: bool) -> Result<()> {
    tracing::debug!(?options, "scan options");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(stream_scan(roots, options, json))
}

async fn stream_scan(roots: Vec<PathBuf>, options: ScanOptions, json: bool) -> Result<()> {
    let scanner = MediaScanner::new();
    let mut handle = scanner.scan(&roots, &options).context("Scan failed")?;

    if !json {
        for root in &roots {
            eprintln!("Scanning {}...", root.display());
        }
    }

    while let Some(event) = handle.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event);
        }
        if event.is_terminal() {
            break;
        }
    }

    Ok(())
}

fn print_event(event: &ScanEvent) {
    match event {
        ScanEvent::FileInfoReady { file, .. } => print_file(file),
        ScanEvent::MountPointReady { mount } => print_mount(mount),
        ScanEvent::Warning { warning } => print_warning(warning),
        ScanEvent::Done { summary } => print_summary("Done", summary),
        ScanEvent::Cancelled { summary } => print_summary("Cancelled", summary),
    }
}

fn print_file(file: &FileInfo) {
    let mut details = Vec::new();
    if !file.format.is_empty() {
        details.push(file.format.to_string());
    }
    if !file.codec.is_empty() {
        details.push(file.codec.to_string());
    }
    if file.has_video() {
        details.push(format!("{}x{}", file.width, file.height));
    }
    if file.duration > 0.0 {
        details.push(format_duration(file.duration));
    }

    println!(
        "{:<60} {:>10}  {}",
        truncate(&file.path.display().to_string(), 60),
        format_size(file.size),
        details.join(" ")
    );
}

fn print_mount(mount: &MountPoint) {
    if mount.is_known() {
        println!(
            "volume {}: {} used of {} ({:.1}%), {} free",
            mount.path.display(),
            format_size(mount.used),
            format_size(mount.total),
            mount.usage_ratio() * 100.0,
            format_size(mount.available)
        );
    } else {
        println!("volume {}: capacity unknown", mount.path.display());
    }
}

fn print_warning(warning: &ScanWarning) {
    eprintln!("warning: {}: {}", warning.path.display(), warning.message);
}

fn print_summary(label: &str, summary: &ScanSummary) {
    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {label}: {} files ({}), {} volume(s)",
        summary.files,
        format_size(summary.bytes),
        summary.mounts
    );
    println!(
        " Scanned in {:.2}s ({:.0} files/s)",
        summary.elapsed.as_secs_f64(),
        summary.files_per_second()
    );
    if summary.warnings > 0 {
        println!(" {} warning(s) during scan", summary.warnings);
    }
    println!("{}", "─".repeat(60));
}

/// Probe one file. Probe failures print the partial record, if any.
fn run_probe(path: &Path, json: bool) -> Result<()> {
    let (file, warning) = match probe_file(path) {
        Ok(file) => (Some(file), None),
        Err(e) => {
            let warning = e.to_warning();
            (e.into_partial(), Some(warning))
        }
    };

    if let Some(warning) = &warning {
        print_warning(warning);
    }
    let Some(file) = file else {
        bail!("Could not probe {}", path.display());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&file)?);
    } else {
        println!("{}", file.path.display());
        println!("  size:     {}", format_size(file.size));
        println!("  format:   {}", or_dash(&file.format));
        println!("  codec:    {}", or_dash(&file.codec));
        if file.has_video() {
            println!("  video:    {}x{}", file.width, file.height);
        }
        println!("  duration: {}", format_duration(file.duration));
    }

    Ok(())
}

/// List mounted volumes.
fn run_mounts(json: bool) -> Result<()> {
    let mounts = list_mounts();

    if json {
        println!("{}", serde_json::to_string_pretty(&mounts)?);
        return Ok(());
    }

    println!(
        "{:<40} {:>10} {:>10} {:>10} {:>6}",
        "MOUNT", "TOTAL", "USED", "FREE", "USE%"
    );
    for mount in &mounts {
        println!(
            "{:<40} {:>10} {:>10} {:>10} {:>5.1}% {}",
            truncate(&mount.path.display().to_string(), 40),
            format_size(mount.total),
            format_size(mount.used),
            format_size(mount.available),
            mount.usage_ratio() * 100.0,
            make_bar(mount.usage_ratio(), 10)
        );
    }

    Ok(())
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Format seconds as `h:mm:ss.s` or `m:ss.s`.
fn format_duration(seconds: f64) -> String {
    let whole = seconds as u64;
    let (h, m) = (whole / 3600, (whole / 60) % 60);
    let s = seconds - (h * 3600 + m * 60) as f64;
    if h > 0 {
        format!("{h}:{m:02}:{s:04.1}")
    } else {
        format!("{m}:{s:04.1}")
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}
