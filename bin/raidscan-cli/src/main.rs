//! raidscan - examine RAID metadata on block devices
//!
//! Lists the arrays described by the superblocks on a set of devices,
//! either per device or condensed into configuration lines.

mod devices;

use anyhow::Result;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use raidscan_common::{Config, DEFAULT_CONFIG_PATH, ExamineContext};
use raidscan_examine::Examiner;
use raidscan_metadata::FormatSelector;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "raidscan")]
#[command(about = "Examine RAID metadata on block devices")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the metadata found on each device
    Examine(ExamineArgs),
    /// List the bad-block log recorded on a device
    ExamineBadblocks {
        /// Stay quiet about devices without metadata
        #[arg(short, long)]
        brief: bool,

        /// Metadata format to assume instead of detecting it
        #[arg(short, long)]
        metadata: Option<FormatSelector>,

        /// Device to probe
        device: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct ExamineArgs {
    /// Examine every known device and skip errors quietly (implies --brief)
    #[arg(short, long)]
    scan: bool,

    /// One configuration line per array
    #[arg(short, long)]
    brief: bool,

    /// KEY=value output
    #[arg(short, long)]
    export: bool,

    /// More detail; repeat for even more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Correct superblocks written by 2.2 sparc kernels
    #[arg(long = "sparc2.2")]
    sparc22: bool,

    /// Host name for verbose listings
    #[arg(long)]
    homehost: Option<String>,

    /// Metadata format to assume instead of detecting it
    #[arg(short, long)]
    metadata: Option<FormatSelector>,

    /// Devices to examine
    devices: Vec<PathBuf>,
}

/// Read the configuration file, falling back to defaults
fn load_config(path: &Path) -> Config {
    if !path.exists() {
        debug!("no configuration at {}", path.display());
        return Config::default();
    }
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to parse config file: {e}");
            Config::default()
        }),
        Err(e) => {
            eprintln!("Warning: Failed to read config file: {e}");
            Config::default()
        }
    }
}

fn default_homehost() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
}

/// Merge command line flags over the configuration defaults
fn examine_context(args: &ExamineArgs, config: &Config) -> ExamineContext {
    let mut ctx = ExamineContext::from_defaults(&config.examine);
    ctx.scan = args.scan;
    ctx.brief = args.brief || args.scan;
    ctx.export = args.export;
    ctx.verbose += i32::from(args.verbose);
    ctx.compat_fixup = args.sparc22;
    if args.homehost.is_some() {
        ctx.homehost.clone_from(&args.homehost);
    }
    if ctx.homehost.is_none() {
        ctx.homehost = default_homehost();
    }
    ctx
}

/// Devices named on the command line, or the scan list with `--scan`
///
/// An empty scan is not an error; the run then reports nothing.
fn examine_devices(
    args: &ExamineArgs,
    config: &Config,
    scan: impl FnOnce() -> Result<Vec<PathBuf>>,
) -> Result<Vec<PathBuf>> {
    if !args.devices.is_empty() {
        return Ok(args.devices.clone());
    }
    if !args.scan {
        anyhow::bail!("no devices given; name some or use --scan");
    }
    if config.devices.scan.is_empty() {
        scan()
    } else {
        Ok(config.devices.scan.clone())
    }
}

fn exit_code(status: i32) -> ExitCode {
    ExitCode::from(u8::try_from(status).unwrap_or(1))
}

fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = load_config(&args.config);
    let examiner = Examiner::default();
    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut out = stdout.lock();
    let mut diag = stderr.lock();

    let report = match args.command {
        Commands::Examine(examine) => {
            let ctx = examine_context(&examine, &config);
            let devices = examine_devices(&examine, &config, devices::scan_devices)?;
            info!("examining {} devices", devices.len());
            examiner.examine(&devices, &ctx, examine.metadata.as_ref(), &mut out, &mut diag)?
        }
        Commands::ExamineBadblocks {
            brief,
            metadata,
            device,
        } => examiner.examine_badblocks(&device, brief, metadata.as_ref(), &mut out, &mut diag)?,
    };

    out.flush()?;
    Ok(exit_code(report.status()))
}
