//! toppy CLI - Command-line tool for the hard disk of Topfield PVRs.
//!
//! ## Features
//!
//! - Disk size and directory listings, with JSON output
//! - File upload and download with a progress bar
//! - Delete, rename and mkdir on the PVR disk
//! - Ready, reset, cancel and turbo mode control
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::{LevelFilter, debug};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use toppy::{CrcMode, Toppy};

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress bars and colors should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// CLI-level failures that are not library errors.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid arguments or configuration.
    #[error("{0}")]
    Usage(String),
    /// The user cancelled the operation.
    #[error("{0}")]
    Cancelled(String),
}

/// Process exit codes.
pub(crate) mod exit_code {
    /// Success.
    pub const OK: u8 = 0;
    /// Invalid arguments or a local file problem.
    pub const USAGE: u8 = 1;
    /// No device, or the device could not be opened.
    pub const DEVICE_OPEN: u8 = 2;
    /// USB transfer failure.
    pub const TRANSPORT: u8 = 3;
    /// The device broke the protocol.
    pub const PROTOCOL: u8 = 4;
    /// The device reported a failure.
    pub const DEVICE_FAILURE: u8 = 5;
    /// Interrupted by Ctrl-C.
    pub const INTERRUPTED: u8 = 130;
}

/// toppy - Access the hard disk of a Topfield PVR over USB.
///
/// Remote paths use backslashes, e.g. "\DataFiles\show.rec".
///
/// Environment variables:
///   TOPPY_BUS          - USB bus of the PVR
///   TOPPY_ADDRESS      - USB device address of the PVR
///   TOPPY_TIMEOUT_MS   - Timeout per USB transfer (default: 11000)
///   TOPPY_IGNORE_CRC   - Accept packets with bad CRCs silently
///   TOPPY_STRICT_CRC   - Reject packets with bad CRCs
#[derive(Parser)]
#[command(name = "toppy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// USB bus of the PVR (needed when several are attached).
    #[arg(long, global = true, env = "TOPPY_BUS")]
    bus: Option<String>,

    /// USB device address of the PVR.
    #[arg(long, global = true, env = "TOPPY_ADDRESS")]
    address: Option<u8>,

    /// Accept packets with bad CRCs without a warning.
    #[arg(
        short = 'i',
        long,
        global = true,
        env = "TOPPY_IGNORE_CRC",
        conflicts_with = "strict_crc"
    )]
    ignore_crc: bool,

    /// Fail on packets with bad CRCs.
    #[arg(long, global = true, env = "TOPPY_STRICT_CRC")]
    strict_crc: bool,

    /// Dump packets (-p headers, -pp full packets). Needs -vv to be visible.
    #[arg(short = 'p', long, global = true, action = clap::ArgAction::Count)]
    packet_trace: u8,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress progress and informational output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Timeout per USB transfer in milliseconds.
    #[arg(long, global = true, env = "TOPPY_TIMEOUT_MS", value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Check that the PVR is ready.
    Ready,

    /// Reboot the PVR.
    Reset,

    /// Cancel the operation in progress on the PVR.
    Cancel,

    /// Switch turbo mode on or off.
    Turbo {
        /// Turbo mode: on, off, 1 or 0.
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        mode: bool,
    },

    /// Show total and free disk space.
    Size {
        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List a directory on the PVR.
    Dir {
        /// Remote directory.
        #[arg(default_value = "\\")]
        path: String,

        /// Output as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Download a file from the PVR.
    Get {
        /// Remote source file.
        src: String,
        /// Local destination file.
        dst: PathBuf,
    },

    /// Upload a file to the PVR.
    Put {
        /// Local source file.
        src: PathBuf,
        /// Remote destination file.
        dst: String,
    },

    /// Delete a file or directory on the PVR.
    Delete {
        /// Remote path.
        path: String,
    },

    /// Rename a file or directory on the PVR.
    Rename {
        /// Remote source path.
        src: String,
        /// Remote destination path.
        dst: String,
    },

    /// Create a directory on the PVR.
    Mkdir {
        /// Remote path.
        path: String,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse an on/off switch.
fn parse_on_off(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "1" => Ok(true),
        "off" | "0" => Ok(false),
        _ => Err(format!("Invalid turbo mode '{s}'. Expected on, off, 1 or 0")),
    }
}

impl Cli {
    /// Build the engine configuration from flags and the config file.
    fn engine_config(&self, file: &Config) -> toppy::Config {
        let crc_mode = if self.strict_crc || (!self.ignore_crc && file.protocol.strict_crc) {
            CrcMode::Strict
        } else if self.ignore_crc || file.protocol.ignore_crc {
            CrcMode::Ignore
        } else {
            CrcMode::Warn
        };

        let mut config = toppy::Config::default()
            .with_crc_mode(crc_mode)
            .with_packet_trace(self.packet_trace)
            .with_quiet(self.is_quiet(file));
        if let Some(ms) = self.timeout_ms.or(file.protocol.timeout_ms) {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        config
    }

    fn is_quiet(&self, file: &Config) -> bool {
        self.quiet || file.output.quiet
    }

    /// Reject settings no device session can run with.
    fn validate(&self, file: &Config) -> Result<()> {
        if self.timeout_ms.or(file.protocol.timeout_ms) == Some(0) {
            return Err(CliError::Usage("Timeout must be at least 1 ms".into()).into());
        }
        Ok(())
    }
}

/// Log level for the `-q` / `-v` settings.
fn log_level(quiet: bool, verbose: u8) -> LevelFilter {
    if quiet {
        LevelFilter::Warn
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Report a failure that followed Ctrl-C as a cancellation.
fn cancelled_if_interrupted(err: anyhow::Error, interrupted: bool) -> anyhow::Error {
    if interrupted {
        err.context(CliError::Cancelled("Cancelled by user".into()))
    } else {
        err
    }
}

/// Open the PVR selected by flags or config.
pub(crate) fn open_toppy(cli: &Cli, config: &Config) -> Result<Toppy<toppy::NativePort>> {
    let bus = cli.bus.clone().or_else(|| config.device.bus.clone());
    let address = cli.address.or(config.device.address);
    let toppy = Toppy::open(bus.as_deref(), address, cli.engine_config(config))?;
    Ok(toppy)
}

/// Map an error to the process exit code.
fn classify(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => exit_code::USAGE,
            CliError::Cancelled(_) => exit_code::INTERRUPTED,
        };
    }

    let Some(err) = err
        .chain()
        .find_map(|e| e.downcast_ref::<toppy::Error>())
    else {
        return exit_code::USAGE;
    };

    match err {
        toppy::Error::DeviceNotFound
        | toppy::Error::MultipleDevices(_)
        | toppy::Error::Usb(_) => exit_code::DEVICE_OPEN,
        toppy::Error::Interrupted => exit_code::INTERRUPTED,
        toppy::Error::Device(_) => exit_code::DEVICE_FAILURE,
        e if e.is_protocol() => exit_code::PROTOCOL,
        e if e.is_transport() => exit_code::TRANSPORT,
        _ => exit_code::USAGE,
    }
}

fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::Relaxed) {
            // Second Ctrl-C: give up waiting for the device.
            std::process::exit(i32::from(exit_code::INTERRUPTED));
        }
    });
    if let Err(e) = result {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    toppy::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    if !matches!(cli.command, Commands::Completions { .. }) {
        cli.validate(config)?;
    }

    match &cli.command {
        Commands::Ready => commands::device::cmd_ready(cli, config),
        Commands::Reset => commands::device::cmd_reset(cli, config),
        Commands::Cancel => commands::device::cmd_cancel(cli, config),
        Commands::Turbo { mode } => commands::device::cmd_turbo(cli, config, *mode),
        Commands::Size { json } => commands::listing::cmd_size(cli, config, *json),
        Commands::Dir { path, json } => commands::listing::cmd_dir(cli, config, path, *json),
        Commands::Get { src, dst } => commands::transfer::cmd_get(cli, config, src, dst),
        Commands::Put { src, dst } => commands::transfer::cmd_put(cli, config, src, dst),
        Commands::Delete { path } => commands::device::cmd_delete(cli, config, path),
        Commands::Rename { src, dst } => commands::device::cmd_rename(cli, config, src, dst),
        Commands::Mkdir { path } => commands::device::cmd_mkdir(cli, config, path),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(exit_code::USAGE)
            } else {
                ExitCode::from(exit_code::OK)
            };
        },
    };

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let level = log_level(cli.quiet, cli.verbose);
    env_logger::Builder::from_env(Env::default().default_filter_or(level.to_string()))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    // `output.quiet` in a config file lowers the level like -q does
    if env::var_os("RUST_LOG").is_none() {
        let configured = log_level(cli.is_quiet(&config), cli.verbose);
        if configured < level {
            log::set_max_level(configured);
        }
    }

    debug!(
        "toppy v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    install_interrupt_handler();

    match run(&cli, &config).map_err(|e| cancelled_if_interrupted(e, was_interrupted())) {
        Ok(()) => ExitCode::from(exit_code::OK),
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(classify(&err))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;
    use toppy::DeviceError;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("toppy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_on_off() {
        assert_eq!(parse_on_off("on"), Ok(true));
        assert_eq!(parse_on_off("ON"), Ok(true));
        assert_eq!(parse_on_off("1"), Ok(true));
        assert_eq!(parse_on_off("off"), Ok(false));
        assert_eq!(parse_on_off("0"), Ok(false));
        assert!(parse_on_off("maybe").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["dir", "\\DataFiles", "-vv", "-pp", "--bus", "2"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.packet_trace, 2);
        assert_eq!(cli.bus.as_deref(), Some("2"));
        assert!(matches!(cli.command, Commands::Dir { ref path, json: false } if path == "\\DataFiles"));
    }

    #[test]
    fn test_dir_defaults_to_root() {
        let cli = parse(&["dir"]);
        assert!(matches!(cli.command, Commands::Dir { ref path, .. } if path == "\\"));
    }

    #[test]
    fn test_crc_flags_conflict() {
        assert!(Cli::try_parse_from(["toppy", "-i", "--strict-crc", "ready"]).is_err());
    }

    #[test]
    fn test_engine_config_from_flags() {
        let cli = parse(&["-i", "-q", "--timeout-ms", "500", "ready"]);
        let config = cli.engine_config(&Config::default());
        assert_eq!(config.crc_mode, CrcMode::Ignore);
        assert!(config.quiet);
        assert_eq!(config.timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_engine_config_from_file() {
        let file = Config::parse("[protocol]\nstrict_crc = true\ntimeout_ms = 2000\n").unwrap();
        let config = parse(&["ready"]).engine_config(&file);
        assert_eq!(config.crc_mode, CrcMode::Strict);
        assert_eq!(config.timeout, Duration::from_millis(2000));

        // Flags win over the file.
        let config = parse(&["-i", "--timeout-ms", "10", "ready"]).engine_config(&file);
        assert_eq!(config.crc_mode, CrcMode::Ignore);
        assert_eq!(config.timeout, Duration::from_millis(10));
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = parse(&["size"]).engine_config(&Config::default());
        assert_eq!(config, toppy::Config::default());
    }

    #[test]
    fn test_exit_code_classification() {
        let code = |e: toppy::Error| classify(&anyhow::Error::new(e));
        assert_eq!(code(toppy::Error::DeviceNotFound), exit_code::DEVICE_OPEN);
        assert_eq!(
            code(toppy::Error::Timeout("read".into())),
            exit_code::TRANSPORT
        );
        assert_eq!(
            code(toppy::Error::CrcMismatch {
                expected: 1,
                actual: 2
            }),
            exit_code::PROTOCOL
        );
        assert_eq!(
            code(toppy::Error::Device(DeviceError::MemoryFull)),
            exit_code::DEVICE_FAILURE
        );
        assert_eq!(code(toppy::Error::Interrupted), exit_code::INTERRUPTED);
        assert_eq!(
            code(toppy::Error::EmptySource("x".into())),
            exit_code::USAGE
        );
    }

    #[test]
    fn test_zero_timeout_is_usage_error() {
        let err = parse(&["--timeout-ms", "0", "ready"])
            .validate(&Config::default())
            .unwrap_err();
        assert_eq!(classify(&err), exit_code::USAGE);
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));

        let file = Config::parse("[protocol]\ntimeout_ms = 0\n").unwrap();
        assert!(parse(&["ready"]).validate(&file).is_err());
        assert!(parse(&["--timeout-ms", "5", "ready"]).validate(&file).is_ok());
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(false, 0), LevelFilter::Info);
        assert_eq!(log_level(false, 1), LevelFilter::Debug);
        assert_eq!(log_level(false, 3), LevelFilter::Trace);
        assert_eq!(log_level(true, 2), LevelFilter::Warn);
    }

    #[test]
    fn test_quiet_config_lowers_log_level() {
        let file = Config::parse("[output]\nquiet = true\n").unwrap();
        let cli = parse(&["-v", "ready"]);
        assert_eq!(log_level(cli.is_quiet(&file), cli.verbose), LevelFilter::Warn);
    }

    #[test]
    fn test_interrupted_failure_is_cancelled() {
        let timeout = || anyhow::Error::new(toppy::Error::Timeout("bulk read".into()));
        assert_eq!(
            classify(&cancelled_if_interrupted(timeout(), true)),
            exit_code::INTERRUPTED
        );
        assert_eq!(
            classify(&cancelled_if_interrupted(timeout(), false)),
            exit_code::TRANSPORT
        );
    }

    #[test]
    fn test_exit_code_through_context() {
        let err = Err::<(), _>(toppy::Error::UnexpectedReply("cmd 0x1004".into()))
            .context("Listing failed")
            .unwrap_err();
        assert_eq!(classify(&err), exit_code::PROTOCOL);

        let err = anyhow::Error::new(CliError::Cancelled("stop".into()));
        assert_eq!(classify(&err), exit_code::INTERRUPTED);
    }
}
