use clap::{Arg, ArgAction, ArgMatches, Command, value_parser, ValueEnum};
use simplelog::{ConfigBuilder, LevelFilter, LevelPadding, WriteLogger};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use trsio_emu::config::{Config, HdcBinding, VideoBinding};
use trsio_emu::trace::{self, TraceOp};

const TRACE_PATH: &str = "TRACE_PATH";
const HDC: &str = "HDC";
const VIDEO: &str = "VIDEO";
const CARD_DIR: &str = "CARD_DIR";
const DEBOUNCE: &str = "DEBOUNCE";
const SETTLE_US: &str = "SETTLE_US";
const LINGER: &str = "LINGER";
const LOG_PATH: &str = "LOG_PATH";
const LOG_LEVEL: &str = "LOG_LEVEL";

const CARD_MSG: &str = "\
trsio needs a directory to act as the card socket; it must be present\n\
to launch. Put a single image file in it to insert a card, take it out\n\
to eject. The folder defaults to ./Card in the current working\n\
directory, but can also be specified by the --card-dir option.";

/// Possible log levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
}

fn cli() -> Command {
    // Hack to make the build dirty when the toml changes.
    include_str!("../../Cargo.toml");

    clap::command!()
        .max_term_width(100)
        .after_help("\
This is the trsio console harness. It runs the disk controller, display and \
card socket of the board in your terminal, replays the given bus trace \
against them, and keeps them running until you press q or Esc.")
        .arg(Arg::new(TRACE_PATH)
            .help("A bus trace to replay. If omitted, the board just runs.")
            .action(ArgAction::Set))
        .arg(Arg::new(HDC)
            .help("Which disk controller answers on the bus.")
            .long("hdc")
            .action(ArgAction::Set)
            .default_value("wd1010")
            .value_parser(value_parser!(HdcBinding))
            .ignore_case(true))
        .arg(Arg::new(VIDEO)
            .help("How the display is driven.")
            .long("video")
            .action(ArgAction::Set)
            .default_value("stream")
            .value_parser(value_parser!(VideoBinding))
            .ignore_case(true))
        .arg(Arg::new(CARD_DIR)
            .help("The path to the folder standing in for the card socket.")
            .long("card-dir")
            .action(ArgAction::Set)
            .default_value("Card")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new(DEBOUNCE)
            .help("Consecutive polls a new card must be seen for before it is mounted.")
            .long("debounce")
            .action(ArgAction::Set)
            .default_value("10000")
            .value_parser(value_parser!(u32)))
        .arg(Arg::new(SETTLE_US)
            .help("Minimum gap between display chunks, in microseconds.")
            .long("settle-us")
            .action(ArgAction::Set)
            .default_value("1000")
            .value_parser(value_parser!(u64)))
        .arg(Arg::new(LINGER)
            .help("Exit this many milliseconds after the trace, \
                   rather than waiting for a key.")
            .long("linger")
            .action(ArgAction::Set)
            .value_parser(value_parser!(u64)))
        .arg(Arg::new(LOG_PATH)
            .help("If set, a debug log will be written to the given path.")
            .short('l')
            .long("log")
            .action(ArgAction::Set))
        .arg(Arg::new(LOG_LEVEL)
            .help("Set the log level. Has no effect without \
                   specifying --log as well. Case insensitive.")
            .short('L')
            .long("log-level")
            .action(ArgAction::Set)
            .default_value("trace")
            .value_parser(value_parser!(LogLevel))
            .ignore_case(true))
}

/// Build the board configuration from the parsed arguments.
fn config_from_args(args: &ArgMatches) -> Config {
    let defaults = Config::default();
    Config {
        hdc: args.get_one(HDC).copied().unwrap_or(defaults.hdc),
        video: args.get_one(VIDEO).copied().unwrap_or(defaults.video),
        card_dir: args.get_one::<PathBuf>(CARD_DIR).cloned().unwrap_or(defaults.card_dir),
        debounce: args.get_one(DEBOUNCE).copied().unwrap_or(defaults.debounce),
        settle_us: args.get_one(SETTLE_US).copied().unwrap_or(defaults.settle_us),
        linger_ms: args.get_one(LINGER).copied(),
        trace: args.get_one::<String>(TRACE_PATH).map(PathBuf::from),
    }
}

/// Ensure that the given path exists and is a directory.
fn check_card_path(path: &Path) -> Result<(), String> {
    match fs::metadata(path) {
        Ok(meta) => {
            if !meta.is_dir() {
                Err(format!("'{}' is not a directory.\n\n{}", path.display(), CARD_MSG))
            } else {
                Ok(())
            }
        }
        Err(e) => {
            Err(format!("Could not access '{}': {}\n\n{}", path.display(), e, CARD_MSG))
        }
    }
}

/// Read and parse a bus trace.
fn load_trace(path: &Path) -> Result<Vec<TraceOp>, String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("Failed to open trace '{}': {}", path.display(), e))?;
    trace::parse(&source)
        .map_err(|e| format!("Failed to parse trace '{}': {}", path.display(), e))
}

/// Initialise logging to the given file.
fn init_logging(logfile: File, level: LevelFilter) -> Result<(), String> {
    // The terminal belongs to the display, so the log only goes to a file.
    let config = ConfigBuilder::new()
        .set_level_padding(LevelPadding::Right)
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_custom(time::macros::format_description!(
            "[hour]:[minute]:[second].[subsecond digits:6]"))
        .add_filter_ignore_str("mio")
        .build();

    WriteLogger::init(level, config, logfile)
        .map_err(|e| format!("Failed to initialise logging: {}", e))
}

/// Main run function; returns an exit code.
fn run(args: ArgMatches) -> u8 {
    return match _run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    fn _run(args: ArgMatches) -> Result<(), String> {
        let config = config_from_args(&args);

        // Ensure that the card socket exists.
        check_card_path(&config.card_dir)?;

        // Load the trace up front so that mistakes show before the
        // terminal is taken over.
        let ops = match &config.trace {
            Some(path) => load_trace(path)?,
            None => Vec::new(),
        };

        // Initialise logging if configured.
        if let Some(log_path) = args.get_one::<String>(LOG_PATH) {
            match File::create(log_path) {
                Ok(logfile) => {
                    let level = match args.get_one(LOG_LEVEL).copied() {
                        Some(LogLevel::Trace) | None => LevelFilter::Trace,
                        Some(LogLevel::Debug) => LevelFilter::Debug,
                        Some(LogLevel::Info) => LevelFilter::Info,
                    };
                    init_logging(logfile, level)?;
                },
                Err(e) => return Err(
                    format!("Failed to create log file: {}", e)),
            }
        }

        // Run the board.
        let report = trsio_emu::run(&config, &ops)?;
        if report.mismatches > 0 {
            return Err(format!("{} of {} trace operations did not read as expected.",
                               report.mismatches, report.ops));
        }

        Ok(())
    }
}

fn main() {
    let args = cli().get_matches();
    std::process::exit(run(args).into());
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use tempfile;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = cli().try_get_matches_from(["trsio"]).unwrap();
        assert_eq!(config_from_args(&args), Config::default());
        assert_eq!(args.get_one::<LogLevel>(LOG_LEVEL), Some(&LogLevel::Trace));
    }

    #[test]
    fn test_all_options() {
        let args = cli().try_get_matches_from([
            "trsio", "boot.trace",
            "--hdc", "STUB",
            "--video", "redraw",
            "--card-dir", "/tmp/sd",
            "--debounce", "5",
            "--settle-us", "250",
            "--linger", "1500",
            "-L", "info",
        ]).unwrap();
        let config = config_from_args(&args);
        assert_eq!(config, Config {
            hdc: HdcBinding::Stub,
            video: VideoBinding::Redraw,
            card_dir: PathBuf::from("/tmp/sd"),
            debounce: 5,
            settle_us: 250,
            linger_ms: Some(1500),
            trace: Some(PathBuf::from("boot.trace")),
        });
        assert_eq!(args.get_one::<LogLevel>(LOG_LEVEL), Some(&LogLevel::Info));
    }

    #[test]
    fn test_bad_options_rejected() {
        assert!(cli().try_get_matches_from(["trsio", "--hdc", "wd1793"]).is_err());
        assert!(cli().try_get_matches_from(["trsio", "--debounce", "-1"]).is_err());
        assert!(cli().try_get_matches_from(["trsio", "--linger", "soon"]).is_err());
    }

    #[test]
    fn test_check_card_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_card_path(dir.path()).is_ok());

        let file = dir.path().join("card.img");
        fs::write(&file, [0; 512]).unwrap();
        let err = check_card_path(&file).unwrap_err();
        assert!(err.contains("is not a directory"));

        let err = check_card_path(&dir.path().join("missing")).unwrap_err();
        assert!(err.starts_with("Could not access"));
    }

    #[test]
    fn test_load_trace() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "out CE 00\nin CF =50").unwrap();
        let ops = load_trace(file.path()).unwrap();
        assert_eq!(ops.len(), 2);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "out CE 00\nout CE").unwrap();
        let err = load_trace(bad.path()).unwrap_err();
        assert!(err.contains("line 2"));

        assert!(load_trace(Path::new("/nonexistent/boot.trace")).is_err());
    }
}
