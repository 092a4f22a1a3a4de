//! Command-line surface for a standalone fuzz campaign process.
//!
//! Two-stage resolution (`CommandLineArguments::from_parser` →
//! `resolved`): parse raw flags into `Option`-wrapped fields first, then
//! merge them against [`DefaultSessionOptions`] to get the
//! fully-resolved table a `SessionBuilder` consumes.

use getopts::Options;
use std::path::PathBuf;

pub const SESSION_FILENAME_FLAG: &str = "session-filename";
pub const SKIP_FLAG: &str = "skip";
pub const SLEEP_TIME_FLAG: &str = "sleep-time";
pub const RESTART_INTERVAL_FLAG: &str = "restart-interval";
pub const CRASH_THRESHOLD_FLAG: &str = "crash-threshold";
pub const RESTART_SLEEP_TIME_FLAG: &str = "restart-sleep-time";
pub const WEB_PORT_FLAG: &str = "web-port";
pub const NO_CHECK_RECV_FLAG: &str = "no-check-data-received";
pub const IGNORE_CONNECTION_RESET_FLAG: &str = "ignore-connection-reset";
pub const IGNORE_CONNECTION_ABORTED_FLAG: &str = "ignore-connection-aborted";

/// Values used when a flag is not given on the command line.
#[derive(Clone)]
pub struct DefaultSessionOptions {
    pub skip: usize,
    pub sleep_time_secs: f64,
    pub restart_interval: usize,
    pub crash_threshold: u32,
    pub restart_sleep_time_secs: u64,
    pub web_port: u16,
}

impl Default for DefaultSessionOptions {
    fn default() -> Self {
        Self {
            skip: 0,
            sleep_time_secs: 0.0,
            restart_interval: 0,
            crash_threshold: 3,
            restart_sleep_time_secs: 5,
            web_port: 26000,
        }
    }
}

/// Raw, possibly-absent values parsed off the command line.
#[derive(Default, Debug, Clone)]
pub struct CommandLineArguments {
    pub session_filename: Option<PathBuf>,
    pub skip: Option<usize>,
    pub sleep_time_secs: Option<f64>,
    pub restart_interval: Option<usize>,
    pub crash_threshold: Option<u32>,
    pub restart_sleep_time_secs: Option<u64>,
    pub web_port: Option<u16>,
    pub check_data_received_each_request: bool,
    pub ignore_connection_reset: bool,
    pub ignore_connection_aborted: bool,
}

/// Fully resolved campaign options, ready to hand to `SessionBuilder`.
#[derive(Debug, Clone)]
pub struct FullCommandLineArguments {
    pub session_filename: Option<PathBuf>,
    pub skip: usize,
    pub sleep_time_secs: f64,
    pub restart_interval: usize,
    pub crash_threshold: u32,
    pub restart_sleep_time_secs: u64,
    pub web_port: u16,
    pub check_data_received_each_request: bool,
    pub ignore_connection_reset: bool,
    pub ignore_connection_aborted: bool,
}

#[must_use]
pub fn options_parser() -> Options {
    let mut options = Options::new();
    let defaults = DefaultSessionOptions::default();

    options.long_only(true);
    options.optopt(
        "",
        SESSION_FILENAME_FLAG,
        "file to persist/resume campaign counters to",
        "PATH",
    );
    options.optopt(
        "",
        SKIP_FLAG,
        &format!("number of test cases to skip (default: {})", defaults.skip),
        "N",
    );
    options.optopt(
        "",
        SLEEP_TIME_FLAG,
        &format!(
            "seconds to sleep between test cases (default: {})",
            defaults.sleep_time_secs
        ),
        "SECONDS",
    );
    options.optopt(
        "",
        RESTART_INTERVAL_FLAG,
        "restart the target every N executed cases, 0 to disable",
        "N",
    );
    options.optopt(
        "",
        CRASH_THRESHOLD_FLAG,
        &format!(
            "crashes for one primitive before it is exhausted (default: {})",
            defaults.crash_threshold
        ),
        "N",
    );
    options.optopt(
        "",
        RESTART_SLEEP_TIME_FLAG,
        "seconds to sleep when no restart method is configured",
        "SECONDS",
    );
    options.optopt(
        "",
        WEB_PORT_FLAG,
        &format!("port for the web status server (default: {})", defaults.web_port),
        "PORT",
    );
    options.optflag(
        "",
        NO_CHECK_RECV_FLAG,
        "do not require a non-empty recv after each send",
    );
    options.optflag(
        "",
        IGNORE_CONNECTION_RESET_FLAG,
        "log connection resets as info instead of a failure",
    );
    options.optflag(
        "",
        IGNORE_CONNECTION_ABORTED_FLAG,
        "log connection aborts as info instead of a failure",
    );
    options.optflag("", "help", "print this help menu");

    options
}

impl CommandLineArguments {
    pub fn from_parser(options: &Options, args: &[String]) -> Result<Self, String> {
        let matches = options.parse(args).map_err(|e| e.to_string())?;

        if matches.opt_present("help") {
            return Err(options.usage("usage: dialogfuzz-cli fuzz [OPTIONS]"));
        }

        let session_filename = matches.opt_str(SESSION_FILENAME_FLAG).map(PathBuf::from);
        let skip = matches.opt_str(SKIP_FLAG).and_then(|v| v.parse().ok());
        let sleep_time_secs = matches.opt_str(SLEEP_TIME_FLAG).and_then(|v| v.parse().ok());
        let restart_interval = matches.opt_str(RESTART_INTERVAL_FLAG).and_then(|v| v.parse().ok());
        let crash_threshold = matches.opt_str(CRASH_THRESHOLD_FLAG).and_then(|v| v.parse().ok());
        let restart_sleep_time_secs = matches
            .opt_str(RESTART_SLEEP_TIME_FLAG)
            .and_then(|v| v.parse().ok());
        let web_port = matches.opt_str(WEB_PORT_FLAG).and_then(|v| v.parse().ok());

        Ok(Self {
            session_filename,
            skip,
            sleep_time_secs,
            restart_interval,
            crash_threshold,
            restart_sleep_time_secs,
            web_port,
            check_data_received_each_request: !matches.opt_present(NO_CHECK_RECV_FLAG),
            ignore_connection_reset: matches.opt_present(IGNORE_CONNECTION_RESET_FLAG),
            ignore_connection_aborted: matches.opt_present(IGNORE_CONNECTION_ABORTED_FLAG),
        })
    }

    pub fn resolved(&self, defaults: DefaultSessionOptions) -> FullCommandLineArguments {
        FullCommandLineArguments {
            session_filename: self.session_filename.clone(),
            skip: self.skip.unwrap_or(defaults.skip),
            sleep_time_secs: self.sleep_time_secs.unwrap_or(defaults.sleep_time_secs),
            restart_interval: self.restart_interval.unwrap_or(defaults.restart_interval),
            crash_threshold: self.crash_threshold.unwrap_or(defaults.crash_threshold),
            restart_sleep_time_secs: self
                .restart_sleep_time_secs
                .unwrap_or(defaults.restart_sleep_time_secs),
            web_port: self.web_port.unwrap_or(defaults.web_port),
            check_data_received_each_request: self.check_data_received_each_request,
            ignore_connection_reset: self.ignore_connection_reset,
            ignore_connection_aborted: self.ignore_connection_aborted,
        }
    }
}

impl FullCommandLineArguments {
    pub fn from_parser(options: &Options, args: &[String]) -> Result<Self, String> {
        Ok(CommandLineArguments::from_parser(options, args)?.resolved(DefaultSessionOptions::default()))
    }
}
