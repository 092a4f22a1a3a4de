//! Standalone fuzz campaign runner. Parses options with
//! `dialogfuzz_common::arg`, wires up a TCP transport and a null monitor
//! (swap either for a real implementation in application code — this
//! binary exists to exercise the library end to end, not as the primary
//! integration surface), and runs the requested entry point.

use dialogfuzz::logger::TracingLogger;
use dialogfuzz::monitor::NullMonitor;
use dialogfuzz::transport::TcpTransport;
use dialogfuzz::{Graph, SessionBuilder};
use dialogfuzz_common::arg::{options_parser, FullCommandLineArguments};
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = options_parser();
    let parsed = match FullCommandLineArguments::from_parser(&options, &args) {
        Ok(p) => p,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    dialogfuzz::signals::install();

    // A real integration defines its own graph; this binary's job is
    // wiring, so an empty graph with no requests would fail fast in
    // `SessionBuilder::build`, which is the intended behavior for
    // `dialogfuzz-cli` invoked without a companion library crate.
    let graph = Graph::new();

    let mut builder = SessionBuilder::new()
        .skip(parsed.skip as u64)
        .sleep_time(std::time::Duration::from_secs_f64(parsed.sleep_time_secs))
        .restart_interval(parsed.restart_interval as u64)
        .crash_threshold(parsed.crash_threshold)
        .restart_sleep_time(std::time::Duration::from_secs(parsed.restart_sleep_time_secs))
        .web_port(parsed.web_port)
        .check_data_received_each_request(parsed.check_data_received_each_request)
        .ignore_connection_reset(parsed.ignore_connection_reset)
        .ignore_connection_aborted(parsed.ignore_connection_aborted);
    if let Some(path) = parsed.session_filename {
        builder = builder.session_filename(path);
    }

    let transport = TcpTransport::new("127.0.0.1", 0);
    let session = builder.build(graph, transport, NullMonitor, TracingLogger);

    match session {
        Ok(mut session) => {
            #[cfg(feature = "web")]
            dialogfuzz::web::spawn(parsed.web_port, session.snapshot_handle());

            match session.fuzz() {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("fuzz run ended: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("failed to start session: {e}");
            ExitCode::FAILURE
        }
    }
}
