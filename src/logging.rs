// ABOUTME: Tracing subscriber setup for the relaybot binary
// ABOUTME: Writes to stderr, optionally to a daily-rolling file; panics are reported and exit with code 1

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,matrix_sdk=warn";
pub const DEBUG_FILTER: &str = "info,relaybot=debug,relaybot_core=debug,matrix_sdk=info";

/// Filter directives used when RUST_LOG is unset
pub fn default_directives(debug: bool) -> &'static str {
    if debug {
        DEBUG_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// process lifetime or buffered file output is lost.
pub fn init(debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "relaybot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Exit status after a panic, the same as any other unhandled failure
pub const PANIC_EXIT_CODE: i32 = 1;

/// Report panics on stderr with a backtrace, then end the process with
/// `PANIC_EXIT_CODE` instead of the runtime's default status
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("relaybot panicked: {}", panic_info);
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
        std::process::exit(PANIC_EXIT_CODE);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        for debug in [false, true] {
            assert!(EnvFilter::try_new(default_directives(debug)).is_ok());
        }
    }

    #[test]
    fn test_debug_raises_relaybot_level() {
        assert!(default_directives(true).contains("relaybot_core=debug"));
        assert!(!default_directives(false).contains("debug"));
    }
}
