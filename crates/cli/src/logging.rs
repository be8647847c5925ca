//! Tracing setup for the CLI.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber from the verbosity count.
///
/// `RUST_LOG` wins when set; otherwise `-v` maps to info and `-vv` to
/// debug. Logs go to stderr so command output stays clean.
pub fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "dice=info,dice_cli=info",
        _ => "dice=debug,dice_cli=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
