use std::process;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `SMASH_LOG=debug`.
pub const LOG_ENV: &str = "SMASH_LOG";

pub fn print_usage() {
    println!("Usage: smash [-hvp]");
    println!("   -h   Print this help message");
    println!("   -v   Enable verbose mode (debug logging)");
    println!("   -p   Do not print a command prompt");
    println!();
    println!("The {} environment variable overrides the log filter.", LOG_ENV);
    process::exit(1);
}

/// Sends diagnostics to stderr so they never mix with command output, which
/// may be redirected to a file.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
